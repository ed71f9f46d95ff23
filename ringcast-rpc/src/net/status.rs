use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

#[derive(Clone, PartialEq, Eq)]
/// Status information around the cause of a request failing.
///
/// Handlers return a status, the server sends its display form as the error
/// string of the response.
pub struct Status {
    /// The generic error code of the request.
    pub code: ErrorCode,
    /// The display message for the error.
    pub message: String,
}

impl Status {
    /// The server is running but the handler cannot process messages at
    /// this time.
    pub fn unavailable(msg: impl Display) -> Self {
        Self {
            code: ErrorCode::ServiceUnavailable,
            message: msg.to_string(),
        }
    }

    /// No handler is registered for the requested method.
    pub fn unknown_method(method: &str) -> Self {
        Self {
            code: ErrorCode::UnknownMethod,
            message: format!("Unknown method: {method}"),
        }
    }

    /// An internal error occurred while processing the message.
    pub fn internal(msg: impl Display) -> Self {
        Self {
            code: ErrorCode::InternalError,
            message: msg.to_string(),
        }
    }

    /// The provided arguments could not be decoded by the server.
    pub fn invalid(msg: impl Display) -> Self {
        Self {
            code: ErrorCode::InvalidPayload,
            message: msg.to_string(),
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Debug for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Status")
            .field("code", &self.code)
            .field("message", &self.message)
            .finish()
    }
}

impl Error for Status {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A generic error code describing the high level reason why the request failed.
pub enum ErrorCode {
    /// The server is running but the handler cannot process messages
    /// at this time.
    ServiceUnavailable,
    /// No handler is registered for the requested method.
    UnknownMethod,
    /// An internal error occurred while processing the message.
    InternalError,
    /// The provided message data could not be decoded.
    InvalidPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_error_string() {
        let status = Status::unknown_method("PushToJudge");
        assert_eq!(status.to_string(), "UnknownMethod: Unknown method: PushToJudge");

        let status = Status::internal("disk full");
        assert_eq!(status.to_string(), "InternalError: disk full");
    }
}
