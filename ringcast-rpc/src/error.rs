use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("The call did not complete within {0:?}.")]
    /// The deadline elapsed before a reply arrived.
    ///
    /// The connection is closed as its state is no longer known.
    Timeout(Duration),

    #[error("The connection is closed.")]
    /// The connection was closed by either side.
    Closed,

    #[error("Connection refused by {0}.")]
    /// The remote endpoint refused the connection.
    ConnectionRefused(String),

    #[error("IO Error: {0}")]
    /// Any other error on the socket.
    Io(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    /// The peer sent something that is not a valid frame.
    Protocol(String),

    #[error("{0}")]
    /// The remote handler returned an error string.
    Remote(String),

    #[error("Failed to encode or decode payload: {0}")]
    /// The payload could not be (de)serialized with the selected codec.
    Codec(String),

    #[error("Connection pool for {0} is at its connection limit.")]
    /// The pool already has the maximum number of connections outstanding.
    MaxConn(String),

    #[error("All backends are dead.")]
    /// Every endpoint of a multi-endpoint client failed.
    AllBackendsDead,

    #[error("Unknown payload protocol: {0:?}")]
    /// No codec is registered under the given name.
    UnknownProtocol(String),
}

impl RpcError {
    /// Returns if the error was caused by the transport rather than the
    /// remote handler.
    ///
    /// Transport errors leave the connection in an unknown state, so it must
    /// be closed and the call may be retried against another endpoint.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Closed
                | Self::ConnectionRefused(_)
                | Self::Io(_)
                | Self::Protocol(_)
        )
    }
}
