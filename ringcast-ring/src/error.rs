use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("The hash ring has no members.")]
    /// A lookup was attempted against a ring with no members.
    EmptyRing,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("Liveness oracle is unavailable: {0}")]
    /// The liveness source could not produce a snapshot right now.
    ///
    /// The controller keeps the current ring and retries with backoff.
    Unavailable(String),

    #[error("Liveness oracle has been closed.")]
    /// The liveness source has shut down and will not produce more snapshots.
    Closed,
}
