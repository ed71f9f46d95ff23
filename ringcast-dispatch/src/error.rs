use std::io;

use ringcast_ring::NodeId;
use ringcast_rpc::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to deliver all {dropped} points to {} owner(s).", errors.len())]
    /// Every sub-batch of the batch failed.
    ///
    /// The errors are listed per owner in the order the owners were called.
    AllFailed {
        dropped: usize,
        errors: Vec<(NodeId, RpcError)>,
    },

    #[error("None of the {dropped} points could be routed, the ring is empty.")]
    /// No point of the batch had an owner.
    Unroutable { dropped: usize },
}

impl DispatchError {
    /// The number of points which were not delivered.
    pub fn dropped(&self) -> usize {
        match self {
            Self::AllFailed { dropped, .. } => *dropped,
            Self::Unroutable { dropped } => *dropped,
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0}")]
    /// An IO error has occurred while binding one of the listeners.
    Io(#[from] io::Error),

    #[error("{0}")]
    /// The RPC layer could not be set up.
    Rpc(#[from] RpcError),
}
