use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::OracleError;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One observation of the alive member set.
pub struct Snapshot {
    /// A monotonically increasing version assigned by the liveness source.
    pub version: u64,
    /// The alive members.
    pub members: BTreeSet<String>,
}

impl Snapshot {
    pub fn new(
        version: u64,
        members: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            version,
            members: members.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
/// A source of member-set snapshots, e.g. a heartbeat store.
pub trait LivenessOracle: Send + 'static {
    /// Waits for the next snapshot.
    ///
    /// `Ok(None)` marks the end of the sequence.
    async fn next(&mut self) -> Result<Option<Snapshot>, OracleError>;
}

/// Creates a liveness oracle fed through a channel.
///
/// Any heartbeat or discovery mechanism can push its observations through the
/// returned [OracleSender]. The sequence ends once every sender is dropped.
pub fn channel_oracle() -> (OracleSender, ChannelOracle) {
    let (tx, rx) = flume::unbounded();
    (OracleSender { tx }, ChannelOracle { rx })
}

#[derive(Clone)]
/// The producing side of a [ChannelOracle].
pub struct OracleSender {
    tx: flume::Sender<Result<Snapshot, OracleError>>,
}

impl OracleSender {
    /// Publishes a new snapshot.
    pub fn publish(&self, snapshot: Snapshot) {
        let _ = self.tx.send(Ok(snapshot));
    }

    /// Reports that the source is currently unavailable.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(OracleError::Unavailable(reason.into())));
    }
}

/// A liveness oracle which yields whatever its [OracleSender]s publish.
pub struct ChannelOracle {
    rx: flume::Receiver<Result<Snapshot, OracleError>>,
}

#[async_trait]
impl LivenessOracle for ChannelOracle {
    async fn next(&mut self) -> Result<Option<Snapshot>, OracleError> {
        match self.rx.recv_async().await {
            Ok(Ok(snapshot)) => Ok(Some(snapshot)),
            Ok(Err(e)) => Err(e),
            Err(flume::RecvError::Disconnected) => Ok(None),
        }
    }
}
