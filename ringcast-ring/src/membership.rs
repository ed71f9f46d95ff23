use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use crate::error::OracleError;
use crate::oracle::{LivenessOracle, Snapshot};
use crate::ring::{HashRing, NodeId};
use crate::statistics::RingStatistics;

pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_millis(100);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
/// Retry behaviour of the membership controller.
pub struct OracleConfig {
    /// The delay after the first consecutive oracle error.
    pub backoff_initial: Duration,
    /// The upper bound on the retry delay.
    pub backoff_max: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backoff_initial: DEFAULT_BACKOFF_INITIAL,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl OracleConfig {
    /// Set the delay used after the first consecutive oracle error.
    pub fn with_backoff_initial(mut self, delay: Duration) -> Self {
        self.backoff_initial = delay;
        self
    }

    /// Set the upper bound on the retry delay.
    pub fn with_backoff_max(mut self, delay: Duration) -> Self {
        self.backoff_max = delay;
        self
    }
}

#[derive(Debug)]
/// Exponential backoff, doubling per call until it reaches its ceiling.
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub(crate) fn new(config: &OracleConfig) -> Self {
        Self {
            initial: config.backoff_initial,
            max: config.backoff_max.max(config.backoff_initial),
            current: None,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial,
            Some(current) => current.saturating_mul(2).min(self.max),
        };
        self.current = Some(delay);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// The difference between two consecutive ring rebuilds.
pub struct MembershipChange {
    /// The snapshot version the ring was rebuilt from.
    pub version: u64,
    /// Members which are new in this version.
    pub joined: Vec<NodeId>,
    /// Members which are no longer part of the ring.
    pub left: Vec<NodeId>,
}

impl MembershipChange {
    /// Returns if the rebuild did not change the member set.
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Keeps a [HashRing] in line with the snapshots of a [LivenessOracle].
pub struct MembershipController {
    ring: Arc<HashRing>,
    config: OracleConfig,
    statistics: RingStatistics,
}

impl MembershipController {
    /// Create a new controller for the given ring.
    pub fn new(ring: Arc<HashRing>, config: OracleConfig) -> Self {
        Self {
            ring,
            config,
            statistics: RingStatistics::default(),
        }
    }

    /// Use an existing statistics handle instead of a fresh one.
    pub fn with_statistics(mut self, statistics: RingStatistics) -> Self {
        self.statistics = statistics;
        self
    }

    /// Starts consuming the oracle in a background task.
    pub fn spawn<O>(self, oracle: O) -> MembershipHandle
    where
        O: LivenessOracle,
    {
        let (changes_tx, changes_rx) = watch::channel(MembershipChange::default());
        let statistics = self.statistics.clone();
        let ring = self.ring.clone();

        let task = tokio::spawn(watch_liveness(
            self.ring,
            self.config,
            self.statistics,
            oracle,
            changes_tx,
        ));

        MembershipHandle {
            ring,
            statistics,
            changes: changes_rx,
            task,
        }
    }
}

/// A handle to a running membership controller.
///
/// The controller is stopped when the handle is dropped.
pub struct MembershipHandle {
    ring: Arc<HashRing>,
    statistics: RingStatistics,
    changes: watch::Receiver<MembershipChange>,
    task: JoinHandle<()>,
}

impl MembershipHandle {
    #[inline]
    /// The ring being maintained.
    pub fn ring(&self) -> &Arc<HashRing> {
        &self.ring
    }

    #[inline]
    /// Live statistics of the controller.
    pub fn statistics(&self) -> RingStatistics {
        self.statistics.clone()
    }

    /// Subscribes to the changes applied by each ring rebuild.
    pub fn subscribe(&self) -> watch::Receiver<MembershipChange> {
        self.changes.clone()
    }

    /// Subscribes to membership changes as a stream.
    pub fn change_stream(&self) -> WatchStream<MembershipChange> {
        WatchStream::new(self.changes.clone())
    }

    /// Returns if the controller is no longer consuming the oracle.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the controller, leaving the ring as it currently is.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for MembershipHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watches the liveness oracle and rebuilds the ring on every new snapshot.
async fn watch_liveness<O>(
    ring: Arc<HashRing>,
    config: OracleConfig,
    statistics: RingStatistics,
    mut oracle: O,
    changes_tx: watch::Sender<MembershipChange>,
) where
    O: LivenessOracle,
{
    let mut backoff = Backoff::new(&config);
    let mut last_version: Option<u64> = None;

    loop {
        let snapshot = match oracle.next().await {
            Ok(Some(snapshot)) => {
                backoff.reset();
                snapshot
            },
            Ok(None) | Err(OracleError::Closed) => {
                info!("Liveness oracle has finished, membership controller is stopping.");
                break;
            },
            Err(e) => {
                statistics.num_oracle_errors.fetch_add(1, Ordering::Relaxed);
                let delay = backoff.next_delay();
                warn!(
                    error = ?e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Failed to get snapshot from liveness oracle."
                );
                tokio::time::sleep(delay).await;
                continue;
            },
        };

        if let Some(last) = last_version {
            if snapshot.version <= last {
                statistics
                    .num_stale_snapshots
                    .fetch_add(1, Ordering::Relaxed);
                debug!(
                    version = snapshot.version,
                    last_version = last,
                    "Discarding stale membership snapshot."
                );
                continue;
            }
        }

        if snapshot.members.is_empty() && !ring.is_empty() {
            statistics
                .num_rejected_snapshots
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                version = snapshot.version,
                num_members = ring.len(),
                "Refusing empty membership snapshot, keeping the current ring."
            );
            continue;
        }

        let change = apply_snapshot(&ring, &snapshot);
        last_version = Some(snapshot.version);

        statistics.num_rebuilds.fetch_add(1, Ordering::Relaxed);
        statistics
            .num_members
            .store(snapshot.members.len() as u64, Ordering::Relaxed);

        info!(
            version = snapshot.version,
            members = ?snapshot.members,
            num_joined = change.joined.len(),
            num_left = change.left.len(),
            "Hash ring has been rebuilt."
        );

        let _ = changes_tx.send(change);
    }
}

fn apply_snapshot(ring: &HashRing, snapshot: &Snapshot) -> MembershipChange {
    let previous = ring.members().into_iter().collect::<BTreeSet<_>>();
    ring.rebuild(&snapshot.members);

    let joined = snapshot
        .members
        .iter()
        .filter(|node| !previous.contains(node.as_str()))
        .map(|node| NodeId::from(node.as_str()))
        .collect();
    let left = previous
        .into_iter()
        .filter(|node| !snapshot.members.contains(&**node))
        .collect();

    MembershipChange {
        version: snapshot.version,
        joined,
        left,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::RingConfig;

    #[test]
    fn test_backoff_doubles_until_ceiling() {
        let config = OracleConfig::default()
            .with_backoff_initial(Duration::from_millis(100))
            .with_backoff_max(Duration::from_millis(500));
        let mut backoff = Backoff::new(&config);

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_apply_snapshot_diff() {
        let ring = HashRing::with_members(RingConfig::default(), ["a", "b", "c"]);
        let change = apply_snapshot(&ring, &Snapshot::new(4, ["b", "c", "d"]));

        assert_eq!(change.version, 4);
        assert_eq!(change.joined, vec![NodeId::from("d")]);
        assert_eq!(change.left, vec![NodeId::from("a")]);
        assert!(!change.is_empty());

        let mut members = ring.members();
        members.sort();
        assert_eq!(
            members,
            vec![NodeId::from("b"), NodeId::from("c"), NodeId::from("d")]
        );
    }
}
