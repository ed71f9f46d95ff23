use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Counter = AtomicU64;

#[derive(Debug, Clone, Default)]
/// Live metrics around the membership controller.
pub struct RingStatistics(Arc<RingStatisticsInner>);

impl Deref for RingStatistics {
    type Target = RingStatisticsInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Default)]
pub struct RingStatisticsInner {
    /// The number of members in the ring after the last rebuild.
    pub(crate) num_members: Counter,
    /// The number of times the ring has been rebuilt from a snapshot.
    pub(crate) num_rebuilds: Counter,
    /// The number of empty snapshots which were refused.
    pub(crate) num_rejected_snapshots: Counter,
    /// The number of snapshots discarded for arriving out of order.
    pub(crate) num_stale_snapshots: Counter,
    /// The number of errors returned by the liveness oracle.
    pub(crate) num_oracle_errors: Counter,
}

impl RingStatisticsInner {
    /// The number of members in the ring after the last rebuild.
    pub fn num_members(&self) -> u64 {
        self.num_members.load(Ordering::Relaxed)
    }

    /// The number of times the ring has been rebuilt from a snapshot.
    pub fn num_rebuilds(&self) -> u64 {
        self.num_rebuilds.load(Ordering::Relaxed)
    }

    /// The number of empty snapshots which were refused.
    pub fn num_rejected_snapshots(&self) -> u64 {
        self.num_rejected_snapshots.load(Ordering::Relaxed)
    }

    /// The number of snapshots discarded for arriving out of order.
    pub fn num_stale_snapshots(&self) -> u64 {
        self.num_stale_snapshots.load(Ordering::Relaxed)
    }

    /// The number of errors returned by the liveness oracle.
    pub fn num_oracle_errors(&self) -> u64 {
        self.num_oracle_errors.load(Ordering::Relaxed)
    }
}
