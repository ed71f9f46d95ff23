use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

pub type Counter = AtomicU64;

#[derive(Debug, Clone, Default)]
/// Live metrics around the dispatcher.
pub struct DispatchStatistics(Arc<DispatchStatisticsInner>);

impl Deref for DispatchStatistics {
    type Target = DispatchStatisticsInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Default)]
pub struct DispatchStatisticsInner {
    /// The number of batches handed to the dispatcher.
    pub(crate) num_batches: Counter,
    /// The number of points delivered to their owner.
    pub(crate) num_delivered_points: Counter,
    /// The number of points whose sub-batch failed.
    pub(crate) num_dropped_points: Counter,
    /// The number of points without an owner.
    pub(crate) num_unroutable_points: Counter,
    endpoints: RwLock<BTreeMap<String, EndpointStatistics>>,
}

impl DispatchStatisticsInner {
    /// The number of batches handed to the dispatcher.
    pub fn num_batches(&self) -> u64 {
        self.num_batches.load(Ordering::Relaxed)
    }

    /// The number of points delivered to their owner.
    pub fn num_delivered_points(&self) -> u64 {
        self.num_delivered_points.load(Ordering::Relaxed)
    }

    /// The number of points whose sub-batch failed.
    pub fn num_dropped_points(&self) -> u64 {
        self.num_dropped_points.load(Ordering::Relaxed)
    }

    /// The number of points without an owner.
    pub fn num_unroutable_points(&self) -> u64 {
        self.num_unroutable_points.load(Ordering::Relaxed)
    }

    /// The statistics of a single endpoint, if anything was recorded for it.
    ///
    /// Call counters are keyed by the owner id, connection counters by the
    /// address connected to. The two coincide unless explicit endpoints were
    /// registered for an owner.
    pub fn endpoint(&self, endpoint: &str) -> Option<EndpointStatistics> {
        self.endpoints.read().get(endpoint).cloned()
    }

    /// Every endpoint which has statistics recorded.
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.read().keys().cloned().collect()
    }

    pub(crate) fn endpoint_or_default(&self, endpoint: &str) -> EndpointStatistics {
        if let Some(stats) = self.endpoint(endpoint) {
            return stats;
        }

        self.endpoints
            .write()
            .entry(endpoint.to_string())
            .or_default()
            .clone()
    }
}

#[derive(Debug, Clone, Default)]
/// Live metrics of a single endpoint.
pub struct EndpointStatistics(Arc<EndpointStatisticsInner>);

impl Deref for EndpointStatistics {
    type Target = EndpointStatisticsInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Default)]
pub struct EndpointStatisticsInner {
    pub(crate) success_points: Counter,
    pub(crate) failure_points: Counter,
    pub(crate) calls_ok: Counter,
    pub(crate) calls_failed: Counter,
    pub(crate) connections_closed: Counter,
}

impl EndpointStatisticsInner {
    /// The number of points delivered to the endpoint.
    pub fn success_points(&self) -> u64 {
        self.success_points.load(Ordering::Relaxed)
    }

    /// The number of points which failed to reach the endpoint.
    pub fn failure_points(&self) -> u64 {
        self.failure_points.load(Ordering::Relaxed)
    }

    /// The number of successful calls.
    pub fn calls_ok(&self) -> u64 {
        self.calls_ok.load(Ordering::Relaxed)
    }

    /// The number of failed calls.
    pub fn calls_failed(&self) -> u64 {
        self.calls_failed.load(Ordering::Relaxed)
    }

    /// The number of connections closed after a transport error.
    pub fn connections_closed(&self) -> u64 {
        self.connections_closed.load(Ordering::Relaxed)
    }

    pub(crate) fn record_success(&self, points: usize) {
        self.calls_ok.fetch_add(1, Ordering::Relaxed);
        self.success_points
            .fetch_add(points as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, points: usize) {
        self.calls_failed.fetch_add(1, Ordering::Relaxed);
        self.failure_points
            .fetch_add(points as u64, Ordering::Relaxed);
    }
}
