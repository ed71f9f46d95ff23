use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use ringcast_ring::{HashRing, MembershipChange, NodeId};
use ringcast_rpc::{event_channel, ClientEvent, EventReceiver, RpcError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::network::RpcNetwork;
use crate::point::MetricPoint;
use crate::statistics::DispatchStatistics;
use crate::sync_record::{SyncRecord, SyncRecords};

const UNROUTABLE_WARN_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// The outcome of a dispatched batch.
pub struct DispatchReport {
    /// Points accepted by their owner.
    pub delivered: usize,
    /// Points whose sub-batch failed.
    pub dropped: usize,
    /// Points which had no owner.
    pub unroutable: usize,
}

#[derive(Debug, Default)]
/// The points of a batch grouped by their owner.
///
/// Within each sub-batch the points keep the order of the batch.
pub struct DispatchPlan {
    pub sub_batches: BTreeMap<NodeId, Vec<MetricPoint>>,
    pub unroutable: usize,
}

impl DispatchPlan {
    /// Groups the batch using a single view of the ring.
    pub fn build(ring: &HashRing, batch: Vec<MetricPoint>) -> Self {
        let state = ring.snapshot();
        let mut plan = Self::default();
        for point in batch {
            match state.get(point.routing_key()) {
                Ok(owner) => plan.sub_batches.entry(owner).or_default().push(point),
                Err(_) => plan.unroutable += 1,
            }
        }
        plan
    }

    /// The number of routed points.
    pub fn num_routed(&self) -> usize {
        self.sub_batches.values().map(Vec::len).sum()
    }
}

/// Forwards batches of points to the ring member owning each point.
///
/// Every owner gets a single call carrying its sub-batch. Calls to distinct
/// owners run concurrently, failed sub-batches are dropped rather than
/// re-routed.
pub struct Dispatcher {
    ring: Arc<HashRing>,
    config: DispatcherConfig,
    network: RpcNetwork,
    records: SyncRecords,
    statistics: DispatchStatistics,
    last_unroutable_warning: Mutex<Option<Instant>>,
    events_task: JoinHandle<()>,
}

impl Dispatcher {
    /// Creates a new dispatcher routing over the given ring.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(ring: Arc<HashRing>, config: DispatcherConfig, records: SyncRecords) -> Self {
        let (events_tx, events_rx) = event_channel();
        let statistics = DispatchStatistics::default();
        let network = RpcNetwork::new(config.codec, config.client.clone(), events_tx);
        let events_task = tokio::spawn(watch_client_events(events_rx, statistics.clone()));

        Self {
            ring,
            config,
            network,
            records,
            statistics,
            last_unroutable_warning: Mutex::new(None),
            events_task,
        }
    }

    #[inline]
    pub fn ring(&self) -> &Arc<HashRing> {
        &self.ring
    }

    #[inline]
    /// Get access to the per-owner clients.
    pub fn network(&self) -> &RpcNetwork {
        &self.network
    }

    #[inline]
    pub fn records(&self) -> &SyncRecords {
        &self.records
    }

    #[inline]
    /// Gets the live dispatcher statistics.
    pub fn statistics(&self) -> DispatchStatistics {
        self.statistics.clone()
    }

    #[inline]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// The sync-record key of an owner.
    pub fn label(&self, owner: &str) -> String {
        format!("{}{}", self.config.label_prefix, owner)
    }

    /// Drops the clients of members which left the ring.
    pub fn apply_membership_change(&self, change: &MembershipChange) {
        for node in change.left.iter() {
            self.network.disconnect(node);
        }
    }

    /// Forwards every point of the batch to its owner.
    ///
    /// Succeeds as long as at least one point was delivered. Partial
    /// failures are logged and reflected in the returned report.
    pub async fn dispatch(
        &self,
        batch: Vec<MetricPoint>,
    ) -> Result<DispatchReport, DispatchError> {
        if batch.is_empty() {
            return Ok(DispatchReport::default());
        }

        self.statistics.num_batches.fetch_add(1, Ordering::Relaxed);

        let plan = DispatchPlan::build(&self.ring, batch);
        let unroutable = plan.unroutable;
        if unroutable > 0 {
            self.statistics
                .num_unroutable_points
                .fetch_add(unroutable as u64, Ordering::Relaxed);
            self.warn_unroutable(unroutable);
        }

        if plan.sub_batches.is_empty() {
            return Err(DispatchError::Unroutable {
                dropped: unroutable,
            });
        }

        let outcomes = self.execute_plan(plan.sub_batches).await;

        let mut report = DispatchReport {
            unroutable,
            ..Default::default()
        };
        let mut errors = Vec::new();
        for (owner, count, result) in outcomes {
            match result {
                Ok(()) => report.delivered += count,
                Err(e) => {
                    report.dropped += count;
                    errors.push((owner, e));
                },
            }
        }

        self.statistics
            .num_delivered_points
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.statistics
            .num_dropped_points
            .fetch_add(report.dropped as u64, Ordering::Relaxed);

        if report.delivered == 0 {
            error!(
                dropped = report.dropped,
                unroutable = report.unroutable,
                errors = ?errors,
                "Failed to dispatch batch to any owner."
            );
            return Err(DispatchError::AllFailed {
                dropped: report.dropped,
                errors,
            });
        }

        if !errors.is_empty() {
            warn!(
                delivered = report.delivered,
                dropped = report.dropped,
                num_failed_owners = errors.len(),
                "Batch was only partially dispatched.",
            );
        }

        Ok(report)
    }

    async fn execute_plan(
        &self,
        sub_batches: BTreeMap<NodeId, Vec<MetricPoint>>,
    ) -> Vec<(NodeId, usize, Result<(), RpcError>)> {
        let limiter = Arc::new(Semaphore::new(self.config.max_concurrent_requests));
        let method: Arc<str> = Arc::from(self.config.method.as_str());

        let mut owners = Vec::with_capacity(sub_batches.len());
        let mut tasks = Vec::with_capacity(sub_batches.len());
        for (owner, points) in sub_batches {
            let limiter = limiter.clone();
            let method = method.clone();
            let client = self.network.get_or_connect(&owner);

            owners.push((owner, points.len()));
            let task = tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                let start = Instant::now();
                let res = client.call::<_, ()>(&*method, &points).await;
                (start.elapsed(), res)
            });
            tasks.push(task);
        }

        let results = futures::future::join_all(tasks).await;

        let mut outcomes = Vec::with_capacity(owners.len());
        for ((owner, count), joined) in owners.into_iter().zip(results) {
            let (elapsed, res) = match joined {
                Ok(outcome) => outcome,
                Err(e) => (Duration::ZERO, Err(RpcError::Protocol(e.to_string()))),
            };

            let label = self.label(&owner);
            let elapsed_ms = elapsed.as_millis() as u64;
            let endpoint_stats = self.statistics.endpoint_or_default(&owner);
            match res.as_ref() {
                Ok(_) => {
                    endpoint_stats.record_success(count);
                    self.records.put(label, SyncRecord::now(elapsed_ms, count, ""));
                },
                Err(e) => {
                    endpoint_stats.record_failure(count);
                    self.records
                        .put(label, SyncRecord::now(elapsed_ms, count, e.to_string()));
                    debug!(
                        owner = %owner,
                        num_points = count,
                        error = ?e,
                        "Failed to forward sub-batch to owner.",
                    );
                },
            }

            outcomes.push((owner, count, res));
        }

        outcomes
    }

    fn warn_unroutable(&self, num_points: usize) {
        let mut last = self.last_unroutable_warning.lock();
        let due = last
            .map(|at| at.elapsed() >= UNROUTABLE_WARN_INTERVAL)
            .unwrap_or(true);
        if due {
            *last = Some(Instant::now());
            warn!(
                num_points = num_points,
                "Dropping points without an owner, the ring has no members."
            );
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.events_task.abort();
    }
}

/// Keeps the per-endpoint statistics in line with the client events.
async fn watch_client_events(events: EventReceiver, statistics: DispatchStatistics) {
    while let Ok(event) = events.recv_async().await {
        match event {
            ClientEvent::Connected { endpoint, name } => {
                trace!(endpoint = %endpoint, connection = %name, "Connected to endpoint.");
            },
            ClientEvent::Failed { endpoint, error } => {
                debug!(endpoint = %endpoint, error = %error, "Failed to connect to endpoint.");
            },
            ClientEvent::Closed {
                endpoint,
                name,
                reason,
            } => {
                statistics
                    .endpoint_or_default(&endpoint)
                    .connections_closed
                    .fetch_add(1, Ordering::Relaxed);
                debug!(
                    endpoint = %endpoint,
                    connection = %name,
                    reason = %reason,
                    "Connection to endpoint was closed."
                );
            },
        }
    }
}
