//! # Ringcast Dispatch
//! Routes batches of metric samples to the worker owning each series.
//!
//! Every point is looked up on a consistent hash ring which is kept in line
//! with a liveness source by the membership controller of `ringcast-ring`.
//! The points of a batch are grouped by owner and each group is forwarded
//! with a single call through the pooled, multi-endpoint clients of
//! `ringcast-rpc`. The outcome of every forward is kept as a sync record
//! which operators can read from a loopback-only HTTP endpoint.
//!
//! ## Basic Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ringcast_dispatch::{Dispatcher, DispatcherConfig, MetricPoint, SyncRecords};
//! use ringcast_ring::{HashRing, RingConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let ring = Arc::new(HashRing::new(RingConfig::for_dispatch()));
//! let dispatcher = Dispatcher::new(ring.clone(), DispatcherConfig::default(), SyncRecords::default());
//!
//! // Without members nothing can be routed.
//! let point = MetricPoint::new("cpu.idle", [("host", "a")], 1_700_000_000, 0.93);
//! assert!(dispatcher.dispatch(vec![point]).await.is_err());
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate tracing;

mod config;
mod dispatcher;
mod error;
mod http;
mod network;
mod node;
mod point;
mod service;
mod statistics;
mod sync_record;

pub use config::{
    DispatcherConfig,
    NodeConfig,
    RpcConfig,
    DEFAULT_LABEL_PREFIX,
    MAX_CONCURRENT_REQUESTS,
};
pub use dispatcher::{DispatchPlan, DispatchReport, Dispatcher};
pub use error::{DispatchError, NodeError};
pub use http::{serve_sync_records, SyncRecordsEndpoint, SYNC_RECORDS_PATH};
pub use network::RpcNetwork;
pub use node::{RingcastNode, RingcastNodeBuilder};
pub use point::{series_key, MetricPoint};
pub use service::{
    IngestService,
    JudgeService,
    PointSink,
    PushToJudge,
    PushToTrans,
    PUSH_TO_JUDGE,
    PUSH_TO_TRANS,
};
pub use statistics::{DispatchStatistics, EndpointStatistics};
pub use sync_record::{SyncEntry, SyncRecord, SyncRecords};
