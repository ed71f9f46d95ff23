//! # Ringcast
//! Tooling for spreading ingested metric samples across a fleet of stateless workers.
//!
//! This is a convenience package which includes all of the sub-projects within
//! Ringcast:
//!
//! ### Features
//! - `ringcast_ring` - A consistent hash ring and the membership controller which rebuilds it.
//! - `ringcast_rpc` - A length-prefixed TCP RPC framework with pooled, multi-endpoint clients.
//! - `ringcast_dispatch` - The batch dispatcher, sync-record store and ingest/judge services.

#[cfg(feature = "ringcast-dispatch")]
pub use ringcast_dispatch as dispatch;
#[cfg(feature = "ringcast-ring")]
pub use ringcast_ring as ring;
#[cfg(feature = "ringcast-rpc")]
pub use ringcast_rpc as rpc;
