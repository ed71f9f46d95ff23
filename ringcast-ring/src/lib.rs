//! A consistent hash ring mapping keys onto a changing set of member nodes,
//! plus the controller keeping that ring in line with a liveness source.
//!
//! ```rust
//! use ringcast_ring::{HashRing, RingConfig};
//!
//! let ring = HashRing::with_members(RingConfig::for_dispatch(), ["a:1", "b:2"]);
//! let owner = ring.get("cpu.idle/host=a").unwrap();
//! assert!(ring.contains(&owner));
//! ```

#[macro_use]
extern crate tracing;

mod assignment;
mod error;
pub mod hash;
mod membership;
mod oracle;
mod ring;
mod statistics;

pub use assignment::RuleAssignment;
pub use error::{OracleError, RingError};
pub use hash::{key_hash, replica_position};
pub use membership::{
    MembershipChange,
    MembershipController,
    MembershipHandle,
    OracleConfig,
    DEFAULT_BACKOFF_INITIAL,
    DEFAULT_BACKOFF_MAX,
};
pub use oracle::{channel_oracle, ChannelOracle, LivenessOracle, OracleSender, Snapshot};
pub use ring::{
    HashRing,
    NodeId,
    RingConfig,
    RingState,
    DEFAULT_DISPATCH_REPLICAS,
    DEFAULT_REPLICAS,
};
pub use statistics::RingStatistics;
