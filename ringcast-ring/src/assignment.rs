use std::sync::Arc;

use crate::error::RingError;
use crate::ring::{HashRing, NodeId, RingState};

/// Decides which alert rules a judge should pull for itself.
///
/// Every judge builds the same ring from the same member set, so each rule
/// key is owned by exactly one of them without any coordination.
pub struct RuleAssignment {
    me: NodeId,
    ring: Arc<HashRing>,
}

impl RuleAssignment {
    /// Create a new assignment for the local node `me`.
    pub fn new(me: impl Into<NodeId>, ring: Arc<HashRing>) -> Self {
        Self {
            me: me.into(),
            ring,
        }
    }

    #[inline]
    /// The local node id.
    pub fn me(&self) -> &str {
        &self.me
    }

    /// Returns if the local node owns the given rule.
    pub fn is_owner(&self, rule_key: impl AsRef<[u8]>) -> Result<bool, RingError> {
        let owner = self.ring.get(rule_key)?;
        Ok(owner == self.me)
    }

    /// Filters the rule keys down to those owned by the local node.
    pub fn owned<K, I>(&self, rule_keys: I) -> Result<Vec<K>, RingError>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        Self::owned_by(&self.ring.snapshot(), &self.me, rule_keys)
    }

    /// Filters the rule keys down to those owned by `me` in the given ring.
    ///
    /// All keys are resolved against the same ring state.
    pub fn owned_by<K, I>(
        ring: &RingState,
        me: &str,
        rule_keys: I,
    ) -> Result<Vec<K>, RingError>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        let mut owned = Vec::new();
        for key in rule_keys {
            if &*ring.get(key.as_ref())? == me {
                owned.push(key);
            }
        }
        Ok(owned)
    }
}
