use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::RingError;
use crate::hash::{key_hash, replica_position};

/// A ring member identifier, typically `host:port`.
pub type NodeId = Arc<str>;

/// The replica count used by the sample dispatch ring.
pub const DEFAULT_DISPATCH_REPLICAS: usize = 500;
/// The replica count used by every other ring, e.g. rule assignment.
pub const DEFAULT_REPLICAS: usize = 20;

#[derive(Debug, Clone)]
/// Configuration for a hash ring.
pub struct RingConfig {
    /// The number of virtual positions each member occupies.
    pub replicas: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_REPLICAS,
        }
    }
}

impl RingConfig {
    /// The configuration used for sharding samples onto judges.
    pub fn for_dispatch() -> Self {
        Self {
            replicas: DEFAULT_DISPATCH_REPLICAS,
        }
    }

    /// Set the number of replicas per node.
    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }
}

#[derive(Debug, Clone, Default)]
/// An immutable view of the ring at one point in time.
///
/// Each member owns `replicas` positions. When two members claim the same
/// position the byte-wise greater id owns it and the other claim is kept
/// aside so it can take over again if the owner leaves. This makes the state
/// a pure function of the member set, regardless of the order members were
/// added or removed in.
pub struct RingState {
    circle: BTreeMap<u32, NodeId>,
    displaced: BTreeMap<u32, BTreeSet<NodeId>>,
    members: BTreeSet<NodeId>,
}

impl RingState {
    /// Builds a fresh ring state from a set of members.
    pub fn build<I, S>(replicas: usize, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = Self::default();
        for member in members {
            state.add(replicas, member.as_ref());
        }
        state
    }

    #[inline]
    /// The number of members in the ring.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    /// Returns if the ring has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    /// Returns if the given node is a member of the ring.
    pub fn contains(&self, node: &str) -> bool {
        self.members.contains(node)
    }

    #[inline]
    /// The number of occupied positions on the ring.
    pub fn num_positions(&self) -> usize {
        self.circle.len()
    }

    /// The current members in id order.
    pub fn members(&self) -> Vec<NodeId> {
        self.members.iter().cloned().collect()
    }

    /// The node owning the position at `position`, if any.
    pub fn owner_of(&self, position: u32) -> Option<&NodeId> {
        self.circle.get(&position)
    }

    /// Locates the owner of the given key.
    ///
    /// This is the node at the first position greater than or equal to the
    /// key's hash, wrapping around to the lowest position.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<NodeId, RingError> {
        self.walk(key_hash(key.as_ref()))
            .next()
            .cloned()
            .ok_or(RingError::EmptyRing)
    }

    /// Locates the owner of the key and the next distinct node after it.
    ///
    /// The second node is `None` when the ring only has one member.
    pub fn get_two(
        &self,
        key: impl AsRef<[u8]>,
    ) -> Result<(NodeId, Option<NodeId>), RingError> {
        let mut walk = self.walk(key_hash(key.as_ref()));
        let first = walk.next().cloned().ok_or(RingError::EmptyRing)?;
        let second = walk.find(|node| **node != first).cloned();
        Ok((first, second))
    }

    /// Collects the first `n` distinct nodes walking forward from the key.
    ///
    /// At most `len()` nodes are returned.
    pub fn get_n(
        &self,
        key: impl AsRef<[u8]>,
        n: usize,
    ) -> Result<Vec<NodeId>, RingError> {
        if self.is_empty() {
            return Err(RingError::EmptyRing);
        }

        let limit = n.min(self.members.len());
        let mut nodes: Vec<NodeId> = Vec::with_capacity(limit);
        for node in self.walk(key_hash(key.as_ref())) {
            if nodes.len() >= limit {
                break;
            }

            if !nodes.contains(node) {
                nodes.push(node.clone());
            }
        }

        Ok(nodes)
    }

    fn walk(&self, hash: u32) -> impl Iterator<Item = &NodeId> {
        self.circle
            .range(hash..)
            .chain(self.circle.range(..hash))
            .map(|(_, node)| node)
    }

    pub(crate) fn add(&mut self, replicas: usize, node: &str) {
        if self.members.contains(node) {
            return;
        }

        let id: NodeId = Arc::from(node);
        for index in 0..replicas {
            self.claim(replica_position(node, index), &id);
        }
        self.members.insert(id);
    }

    pub(crate) fn remove(&mut self, replicas: usize, node: &str) {
        if !self.members.remove(node) {
            return;
        }

        for index in 0..replicas {
            self.release(replica_position(node, index), node);
        }
    }

    fn claim(&mut self, position: u32, id: &NodeId) {
        let current = match self.circle.get(&position) {
            None => {
                self.circle.insert(position, id.clone());
                return;
            },
            Some(current) if current == id => return,
            Some(current) => current.clone(),
        };

        let loser = if *id > current {
            self.circle.insert(position, id.clone());
            current
        } else {
            id.clone()
        };
        self.displaced.entry(position).or_default().insert(loser);
    }

    fn release(&mut self, position: u32, node: &str) {
        let is_owner = self
            .circle
            .get(&position)
            .map(|owner| &**owner == node)
            .unwrap_or(false);

        if is_owner {
            match self.take_displaced(position, |claims| claims.pop_last()) {
                Some(next) => {
                    self.circle.insert(position, next);
                },
                None => {
                    self.circle.remove(&position);
                },
            }
        } else {
            self.take_displaced(position, |claims| {
                claims.remove(node);
                None
            });
        }
    }

    fn take_displaced(
        &mut self,
        position: u32,
        op: impl FnOnce(&mut BTreeSet<NodeId>) -> Option<NodeId>,
    ) -> Option<NodeId> {
        let claims = self.displaced.get_mut(&position)?;
        let taken = op(claims);
        if claims.is_empty() {
            self.displaced.remove(&position);
        }
        taken
    }
}

/// A thread-safe consistent hash ring.
///
/// Readers take a shared lock just long enough to look up a key (or clone the
/// current [RingState]), writers take the exclusive lock. Writes are
/// copy-on-write, so a [RingState] obtained through [HashRing::snapshot] never
/// changes underneath its holder.
pub struct HashRing {
    replicas: usize,
    state: RwLock<Arc<RingState>>,
}

impl HashRing {
    /// Creates a new, empty ring.
    pub fn new(config: RingConfig) -> Self {
        Self {
            replicas: config.replicas,
            state: RwLock::new(Arc::new(RingState::default())),
        }
    }

    /// Creates a new ring populated with the given members.
    pub fn with_members<I, S>(config: RingConfig, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let state = RingState::build(config.replicas, members);
        Self {
            replicas: config.replicas,
            state: RwLock::new(Arc::new(state)),
        }
    }

    #[inline]
    /// The number of replicas each member occupies.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    #[inline]
    /// Get the current state of the ring.
    ///
    /// Lookups against a snapshot are consistent with each other even if the
    /// ring is rebuilt in the meantime.
    pub fn snapshot(&self) -> Arc<RingState> {
        self.state.read().clone()
    }

    /// Registers a node with the ring.
    ///
    /// This is a no-op if the node is already a member. When a replica lands
    /// on a position another member already holds, the position goes to the
    /// byte-wise greater node id rather than to the node added last, so the
    /// ring only depends on the member set and not on the order of adds. The
    /// losing claim comes back if the winner is removed.
    pub fn add(&self, node: &str) {
        let mut guard = self.state.write();
        if guard.contains(node) {
            return;
        }
        Arc::make_mut(&mut *guard).add(self.replicas, node);
    }

    /// Removes a node from the ring.
    ///
    /// This is a no-op if the node is not a member.
    pub fn remove(&self, node: &str) {
        let mut guard = self.state.write();
        if !guard.contains(node) {
            return;
        }
        Arc::make_mut(&mut *guard).remove(self.replicas, node);
    }

    /// Replaces the membership with exactly the given nodes.
    ///
    /// Departed nodes are removed first, then new nodes are added, all under a
    /// single write lock. Unchanged nodes keep their positions.
    pub fn set<I, S>(&self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted = nodes
            .into_iter()
            .map(|node| node.as_ref().to_string())
            .collect::<BTreeSet<_>>();

        let mut guard = self.state.write();
        let state = Arc::make_mut(&mut *guard);

        let departed = state
            .members
            .iter()
            .filter(|node| !wanted.contains::<str>(node))
            .cloned()
            .collect::<Vec<_>>();
        for node in departed {
            state.remove(self.replicas, &node);
        }

        for node in wanted.iter() {
            state.add(self.replicas, node);
        }
    }

    /// Builds a fresh ring state for the given nodes and swaps it in.
    ///
    /// The build happens outside of the lock, only the swap is exclusive.
    pub fn rebuild<I, S>(&self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fresh = Arc::new(RingState::build(self.replicas, nodes));
        *self.state.write() = fresh;
    }

    /// Locates the owner of the given key.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<NodeId, RingError> {
        self.state.read().get(key)
    }

    /// Locates the owner of the key and the next distinct node after it.
    pub fn get_two(
        &self,
        key: impl AsRef<[u8]>,
    ) -> Result<(NodeId, Option<NodeId>), RingError> {
        self.state.read().get_two(key)
    }

    /// Collects the first `n` distinct nodes walking forward from the key.
    pub fn get_n(
        &self,
        key: impl AsRef<[u8]>,
        n: usize,
    ) -> Result<Vec<NodeId>, RingError> {
        self.state.read().get_n(key, n)
    }

    /// A snapshot of the current members.
    pub fn members(&self) -> Vec<NodeId> {
        self.state.read().members()
    }

    #[inline]
    /// The number of current members.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    #[inline]
    /// Returns if the ring has no members.
    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    #[inline]
    /// Returns if the node is a current member.
    pub fn contains(&self, node: &str) -> bool {
        self.state.read().contains(node)
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new(RingConfig::default())
    }
}
