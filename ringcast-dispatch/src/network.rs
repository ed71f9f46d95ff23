use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use ringcast_ring::NodeId;
use ringcast_rpc::{ClientConfig, Codec, EventSender, MultiClient};

#[derive(Default)]
struct Peers {
    clients: HashMap<NodeId, Arc<MultiClient>>,
    endpoints: HashMap<NodeId, Vec<String>>,
}

#[derive(Clone)]
/// A collection of clients, one per ring member.
///
/// A member is reached at its own id unless explicit endpoints have been
/// registered for it with [RpcNetwork::set_endpoints].
pub struct RpcNetwork {
    codec: Codec,
    config: ClientConfig,
    events: EventSender,
    peers: Arc<RwLock<Peers>>,
}

impl RpcNetwork {
    pub fn new(codec: Codec, config: ClientConfig, events: EventSender) -> Self {
        Self {
            codec,
            config,
            events,
            peers: Default::default(),
        }
    }

    /// Gets the client of the given owner or creates a new one.
    ///
    /// No connection is established here, the client dials lazily on its
    /// first call. Concurrent callers for the same owner always share one
    /// client.
    pub fn get_or_connect(&self, owner: &NodeId) -> Arc<MultiClient> {
        {
            let guard = self.peers.read();
            if let Some(client) = guard.clients.get(owner) {
                return client.clone();
            }
        }

        let mut guard = self.peers.write();
        if let Some(client) = guard.clients.get(owner) {
            return client.clone();
        }

        let client = self.new_client(&guard, owner);
        guard.clients.insert(owner.clone(), client.clone());
        client
    }

    /// Creates a new client for the owner, replacing any existing one.
    pub fn connect(&self, owner: &NodeId) -> Arc<MultiClient> {
        let mut guard = self.peers.write();
        let client = self.new_client(&guard, owner);
        if let Some(old) = guard.clients.insert(owner.clone(), client.clone()) {
            old.close();
        }
        client
    }

    fn new_client(&self, peers: &Peers, owner: &NodeId) -> Arc<MultiClient> {
        let endpoints = peers
            .endpoints
            .get(owner)
            .cloned()
            .unwrap_or_else(|| vec![owner.to_string()]);
        Arc::new(
            MultiClient::new(endpoints, self.codec, self.config.clone())
                .with_events(self.events.clone()),
        )
    }

    /// Registers the endpoints an owner is reachable at.
    ///
    /// An existing client of the owner is updated in place.
    pub fn set_endpoints<I, S>(&self, owner: &str, endpoints: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints = endpoints.into_iter().map(Into::into).collect::<Vec<_>>();
        let mut guard = self.peers.write();
        if let Some(client) = guard.clients.get(owner) {
            client.set_endpoints(endpoints.clone());
        }
        guard.endpoints.insert(NodeId::from(owner), endpoints);
    }

    /// Drops the client of the owner, closing its idle connections.
    ///
    /// Registered endpoints are kept so the owner can rejoin.
    pub fn disconnect(&self, owner: &str) {
        let removed = self.peers.write().clients.remove(owner);
        if let Some(client) = removed {
            client.close();
        }
    }

    /// The owners which currently have a client.
    pub fn owners(&self) -> Vec<NodeId> {
        let mut owners = self
            .peers
            .read()
            .clients
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        owners.sort();
        owners
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use ringcast_rpc::event_channel;

    use super::*;

    #[test]
    fn test_clients_are_reused() {
        let (tx, _rx) = event_channel();
        let network = RpcNetwork::new(Codec::Cbor, ClientConfig::default(), tx);

        let owner = NodeId::from("127.0.0.1:7001");
        let first = network.get_or_connect(&owner);
        let second = network.get_or_connect(&owner);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.endpoints(), vec!["127.0.0.1:7001".to_string()]);

        network.disconnect("127.0.0.1:7001");
        assert!(network.owners().is_empty());
        let third = network.get_or_connect(&owner);
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_concurrent_lookups_share_client() {
        let (tx, _rx) = event_channel();
        let network = RpcNetwork::new(Codec::Cbor, ClientConfig::default(), tx);
        let owner = NodeId::from("127.0.0.1:7001");
        let barrier = Arc::new(Barrier::new(8));

        let handles = (0..8)
            .map(|_| {
                let network = network.clone();
                let owner = owner.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    network.get_or_connect(&owner)
                })
            })
            .collect::<Vec<_>>();
        let clients = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        let stored = network.get_or_connect(&owner);
        for client in clients.iter() {
            assert!(Arc::ptr_eq(client, &stored));
        }
        assert_eq!(network.owners(), vec![owner]);
    }

    #[test]
    fn test_explicit_endpoints() {
        let (tx, _rx) = event_channel();
        let network = RpcNetwork::new(Codec::Cbor, ClientConfig::default(), tx);

        let owner = NodeId::from("judge-1");
        network.set_endpoints("judge-1", ["10.0.0.1:7001", "10.0.0.2:7001"]);
        let client = network.get_or_connect(&owner);
        assert_eq!(
            client.endpoints(),
            vec!["10.0.0.1:7001".to_string(), "10.0.0.2:7001".to_string()]
        );

        network.set_endpoints("judge-1", ["10.0.0.3:7001"]);
        assert_eq!(client.endpoints(), vec!["10.0.0.3:7001".to_string()]);

        // Registrations outlive the client.
        network.disconnect("judge-1");
        let client = network.get_or_connect(&owner);
        assert_eq!(client.endpoints(), vec!["10.0.0.3:7001".to_string()]);
    }
}
