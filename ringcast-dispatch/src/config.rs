use std::net::SocketAddr;
use std::time::Duration;

use ringcast_ring::{OracleConfig, RingConfig};
use ringcast_rpc::{
    ClientConfig,
    Codec,
    PoolConfig,
    CBOR_PROTOCOL,
    DEFAULT_CALL_TIMEOUT,
    DEFAULT_DIAL_TIMEOUT,
};

use crate::service::PUSH_TO_JUDGE;

pub const MAX_CONCURRENT_REQUESTS: usize = 10;
pub const DEFAULT_LABEL_PREFIX: &str = "forward.";

#[derive(Debug, Clone)]
/// Configuration for the dispatcher.
pub struct DispatcherConfig {
    /// The RPC method each sub-batch is sent to.
    pub method: String,
    /// Prefix of the sync-record key of each owner.
    pub label_prefix: String,
    /// The maximum number of owners called at once for a single batch.
    pub max_concurrent_requests: usize,
    /// The payload codec of outgoing calls.
    pub codec: Codec,
    /// Timeouts and pool limits of the per-owner clients.
    pub client: ClientConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            method: PUSH_TO_JUDGE.to_string(),
            label_prefix: DEFAULT_LABEL_PREFIX.to_string(),
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
            codec: Codec::default(),
            client: ClientConfig::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.label_prefix = prefix.into();
        self
    }

    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit.max(1);
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }
}

#[derive(Debug, Clone)]
/// Configuration for the RPC server and its outgoing calls.
pub struct RpcConfig {
    /// The binding address for the RPC server to bind and listen on.
    ///
    /// Other members reach the node at this address, so it is normally the
    /// node's id on the ring as well.
    pub listen: SocketAddr,
    /// The default deadline of a single call.
    pub call_timeout: Duration,
    /// The deadline for establishing a connection.
    pub dial_timeout: Duration,
}

impl RpcConfig {
    pub fn new(listen: SocketAddr) -> Self {
        Self {
            listen,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// The client configuration of outgoing calls.
    pub fn client_config(&self, pool: PoolConfig) -> ClientConfig {
        ClientConfig::default()
            .with_call_timeout(self.call_timeout)
            .with_dial_timeout(self.dial_timeout)
            .with_pool(pool)
    }
}

#[derive(Debug, Clone)]
/// Configuration of a complete node.
pub struct NodeConfig {
    pub ring: RingConfig,
    pub rpc: RpcConfig,
    pub pool: PoolConfig,
    pub oracle: OracleConfig,
    /// The maximum number of owners called at once for a single batch.
    pub max_concurrent_requests: usize,
    /// The address of the sync-record endpoint, it is not started if unset.
    pub sync_listen: Option<SocketAddr>,
    /// The name of the payload codec, resolved through the codec registry.
    pub protocol: String,
}

impl NodeConfig {
    pub fn new(listen: SocketAddr) -> Self {
        Self {
            ring: RingConfig::for_dispatch(),
            rpc: RpcConfig::new(listen),
            pool: PoolConfig::default(),
            oracle: OracleConfig::default(),
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
            sync_listen: None,
            protocol: CBOR_PROTOCOL.to_string(),
        }
    }

    pub fn with_ring(mut self, ring: RingConfig) -> Self {
        self.ring = ring;
        self
    }

    pub fn with_rpc(mut self, rpc: RpcConfig) -> Self {
        self.rpc = rpc;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_oracle(mut self, oracle: OracleConfig) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit.max(1);
        self
    }

    pub fn with_sync_listen(mut self, addr: SocketAddr) -> Self {
        self.sync_listen = Some(addr);
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// The dispatcher configuration derived from the node settings.
    pub fn dispatcher_config(&self, codec: Codec) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_codec(codec)
            .with_client(self.rpc.client_config(self.pool.clone()))
            .with_max_concurrent_requests(self.max_concurrent_requests)
    }
}
