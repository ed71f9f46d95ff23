use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Codec;
use crate::events::{ClientEvent, EventSender};
use crate::pool::{ConnPool, PoolConfig, RpcConnector};
use crate::RpcError;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
/// Timeouts used by pooled clients.
pub struct ClientConfig {
    /// The deadline of a single call.
    pub call_timeout: Duration,
    /// The deadline for establishing a connection.
    pub dial_timeout: Duration,
    /// Limits of each per-endpoint pool.
    pub pool: PoolConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            pool: PoolConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Set the deadline of a single call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the deadline for establishing a connection.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set the limits of each per-endpoint pool.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

pub type RpcPool = ConnPool<RpcConnector>;

#[derive(Default)]
struct Endpoints {
    order: Vec<String>,
    pools: HashMap<String, Arc<RpcPool>>,
}

/// A client spreading calls over several interchangeable endpoints.
///
/// Every call tries the endpoints in a fresh uniformly random order. Transport
/// errors move on to the next endpoint, an error returned by a remote handler
/// is final.
pub struct MultiClient {
    codec: Codec,
    config: ClientConfig,
    events: Option<EventSender>,
    endpoints: RwLock<Endpoints>,
}

impl MultiClient {
    /// Creates a new client for the given endpoints.
    pub fn new<I, S>(endpoints: I, codec: Codec, config: ClientConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self {
            codec,
            config,
            events: None,
            endpoints: RwLock::new(Endpoints::default()),
        };
        client.set_endpoints(endpoints);
        client
    }

    /// Emit connection events on the given channel.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    #[inline]
    /// The payload codec used for arguments and replies.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The configured endpoints.
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.read().order.clone()
    }

    /// Replaces the endpoint list.
    ///
    /// Pools of endpoints which are kept stay intact, pools of removed
    /// endpoints have their idle connections closed.
    pub fn set_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Vec::new();
        for endpoint in endpoints {
            let endpoint = endpoint.into();
            if !order.contains(&endpoint) {
                order.push(endpoint);
            }
        }

        let removed = {
            let mut lock = self.endpoints.write();
            let removed = lock
                .pools
                .keys()
                .filter(|endpoint| !order.contains(endpoint))
                .cloned()
                .collect::<Vec<_>>();
            let removed = removed
                .into_iter()
                .filter_map(|endpoint| lock.pools.remove(&endpoint))
                .collect::<Vec<_>>();
            lock.order = order;
            removed
        };

        for pool in removed {
            pool.clear_idle();
        }
    }

    /// Closes every idle connection of every endpoint.
    pub fn close(&self) {
        let pools = self
            .endpoints
            .read()
            .pools
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for pool in pools {
            pool.clear_idle();
        }
    }

    /// The pool of the given endpoint, if one has been created.
    pub fn pool(&self, endpoint: &str) -> Option<Arc<RpcPool>> {
        self.endpoints.read().pools.get(endpoint).cloned()
    }

    fn get_or_create_pool(&self, endpoint: &str) -> Arc<RpcPool> {
        if let Some(pool) = self.pool(endpoint) {
            return pool;
        }

        let mut lock = self.endpoints.write();
        lock.pools
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                let connector = RpcConnector::new(
                    endpoint,
                    self.codec,
                    self.config.dial_timeout,
                    self.config.call_timeout,
                )
                .with_events(self.events.clone());
                Arc::new(ConnPool::new(endpoint, connector, self.config.pool.clone()))
            })
            .clone()
    }

    fn emit(&self, event: ClientEvent) {
        if let Some(events) = self.events.as_ref() {
            let _ = events.send(event);
        }
    }

    /// Calls a remote method on the first endpoint able to answer.
    pub async fn call<Req, Resp>(&self, method: &str, args: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let args = self.codec.encode(args)?;
        let reply = self.call_raw(method, args).await?;
        self.codec.decode(&reply)
    }

    /// Calls a remote method with an already encoded argument blob.
    ///
    /// Fails with [RpcError::MaxConn] when every endpoint was skipped for being
    /// at its connection limit and with [RpcError::AllBackendsDead] when the
    /// endpoints are exhausted otherwise.
    pub async fn call_raw(&self, method: &str, args: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let mut endpoints = self.endpoints();
        endpoints.shuffle(&mut rand::thread_rng());

        let mut saturated = 0;
        for endpoint in endpoints.iter() {
            let pool = self.get_or_create_pool(endpoint);

            match self.call_endpoint(&pool, method, &args).await {
                Ok(reply) => return Ok(reply),
                Err(RpcError::MaxConn(_)) => {
                    debug!(endpoint = %endpoint, "Endpoint is at its connection limit.");
                    saturated += 1;
                },
                Err(e) if e.is_transport() => {
                    warn!(
                        endpoint = %endpoint,
                        method = %method,
                        error = ?e,
                        "Endpoint failed, trying the next one."
                    );
                },
                Err(e) => return Err(e),
            }
        }

        if !endpoints.is_empty() && saturated == endpoints.len() {
            return Err(RpcError::MaxConn(endpoints.join(",")));
        }

        Err(RpcError::AllBackendsDead)
    }

    /// Calls a single endpoint.
    ///
    /// An idle connection may have been closed by the peer while it sat in
    /// the pool, e.g. because the peer restarted. When a reused connection
    /// fails with anything but a timeout the call is repeated once on a
    /// freshly dialed connection.
    async fn call_endpoint(
        &self,
        pool: &RpcPool,
        method: &str,
        args: &[u8],
    ) -> Result<Vec<u8>, RpcError> {
        let (mut conn, mut reused) = match pool.take_idle() {
            Some(conn) => (conn, true),
            None => (pool.fetch_new().await?, false),
        };

        loop {
            match conn.call_raw(method, args.to_vec(), None).await {
                Ok(reply) => {
                    pool.release(conn);
                    return Ok(reply);
                },
                Err(e) if e.is_transport() => {
                    debug!(
                        endpoint = %pool.endpoint(),
                        connection = %conn.name(),
                        method = %method,
                        error = ?e,
                        "Closing connection after transport error."
                    );
                    self.emit(ClientEvent::Closed {
                        endpoint: pool.endpoint().to_string(),
                        name: conn.name().to_string(),
                        reason: e.to_string(),
                    });
                    pool.force_close(conn);

                    if !reused || matches!(e, RpcError::Timeout(_)) {
                        return Err(e);
                    }

                    reused = false;
                    conn = pool.fetch_new().await?;
                },
                Err(e) => {
                    pool.release(conn);
                    return Err(e);
                },
            }
        }
    }
}
