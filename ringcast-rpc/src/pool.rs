use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::RpcClient;
use crate::codec::Codec;
use crate::events::{ClientEvent, EventSender};
use crate::RpcError;

pub const DEFAULT_MAX_CONNS: usize = 32;
pub const DEFAULT_MAX_IDLE: usize = 8;

#[derive(Debug, Clone)]
/// Limits of a per-endpoint connection pool.
pub struct PoolConfig {
    /// The hard cap on connections outstanding at once, idle ones included.
    pub max_conns: usize,
    /// The cap on the idle free-list.
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_conns: DEFAULT_MAX_CONNS,
            max_idle: DEFAULT_MAX_IDLE,
        }
    }
}

impl PoolConfig {
    /// Set the hard cap on outstanding connections.
    pub fn with_max_conns(mut self, max_conns: usize) -> Self {
        self.max_conns = max_conns;
        self
    }

    /// Set the cap on idle connections.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }
}

#[async_trait]
/// Creates the connections handed out by a [ConnPool].
pub trait Connector: Send + Sync + 'static {
    type Conn: Send + 'static;

    /// Opens a new connection with the given name.
    async fn connect(&self, name: &str) -> Result<Self::Conn, RpcError>;

    /// Returns if an idle connection can still be handed out.
    fn is_alive(&self, _conn: &Self::Conn) -> bool {
        true
    }

    /// Closes a connection the pool is giving up on.
    fn close(&self, conn: Self::Conn) {
        drop(conn);
    }
}

struct PoolState<T> {
    active: usize,
    idle: Vec<T>,
}

/// A bounded pool of connections to a single endpoint.
///
/// Connections are created lazily. A fetched connection is exclusively owned
/// by the caller until it is handed back through [ConnPool::release] or
/// dropped through [ConnPool::force_close].
pub struct ConnPool<C: Connector> {
    endpoint: String,
    connector: C,
    config: PoolConfig,
    counter: AtomicU64,
    state: Mutex<PoolState<C::Conn>>,
}

impl<C: Connector> ConnPool<C> {
    /// Creates a new, empty pool.
    pub fn new(endpoint: impl Into<String>, connector: C, config: PoolConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            connector,
            config,
            counter: AtomicU64::new(0),
            state: Mutex::new(PoolState {
                active: 0,
                idle: Vec::new(),
            }),
        }
    }

    #[inline]
    /// The endpoint this pool connects to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The number of outstanding connections, idle ones included.
    pub fn active(&self) -> usize {
        self.state.lock().active
    }

    /// The number of idle connections.
    pub fn idle(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Gets a connection from the pool.
    ///
    /// Idle connections are reused first. Otherwise a new connection is
    /// opened, unless the pool already has `max_conns` connections
    /// outstanding, in which case this fails with [RpcError::MaxConn].
    pub async fn fetch(&self) -> Result<C::Conn, RpcError> {
        match self.take_idle() {
            Some(conn) => Ok(conn),
            None => self.fetch_new().await,
        }
    }

    /// Takes an idle connection which still looks usable.
    ///
    /// Connections the connector reports as dead are closed on the way.
    pub fn take_idle(&self) -> Option<C::Conn> {
        let mut state = self.state.lock();
        while let Some(conn) = state.idle.pop() {
            if self.connector.is_alive(&conn) {
                return Some(conn);
            }

            state.active -= 1;
            self.connector.close(conn);
        }
        None
    }

    /// Opens a new connection, skipping the idle list.
    ///
    /// Fails with [RpcError::MaxConn] when the pool already has `max_conns`
    /// connections outstanding.
    pub async fn fetch_new(&self) -> Result<C::Conn, RpcError> {
        {
            let mut state = self.state.lock();
            if state.active >= self.config.max_conns {
                return Err(RpcError::MaxConn(self.endpoint.clone()));
            }

            // The slot is reserved before dialing.
            state.active += 1;
        }

        let name = self.next_name();
        match self.connector.connect(&name).await {
            Ok(conn) => {
                trace!(connection = %name, "Created pooled connection.");
                Ok(conn)
            },
            Err(e) => {
                self.state.lock().active -= 1;
                Err(e)
            },
        }
    }

    /// Returns a connection to the pool.
    ///
    /// The connection is closed instead when the idle list is full.
    pub fn release(&self, conn: C::Conn) {
        let mut state = self.state.lock();
        if state.idle.len() < self.config.max_idle {
            state.idle.push(conn);
            return;
        }

        state.active -= 1;
        drop(state);
        self.connector.close(conn);
    }

    /// Closes a fetched connection and frees its slot.
    pub fn force_close(&self, conn: C::Conn) {
        {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
        }
        self.connector.close(conn);
    }

    /// Closes every idle connection.
    pub fn clear_idle(&self) {
        let idle = {
            let mut state = self.state.lock();
            let idle = std::mem::take(&mut state.idle);
            state.active -= idle.len();
            idle
        };

        for conn in idle {
            self.connector.close(conn);
        }
    }

    fn next_name(&self) -> String {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!("{}_{}_{}", self.endpoint, counter, millis)
    }
}

/// Opens [RpcClient] connections for a [ConnPool].
pub struct RpcConnector {
    endpoint: String,
    codec: Codec,
    dial_timeout: Duration,
    call_timeout: Duration,
    events: Option<EventSender>,
}

impl RpcConnector {
    pub fn new(
        endpoint: impl Into<String>,
        codec: Codec,
        dial_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            codec,
            dial_timeout,
            call_timeout,
            events: None,
        }
    }

    /// Emit connection events on the given channel.
    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    fn emit(&self, event: ClientEvent) {
        if let Some(events) = self.events.as_ref() {
            let _ = events.send(event);
        }
    }
}

#[async_trait]
impl Connector for RpcConnector {
    type Conn = RpcClient;

    async fn connect(&self, name: &str) -> Result<Self::Conn, RpcError> {
        let result = RpcClient::connect(
            &self.endpoint,
            name,
            self.codec,
            self.dial_timeout,
            self.call_timeout,
        )
        .await;

        match &result {
            Ok(_) => self.emit(ClientEvent::Connected {
                endpoint: self.endpoint.clone(),
                name: name.to_string(),
            }),
            Err(e) => self.emit(ClientEvent::Failed {
                endpoint: self.endpoint.clone(),
                error: e.to_string(),
            }),
        }

        result
    }

    fn is_alive(&self, conn: &Self::Conn) -> bool {
        !conn.is_closed()
    }

    fn close(&self, mut conn: Self::Conn) {
        conn.close();
    }
}
