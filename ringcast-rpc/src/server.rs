use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::codec::Codec;
use crate::handler::{OpaqueMessageHandler, RpcService, ServiceRegistry};

/// A RPC server instance.
///
/// This allows for dynamic adding and removal of services. The server stops
/// accepting connections and closes every open connection once it is shut
/// down or dropped.
pub struct Server {
    state: ServerState,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Server {
    /// Binds the listener and spawns the RPC server task.
    pub async fn listen(addr: SocketAddr, codec: Codec) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let state = ServerState::new(codec);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = crate::net::start_rpc_server(listener, state.clone(), shutdown_rx);

        info!(listen_addr = %local_addr, codec = %codec, "RPC server is listening.");

        Ok(Self {
            state,
            local_addr,
            shutdown,
            handle,
        })
    }

    #[inline]
    /// The address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[inline]
    /// The payload codec used for arguments and replies.
    pub fn codec(&self) -> Codec {
        self.state.codec()
    }

    /// Adds a new service to the live RPC server.
    pub fn add_service<Svc>(&self, service: Svc)
    where
        Svc: RpcService + Send + Sync + 'static,
    {
        let mut registry = ServiceRegistry::new(service);
        Svc::register_handlers(&mut registry);
        let handlers = registry.into_handlers();
        self.state.add_handlers(handlers);
    }

    /// Removes the handler registered for the given method.
    pub fn remove_method(&self, method: &str) {
        self.state.remove_handler(method);
    }

    /// Signals the server to shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Clone)]
/// Represents the shared state of the RPC server.
pub(crate) struct ServerState {
    codec: Codec,
    handlers: Arc<RwLock<BTreeMap<String, Arc<dyn OpaqueMessageHandler>>>>,
}

impl ServerState {
    pub(crate) fn new(codec: Codec) -> Self {
        Self {
            codec,
            handlers: Default::default(),
        }
    }

    #[inline]
    pub(crate) fn codec(&self) -> Codec {
        self.codec
    }

    /// Adds a new set of handlers to the server state.
    ///
    /// Handlers newly added will then be able to handle messages received by
    /// the already running RPC system.
    pub(crate) fn add_handlers(
        &self,
        handlers: BTreeMap<String, Arc<dyn OpaqueMessageHandler>>,
    ) {
        let mut lock = self.handlers.write();
        lock.extend(handlers);
    }

    /// Removes the handler of the given method.
    pub(crate) fn remove_handler(&self, method: &str) {
        self.handlers.write().remove(method);
    }

    /// Attempts to get the message handler for a specific method.
    pub(crate) fn get_handler(&self, method: &str) -> Option<Arc<dyn OpaqueMessageHandler>> {
        self.handlers.read().get(method).cloned()
    }
}
