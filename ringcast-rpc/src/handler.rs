use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Codec;
use crate::net::Status;
use crate::request::Request;

/// A registry system used for linking a service's message handlers
/// with the RPC system at runtime.
///
/// Each handler is registered under its method name, which is what travels
/// on the wire. Not registering a handler will cause calls to its method to
/// be answered with an unknown-method error.
pub struct ServiceRegistry<Svc> {
    handlers: BTreeMap<String, Arc<dyn OpaqueMessageHandler>>,
    service: Arc<Svc>,
}

impl<Svc> ServiceRegistry<Svc>
where
    Svc: RpcService + Send + Sync + 'static,
{
    pub(crate) fn new(service: Svc) -> Self {
        Self {
            handlers: BTreeMap::new(),
            service: Arc::new(service),
        }
    }

    /// Consumes the registry into the produced handlers.
    pub(crate) fn into_handlers(self) -> BTreeMap<String, Arc<dyn OpaqueMessageHandler>> {
        self.handlers
    }

    /// Adds a new handler to the registry.
    ///
    /// This is done in the form of specifying what message types are handled
    /// by the service via the generic.
    pub fn add_handler<Msg>(&mut self)
    where
        Msg: DeserializeOwned + Send + Sync + 'static,
        Svc: Handler<Msg>,
    {
        let phantom = PhantomHandler {
            handler: self.service.clone(),
            _msg: PhantomData::<Msg>::default(),
        };

        self.handlers.insert(
            <Svc as Handler<Msg>>::method().to_string(),
            Arc::new(phantom),
        );
    }
}

/// A standard RPC service that handles messages.
pub trait RpcService: Sized {
    /// Register all message handlers for this service with the registry.
    ///
    /// See [ServiceRegistry] for more information.
    fn register_handlers(registry: &mut ServiceRegistry<Self>);
}

#[async_trait]
/// A generic RPC message handler.
pub trait Handler<Msg>: RpcService
where
    Msg: DeserializeOwned + Send + 'static,
{
    type Reply: Serialize + Send;

    /// The method name the handler is registered under.
    fn method() -> &'static str {
        std::any::type_name::<Msg>()
    }

    /// Process a message.
    async fn on_message(&self, msg: Request<Msg>) -> Result<Self::Reply, Status>;
}

#[async_trait]
pub(crate) trait OpaqueMessageHandler: Send + Sync {
    async fn try_handle(
        &self,
        remote_addr: SocketAddr,
        codec: Codec,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, Status>;
}

struct PhantomHandler<H, Msg>
where
    H: Send + Sync + 'static,
    Msg: Send + Sync + 'static,
{
    handler: Arc<H>,
    _msg: PhantomData<Msg>,
}

#[async_trait]
impl<H, Msg> OpaqueMessageHandler for PhantomHandler<H, Msg>
where
    Msg: DeserializeOwned + Send + Sync + 'static,
    H: Handler<Msg> + Send + Sync + 'static,
{
    async fn try_handle(
        &self,
        remote_addr: SocketAddr,
        codec: Codec,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, Status> {
        let msg = codec.decode::<Msg>(&data).map_err(Status::invalid)?;
        let reply = self.handler.on_message(Request::new(remote_addr, msg)).await?;
        codec.encode(&reply).map_err(Status::internal)
    }
}
