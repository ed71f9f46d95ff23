//! A small request/reply RPC transport over TCP.
//!
//! Frames are length-prefixed and checksummed, call arguments and replies are
//! encoded with a self-describing [Codec]. On top of the single connection
//! [RpcClient] sit a bounded per-endpoint [ConnPool] and the [MultiClient]
//! which fails over between interchangeable endpoints.
//!
//! ```rust
//! use std::net::SocketAddr;
//!
//! use ringcast_rpc::{Codec, Handler, Request, RpcClient, RpcService, Server, ServiceRegistry, Status};
//!
//! pub struct Greeter;
//!
//! impl RpcService for Greeter {
//!     fn register_handlers(registry: &mut ServiceRegistry<Self>) {
//!         registry.add_handler::<String>();
//!     }
//! }
//!
//! #[ringcast_rpc::async_trait]
//! impl Handler<String> for Greeter {
//!     type Reply = String;
//!
//!     fn method() -> &'static str {
//!         "Greeter.Hello"
//!     }
//!
//!     async fn on_message(&self, msg: Request<String>) -> Result<Self::Reply, Status> {
//!         Ok(format!("Hello, {}!", msg.into_inner()))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let server = Server::listen("127.0.0.1:0".parse()?, Codec::Cbor).await?;
//! server.add_service(Greeter);
//!
//! let mut client = RpcClient::connect(
//!     &server.local_addr().to_string(),
//!     "greeter",
//!     Codec::Cbor,
//!     std::time::Duration::from_secs(1),
//!     std::time::Duration::from_secs(1),
//! )
//! .await?;
//! let reply: String = client.call("Greeter.Hello", "Bobby", None).await?;
//! assert_eq!(reply, "Hello, Bobby!");
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate tracing;

mod client;
mod codec;
mod error;
mod events;
mod handler;
mod multi;
mod net;
mod pool;
mod request;
mod server;

pub use async_trait::async_trait;
pub use client::RpcClient;
pub use codec::{Codec, CodecConstructor, CodecRegistry, CBOR_PROTOCOL, JSON_PROTOCOL};
pub use error::RpcError;
pub use events::{event_channel, ClientEvent, EventReceiver, EventSender};
pub use handler::{Handler, RpcService, ServiceRegistry};
pub use multi::{
    ClientConfig,
    MultiClient,
    RpcPool,
    DEFAULT_CALL_TIMEOUT,
    DEFAULT_DIAL_TIMEOUT,
};
pub use net::utils::{HEADER_SIZE, MAX_FRAME_SIZE};
pub use net::{ErrorCode, Status};
pub use pool::{
    ConnPool,
    Connector,
    PoolConfig,
    RpcConnector,
    DEFAULT_MAX_CONNS,
    DEFAULT_MAX_IDLE,
};
pub use request::Request;
pub use server::Server;
