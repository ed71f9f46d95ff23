use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::net::utils::{truncate_error, ResponseMetadata};
use crate::net::{ConnectionChannel, Message};
use crate::server::ServerState;
use crate::{RpcError, Status};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Starts the RPC server accept loop on an already bound listener.
///
/// Every accepted connection is served by its own task until either side
/// closes it or the shutdown signal fires.
pub(crate) fn start_rpc_server(
    listener: TcpListener,
    state: ServerState,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = ?e, "Failed to accept connection, retrying.");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                },
            };

            trace!(remote_addr = %remote_addr, "Accepted connection.");
            tokio::spawn(handle_connection(
                stream,
                remote_addr,
                state.clone(),
                shutdown.clone(),
            ));
        }
    })
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    state: ServerState,
    mut shutdown: watch::Receiver<bool>,
) {
    let channel = ConnectionChannel::new(stream, remote_addr);
    let task = ServerTask::new(channel, state);

    tokio::select! {
        _ = task.handle_messages() => {},
        _ = shutdown.changed() => {
            debug!(remote_addr = %remote_addr, "Closing connection for server shutdown.");
        },
    }
}

/// A single server task serving requests sequentially over one connection.
pub(crate) struct ServerTask {
    channel: ConnectionChannel,
    state: ServerState,
}

impl ServerTask {
    /// Creates a new server task.
    pub(crate) fn new(channel: ConnectionChannel, state: ServerState) -> Self {
        Self { channel, state }
    }

    /// Continuously receives requests from the remote client until the
    /// connection is closed or a malformed frame is received.
    pub(crate) async fn handle_messages(mut self) {
        let remote_addr = self.channel.remote_addr();
        loop {
            let (metadata, data) = match self.channel.recv_msg().await {
                Ok(Some(Message::Request { metadata, data })) => (metadata, data),
                Ok(Some(Message::Response { .. })) => {
                    warn!(
                        remote_addr = %remote_addr,
                        "Received a response frame on a server connection, closing connection."
                    );
                    break;
                },
                Ok(None) => {
                    debug!(remote_addr = %remote_addr, "Connection closed by peer.");
                    break;
                },
                Err(RpcError::Protocol(reason)) => {
                    warn!(
                        remote_addr = %remote_addr,
                        reason = %reason,
                        "Received malformed frame, closing connection."
                    );
                    break;
                },
                Err(e) => {
                    debug!(remote_addr = %remote_addr, error = ?e, "Connection failed.");
                    break;
                },
            };

            let result = match self.state.get_handler(&metadata.method) {
                Some(handler) => {
                    handler
                        .try_handle(remote_addr, self.state.codec(), data)
                        .await
                },
                None => Err(Status::unknown_method(&metadata.method)),
            };

            let (error, reply) = match result {
                Ok(reply) => (String::new(), reply),
                Err(status) => (truncate_error(status.to_string()), Vec::new()),
            };

            let response = ResponseMetadata {
                seq: metadata.seq,
                error,
            };
            if let Err(e) = self.channel.send_response(&response, &reply).await {
                warn!(
                    remote_addr = %remote_addr,
                    error = ?e,
                    "Encountered an IO error while handling connection."
                );
                break;
            }
        }
    }
}
