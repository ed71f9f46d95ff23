use std::io;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;

use crate::codec::Codec;
use crate::net::utils::RequestMetadata;
use crate::net::{ConnectionChannel, Message};
use crate::RpcError;

/// A RPC client wrapping a single TCP connection.
///
/// Calls are issued one at a time. Any transport error, including a call
/// timing out, closes the connection and every later call fails with
/// [RpcError::Closed]. Errors returned by the remote handler leave the
/// connection open.
pub struct RpcClient {
    name: String,
    endpoint: String,
    codec: Codec,
    call_timeout: Duration,
    channel: Option<ConnectionChannel>,
    next_seq: u64,
}

impl RpcClient {
    /// Connects to a remote RPC server.
    pub async fn connect(
        endpoint: &str,
        name: impl Into<String>,
        codec: Codec,
        dial_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<Self, RpcError> {
        let stream = match tokio::time::timeout(dial_timeout, TcpStream::connect(endpoint))
            .await
        {
            Err(_) => return Err(RpcError::Timeout(dial_timeout)),
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                return Err(RpcError::ConnectionRefused(endpoint.to_string()))
            },
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(stream)) => stream,
        };

        let remote_addr = stream.peer_addr()?;
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.to_string(),
            codec,
            call_timeout,
            channel: Some(ConnectionChannel::new(stream, remote_addr)),
            next_seq: 0,
        })
    }

    #[inline]
    /// The name of the connection, used to follow it through the logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    /// The endpoint the client is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[inline]
    /// The default deadline applied to every call.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    #[inline]
    /// Returns if the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.channel.is_none()
    }

    /// Closes the underlying connection.
    pub fn close(&mut self) {
        if self.channel.take().is_some() {
            trace!(connection = %self.name, "Closed connection.");
        }
    }

    /// Calls a remote method, encoding the arguments and decoding the reply
    /// with the client's codec.
    ///
    /// `timeout` overrides the default call timeout when given.
    pub async fn call<Req, Resp>(
        &mut self,
        method: &str,
        args: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let args = self.codec.encode(args)?;
        let reply = self.call_raw(method, args, timeout).await?;
        self.codec.decode(&reply)
    }

    /// Calls a remote method with an already encoded argument blob.
    pub async fn call_raw(
        &mut self,
        method: &str,
        args: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, RpcError> {
        let deadline = timeout.unwrap_or(self.call_timeout);
        let channel = self.channel.as_mut().ok_or(RpcError::Closed)?;

        self.next_seq = self.next_seq.wrapping_add(1);
        let seq = self.next_seq;
        let metadata = RequestMetadata {
            seq,
            method: method.to_string(),
        };

        let result =
            match tokio::time::timeout(deadline, exchange(channel, &metadata, &args)).await {
                Ok(result) => result,
                Err(_) => Err(RpcError::Timeout(deadline)),
            };

        if let Err(e) = &result {
            if e.is_transport() {
                debug!(
                    connection = %self.name,
                    method = %method,
                    error = ?e,
                    "Closing connection after transport error."
                );
                self.close();
            }
        }

        result
    }
}

async fn exchange(
    channel: &mut ConnectionChannel,
    metadata: &RequestMetadata,
    args: &[u8],
) -> Result<Vec<u8>, RpcError> {
    channel.send_request(metadata, args).await?;

    let (response, data) = match channel.recv_msg().await? {
        Some(Message::Response { metadata, data }) => (metadata, data),
        Some(Message::Request { .. }) => {
            return Err(RpcError::Protocol(
                "received a request frame on a client connection".to_string(),
            ))
        },
        None => return Err(RpcError::Closed),
    };

    if response.seq != metadata.seq {
        return Err(RpcError::Protocol(format!(
            "response sequence {} does not match request {}",
            response.seq, metadata.seq,
        )));
    }

    if !response.error.is_empty() {
        return Err(RpcError::Remote(response.error));
    }

    Ok(data)
}
