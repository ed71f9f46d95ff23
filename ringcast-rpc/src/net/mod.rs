mod server;
mod status;
pub(crate) mod utils;

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

pub(crate) use server::start_rpc_server;
pub use status::{ErrorCode, Status};

use crate::net::utils::{
    MessageKind,
    RequestMetadata,
    ResponseMetadata,
    HEADER_SIZE,
};
use crate::RpcError;

pub const BUFFER_SIZE: usize = 64 << 10;

/// A decoded frame.
pub(crate) enum Message {
    Request {
        metadata: RequestMetadata,
        data: Vec<u8>,
    },
    Response {
        metadata: ResponseMetadata,
        data: Vec<u8>,
    },
}

/// A buffered, framed TCP connection.
pub(crate) struct ConnectionChannel {
    remote_addr: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl ConnectionChannel {
    pub(crate) fn new(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        let _ = stream.set_nodelay(true);
        let (read, write) = stream.into_split();
        Self {
            remote_addr,
            reader: BufReader::with_capacity(BUFFER_SIZE, read),
            writer: BufWriter::with_capacity(BUFFER_SIZE, write),
        }
    }

    #[inline]
    /// The address of the remote connection.
    pub(crate) fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Sends a request frame and flushes the connection.
    pub(crate) async fn send_request(
        &mut self,
        metadata: &RequestMetadata,
        data: &[u8],
    ) -> Result<(), RpcError> {
        let metadata = utils::encode_request_metadata(metadata)?;
        let buffer = utils::serialize_frame(MessageKind::Request, &metadata, data)?;
        self.write_frame(&buffer).await?;
        Ok(())
    }

    /// Sends a response frame and flushes the connection.
    pub(crate) async fn send_response(
        &mut self,
        metadata: &ResponseMetadata,
        data: &[u8],
    ) -> Result<(), RpcError> {
        let metadata = utils::encode_response_metadata(metadata)?;
        let buffer = utils::serialize_frame(MessageKind::Response, &metadata, data)?;
        self.write_frame(&buffer).await?;
        Ok(())
    }

    async fn write_frame(&mut self, buffer: &[u8]) -> io::Result<()> {
        self.writer.write_all(buffer).await?;
        self.writer.flush().await
    }

    /// Receives the next frame.
    ///
    /// Returns `None` if the peer closed the connection cleanly between
    /// frames. Any malformed frame is returned as a [RpcError::Protocol] and
    /// the connection should not be used afterwards.
    pub(crate) async fn recv_msg(&mut self) -> Result<Option<Message>, RpcError> {
        let mut header = [0; HEADER_SIZE];
        if !self.read_header(&mut header).await? {
            return Ok(None);
        }

        let header = utils::parse_header(&header)?;
        let mut meta = vec![0; header.meta_len];
        let mut data = vec![0; header.data_len];
        self.read_body(&mut meta).await?;
        self.read_body(&mut data).await?;
        utils::verify_checksum(&header, &meta, &data)?;

        let message = match header.kind {
            MessageKind::Request => Message::Request {
                metadata: utils::decode_request_metadata(&meta)?,
                data,
            },
            MessageKind::Response => Message::Response {
                metadata: utils::decode_response_metadata(&meta)?,
                data,
            },
        };

        Ok(Some(message))
    }

    /// Fills the header buffer, returning `false` on a clean EOF.
    async fn read_header(&mut self, buf: &mut [u8; HEADER_SIZE]) -> Result<bool, RpcError> {
        let mut filled = 0;
        while filled < HEADER_SIZE {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(RpcError::Protocol("connection closed mid-header".to_string()));
            }
            filled += n;
        }
        Ok(true)
    }

    async fn read_body(&mut self, buf: &mut [u8]) -> Result<(), RpcError> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(RpcError::Protocol("connection closed mid-frame".to_string()))
            },
            Err(e) => Err(e.into()),
        }
    }
}
