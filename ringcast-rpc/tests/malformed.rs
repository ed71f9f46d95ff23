use std::time::Duration;

use ringcast_rpc::{
    Codec,
    Handler,
    Request,
    RpcClient,
    RpcService,
    Server,
    ServiceRegistry,
    Status,
    HEADER_SIZE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub struct EchoService;

impl RpcService for EchoService {
    fn register_handlers(registry: &mut ServiceRegistry<Self>) {
        registry.add_handler::<String>();
    }
}

#[ringcast_rpc::async_trait]
impl Handler<String> for EchoService {
    type Reply = String;

    fn method() -> &'static str {
        "Echo.Echo"
    }

    async fn on_message(&self, msg: Request<String>) -> Result<Self::Reply, Status> {
        Ok(msg.into_inner())
    }
}

async fn assert_closed_by_server(mut stream: TcpStream) -> anyhow::Result<()> {
    let mut buf = [0; 64];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await??;
    assert_eq!(n, 0, "Server should close the connection without replying");
    Ok(())
}

#[tokio::test]
async fn test_malformed_frames_close_connection() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let server = Server::listen("127.0.0.1:0".parse()?, Codec::Cbor).await?;
    server.add_service(EchoService);
    let addr = server.local_addr();

    // Garbage instead of a header.
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&[0xAB; HEADER_SIZE]).await?;
    assert_closed_by_server(stream).await?;

    // A valid looking header with a broken checksum.
    let mut stream = TcpStream::connect(addr).await?;
    let mut header = [0u8; HEADER_SIZE];
    header[0] = 0;
    header[1..3].copy_from_slice(&1u16.to_le_bytes());
    header[3..7].copy_from_slice(&1u32.to_le_bytes());
    header[7..11].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
    header[11..13].copy_from_slice(b"\r\n");
    stream.write_all(&header).await?;
    stream.write_all(&[1, 2]).await?;
    assert_closed_by_server(stream).await?;

    // A frame claiming to be larger than the limit.
    let mut stream = TcpStream::connect(addr).await?;
    header[3..7].copy_from_slice(&u32::MAX.to_le_bytes());
    stream.write_all(&header).await?;
    assert_closed_by_server(stream).await?;

    // Only the offending connections are affected.
    let mut client = RpcClient::connect(
        &addr.to_string(),
        "healthy",
        Codec::Cbor,
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
    .await?;
    let reply: String = client.call("Echo.Echo", "still alive", None).await?;
    assert_eq!(reply, "still alive");

    Ok(())
}
