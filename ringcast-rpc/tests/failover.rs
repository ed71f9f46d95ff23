use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ringcast_rpc::{
    event_channel,
    ClientConfig,
    ClientEvent,
    Codec,
    Handler,
    MultiClient,
    Request,
    RpcError,
    RpcService,
    Server,
    ServiceRegistry,
    Status,
};
use tokio::net::TcpListener;

pub struct NamedService {
    name: &'static str,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl RpcService for NamedService {
    fn register_handlers(registry: &mut ServiceRegistry<Self>) {
        registry.add_handler::<String>();
    }
}

#[ringcast_rpc::async_trait]
impl Handler<String> for NamedService {
    type Reply = String;

    fn method() -> &'static str {
        "Named.Who"
    }

    async fn on_message(&self, msg: Request<String>) -> Result<Self::Reply, Status> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if msg.as_str() == "fail" {
            return Err(Status::internal("asked to fail"));
        }
        tokio::time::sleep(self.delay).await;
        Ok(self.name.to_string())
    }
}

async fn named_server(
    name: &'static str,
    delay: Duration,
) -> anyhow::Result<(Server, Arc<AtomicUsize>)> {
    named_server_on("127.0.0.1:0".parse()?, name, delay).await
}

async fn named_server_on(
    addr: SocketAddr,
    name: &'static str,
    delay: Duration,
) -> anyhow::Result<(Server, Arc<AtomicUsize>)> {
    let calls = Arc::new(AtomicUsize::new(0));
    let server = Server::listen(addr, Codec::Cbor).await?;
    server.add_service(NamedService {
        name,
        delay,
        calls: calls.clone(),
    });
    Ok((server, calls))
}

/// A server which accepts connections but never answers.
async fn black_hole() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    Ok(addr)
}

fn config(call_timeout: Duration) -> ClientConfig {
    ClientConfig::default()
        .with_call_timeout(call_timeout)
        .with_dial_timeout(Duration::from_millis(500))
}

#[tokio::test]
async fn test_failover_to_third_endpoint() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let refused = test_helper::get_unused_addr().to_string();
    let (slow, slow_calls) = named_server("slow", Duration::from_secs(5)).await?;
    let (good, good_calls) = named_server("good", Duration::ZERO).await?;
    let slow = good_addr(&slow);
    let good = good_addr(&good);

    let (tx, rx) = event_channel();
    let client = MultiClient::new(
        [refused.clone(), slow.clone(), good.clone()],
        Codec::Cbor,
        config(Duration::from_millis(100)),
    )
    .with_events(tx);

    // The endpoint order is random, keep calling until one call had to get
    // past both broken endpoints before reaching the good one.
    let mut failed_over = false;
    for _ in 0..60 {
        let good_before = good_calls.load(Ordering::SeqCst);
        let slow_before = slow_calls.load(Ordering::SeqCst);

        let start = Instant::now();
        let reply: String = client.call("Named.Who", "who are you?").await?;
        let elapsed = start.elapsed();
        assert_eq!(reply, "good");
        assert!(elapsed < Duration::from_secs(2), "Call took {elapsed:?}");
        assert_eq!(good_calls.load(Ordering::SeqCst) - good_before, 1);

        let mut refused_seen = false;
        let mut timed_out = false;
        for event in rx.try_iter() {
            match event {
                ClientEvent::Failed { endpoint, .. } if endpoint == refused => {
                    refused_seen = true;
                },
                ClientEvent::Closed {
                    endpoint, reason, ..
                } if endpoint == slow => {
                    assert!(reason.contains("did not complete"));
                    timed_out = true;
                },
                ClientEvent::Closed { endpoint, .. } => {
                    panic!("Unexpected closed connection to {endpoint}")
                },
                _ => {},
            }
        }

        if refused_seen && timed_out {
            assert!(slow_calls.load(Ordering::SeqCst) - slow_before <= 1);
            assert!(elapsed >= Duration::from_millis(100));
            failed_over = true;
            break;
        }
    }

    assert!(failed_over, "No call went through both broken endpoints");

    Ok(())
}

#[tokio::test]
async fn test_reconnects_after_peer_restart() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let (server, _) = named_server("before", Duration::ZERO).await?;
    let addr = server.local_addr();
    let endpoint = addr.to_string();

    let (tx, rx) = event_channel();
    let client = MultiClient::new([endpoint.clone()], Codec::Cbor, config(Duration::from_secs(1)))
        .with_events(tx);

    let reply: String = client.call("Named.Who", "one").await?;
    assert_eq!(reply, "before");
    let pool = client.pool(&endpoint).expect("Pool should exist");
    assert_eq!(pool.idle(), 1);

    // The pooled connection goes stale once the peer is gone.
    drop(server);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (_restarted, calls) = restart(addr, "after").await?;

    let reply: String = client.call("Named.Who", "two").await?;
    assert_eq!(reply, "after");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let events = rx.try_iter().collect::<Vec<_>>();
    let connected = events
        .iter()
        .filter(|event| matches!(event, ClientEvent::Connected { .. }))
        .count();
    let closed = events
        .iter()
        .filter(|event| matches!(event, ClientEvent::Closed { .. }))
        .count();
    assert_eq!(connected, 2, "Unexpected events {events:?}");
    assert_eq!(closed, 1, "Unexpected events {events:?}");
    assert_eq!(pool.active(), 1);
    assert_eq!(pool.idle(), 1);

    let reply: String = client.call("Named.Who", "three").await?;
    assert_eq!(reply, "after");

    Ok(())
}

async fn restart(
    addr: SocketAddr,
    name: &'static str,
) -> anyhow::Result<(Server, Arc<AtomicUsize>)> {
    let mut attempts = 0;
    loop {
        match named_server_on(addr, name, Duration::ZERO).await {
            Ok(server) => return Ok(server),
            Err(e) if attempts < 20 => {
                attempts += 1;
                tracing::debug!(error = ?e, "Address not yet free.");
                tokio::time::sleep(Duration::from_millis(50)).await;
            },
            Err(e) => return Err(e),
        }
    }
}

#[tokio::test]
async fn test_timeout_failover_closes_client() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let blocking = black_hole().await?.to_string();
    let (good, _) = named_server("good", Duration::ZERO).await?;
    let good = good_addr(&good);

    let (tx, rx) = event_channel();
    let client = MultiClient::new(
        [blocking.clone(), good.clone()],
        Codec::Cbor,
        config(Duration::from_millis(100)),
    )
    .with_events(tx);

    // The endpoint order is random, keep calling until the blocking endpoint
    // has been tried first at least once.
    let mut closed = false;
    for _ in 0..30 {
        let start = Instant::now();
        let reply: String = client.call("Named.Who", "hello").await?;
        let elapsed = start.elapsed();
        assert_eq!(reply, "good");
        assert!(elapsed < Duration::from_millis(250), "Call took {elapsed:?}");

        while let Ok(event) = rx.try_recv() {
            if let ClientEvent::Closed { endpoint, reason, .. } = event {
                assert_eq!(endpoint, blocking);
                assert!(reason.contains("did not complete"));
                closed = true;
            }
        }

        if closed {
            break;
        }
    }

    assert!(closed, "The blocking endpoint was never tried");
    let pool = client.pool(&blocking).expect("Pool should exist");
    assert_eq!(pool.active(), 0);
    assert_eq!(pool.idle(), 0);

    Ok(())
}

#[tokio::test]
async fn test_remote_error_is_not_retried() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let (first, first_calls) = named_server("first", Duration::ZERO).await?;
    let (second, second_calls) = named_server("second", Duration::ZERO).await?;

    let client = MultiClient::new(
        [good_addr(&first), good_addr(&second)],
        Codec::Cbor,
        config(Duration::from_secs(1)),
    );

    let result = client.call::<_, String>("Named.Who", "fail").await;
    assert!(matches!(result, Err(RpcError::Remote(e)) if e.contains("asked to fail")));
    assert_eq!(
        first_calls.load(Ordering::SeqCst) + second_calls.load(Ordering::SeqCst),
        1
    );

    // The connection stays pooled after a remote error.
    let idle = client
        .endpoints()
        .iter()
        .filter_map(|endpoint| client.pool(endpoint))
        .map(|pool| pool.idle())
        .sum::<usize>();
    assert_eq!(idle, 1);

    Ok(())
}

#[tokio::test]
async fn test_all_backends_dead() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let (tx, rx) = event_channel();
    let client = MultiClient::new(
        [
            test_helper::get_unused_addr().to_string(),
            test_helper::get_unused_addr().to_string(),
        ],
        Codec::Cbor,
        config(Duration::from_millis(100)),
    )
    .with_events(tx);

    let result = client.call::<_, String>("Named.Who", "anyone?").await;
    assert!(matches!(result, Err(RpcError::AllBackendsDead)));

    let failures = rx
        .try_iter()
        .filter(|event| matches!(event, ClientEvent::Failed { .. }))
        .count();
    assert_eq!(failures, 2);

    let client = MultiClient::new(Vec::<String>::new(), Codec::Cbor, config(Duration::from_millis(100)));
    let result = client.call::<_, String>("Named.Who", "anyone?").await;
    assert!(matches!(result, Err(RpcError::AllBackendsDead)));

    Ok(())
}

#[tokio::test]
async fn test_set_endpoints() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let (first, _) = named_server("first", Duration::ZERO).await?;
    let (second, _) = named_server("second", Duration::ZERO).await?;

    let client = MultiClient::new([good_addr(&first)], Codec::Cbor, config(Duration::from_secs(1)));
    let reply: String = client.call("Named.Who", "hi").await?;
    assert_eq!(reply, "first");

    client.set_endpoints([good_addr(&second), good_addr(&second)]);
    assert_eq!(client.endpoints(), vec![good_addr(&second)]);
    assert!(client.pool(&good_addr(&first)).is_none());

    let reply: String = client.call("Named.Who", "hi").await?;
    assert_eq!(reply, "second");

    Ok(())
}

fn good_addr(server: &Server) -> String {
    server.local_addr().to_string()
}
