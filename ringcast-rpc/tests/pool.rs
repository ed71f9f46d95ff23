use std::sync::Arc;
use std::time::Duration;

use ringcast_rpc::{
    Codec,
    ConnPool,
    Handler,
    PoolConfig,
    Request,
    RpcConnector,
    RpcError,
    RpcService,
    Server,
    ServiceRegistry,
    Status,
};

pub struct PingService;

impl RpcService for PingService {
    fn register_handlers(registry: &mut ServiceRegistry<Self>) {
        registry.add_handler::<()>();
    }
}

#[ringcast_rpc::async_trait]
impl Handler<()> for PingService {
    type Reply = String;

    fn method() -> &'static str {
        "Ping.Ping"
    }

    async fn on_message(&self, _msg: Request<()>) -> Result<Self::Reply, Status> {
        Ok("pong".to_string())
    }
}

async fn setup(max_conns: usize) -> anyhow::Result<(Server, Arc<ConnPool<RpcConnector>>)> {
    let _ = tracing_subscriber::fmt::try_init();

    let server = Server::listen("127.0.0.1:0".parse()?, Codec::Cbor).await?;
    server.add_service(PingService);

    let endpoint = server.local_addr().to_string();
    let connector = RpcConnector::new(
        endpoint.clone(),
        Codec::Cbor,
        Duration::from_secs(1),
        Duration::from_secs(1),
    );
    let config = PoolConfig::default().with_max_conns(max_conns);
    Ok((server, Arc::new(ConnPool::new(endpoint, connector, config))))
}

#[tokio::test]
async fn test_pool_exhaustion() -> anyhow::Result<()> {
    let (_server, pool) = setup(2).await?;

    let tasks = (0..3)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.fetch().await })
        })
        .collect::<Vec<_>>();

    let mut conns = Vec::new();
    let mut exhausted = 0;
    for task in tasks {
        match task.await? {
            Ok(conn) => conns.push(conn),
            Err(RpcError::MaxConn(_)) => exhausted += 1,
            Err(other) => panic!("Unexpected error {other:?}"),
        }
    }
    assert_eq!(conns.len(), 2);
    assert_eq!(exhausted, 1);
    assert_eq!(pool.active(), 2);

    // The waiter retries after one connection is handed back.
    let released = conns.pop().expect("Two connections were fetched");
    let released_name = released.name().to_string();
    pool.release(released);

    let mut conn = pool.fetch().await?;
    assert_eq!(conn.name(), released_name);
    let reply: String = conn.call("Ping.Ping", &(), None).await?;
    assert_eq!(reply, "pong");

    Ok(())
}

#[tokio::test]
async fn test_pool_caps_under_load() -> anyhow::Result<()> {
    let max_conns = 4;
    let extra = 5;
    let (_server, pool) = setup(max_conns).await?;

    let tasks = (0..max_conns + extra)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.fetch().await })
        })
        .collect::<Vec<_>>();

    let mut successes = Vec::new();
    let mut exhausted = 0;
    for task in tasks {
        match task.await? {
            Ok(conn) => successes.push(conn),
            Err(RpcError::MaxConn(_)) => exhausted += 1,
            Err(other) => panic!("Unexpected error {other:?}"),
        }
    }

    assert_eq!(successes.len(), max_conns);
    assert_eq!(exhausted, extra);

    let mut names = successes
        .iter()
        .map(|conn| conn.name().to_string())
        .collect::<Vec<_>>();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), max_conns, "Connection names should be unique");

    for conn in successes {
        pool.force_close(conn);
    }
    assert_eq!(pool.active(), 0);
    assert_eq!(pool.idle(), 0);

    let mut conn = pool.fetch().await?;
    let reply: String = conn.call("Ping.Ping", &(), None).await?;
    assert_eq!(reply, "pong");

    Ok(())
}

#[tokio::test]
async fn test_closed_idle_connections_are_replaced() -> anyhow::Result<()> {
    let (_server, pool) = setup(1).await?;

    let mut conn = pool.fetch().await?;
    let first_name = conn.name().to_string();
    conn.close();
    pool.release(conn);
    assert_eq!(pool.idle(), 1);

    let conn = pool.fetch().await?;
    assert_ne!(conn.name(), first_name);
    assert_eq!(pool.active(), 1);

    Ok(())
}
