use hyper::body::to_bytes;
use hyper::{Client, StatusCode};
use ringcast_dispatch::{serve_sync_records, SyncRecord, SyncRecords, SYNC_RECORDS_PATH};

async fn get(uri: String) -> anyhow::Result<(StatusCode, String, Option<String>)> {
    let response = Client::new().get(uri.parse()?).await?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let body = to_bytes(response.into_body()).await?;
    Ok((status, String::from_utf8(body.to_vec())?, content_type))
}

#[tokio::test]
async fn test_sync_records_endpoint() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let records = SyncRecords::default();
    records.put("forward.a:1", SyncRecord::new(100, 12, 3, ""));
    records.put("forward.a:1", SyncRecord::new(160, 8, 5, "timeout"));

    let endpoint = serve_sync_records("127.0.0.1:0".parse()?, records.clone()).await?;
    let addr = endpoint.local_addr();

    let (status, body, content_type) = get(format!("http://{addr}{SYNC_RECORDS_PATH}")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(body, records.report());
    assert!(body.contains("  last: ts=100 duration_ms=12 count=3 message="));
    assert!(body.contains("  curr: ts=160 duration_ms=8 count=5 message=timeout"));

    // The report is rendered on every request.
    records.put("forward.b:2", SyncRecord::new(170, 1, 1, ""));
    let (_, body, _) = get(format!("http://{addr}{SYNC_RECORDS_PATH}")).await?;
    assert!(body.contains("forward.b:2\n  last: null\n"));

    let (status, _, _) = get(format!("http://{addr}/metrics")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    endpoint.shutdown();

    Ok(())
}
