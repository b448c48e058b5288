//! REST envelope handling against a minimal local HTTP server.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use uds_core::{
    ApiClient, ConnectivitySignal, DataSetCache, DataSetKey, DataSetSpec, EntryStatus, Fetch,
    FetchError, FreshnessPolicy, HttpEndpoint, Payload,
};

async fn read_head(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Serve `responses` in order, one connection each. Request heads are sent
/// back on the returned channel.
async fn spawn_server(
    responses: Vec<(u16, &'static str)>,
) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let head = read_head(&mut stream).await;
            let _ = tx.send(head);
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason(status),
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{}/api", addr), rx)
}

fn client(base_url: &str, token: Option<&str>) -> ApiClient {
    ApiClient::with_timeout(base_url, Duration::from_secs(5), token.map(str::to_string)).unwrap()
}

#[tokio::test]
async fn test_success_envelope_returns_data_and_sends_bearer() {
    let (base, mut requests) = spawn_server(vec![(
        200,
        r#"{"success":true,"data":{"totalTopics":50},"timestamp":"2026-02-09T14:30:00Z"}"#,
    )])
    .await;

    let value = client(&base, Some("secret"))
        .get("/metrics/summary", "Failed to fetch dashboard-metrics")
        .await
        .unwrap();
    assert_eq!(value["totalTopics"], 50);

    let head = requests.recv().await.unwrap();
    assert!(head.starts_with("GET /api/metrics/summary HTTP/1.1"), "{head}");
    assert!(
        head.to_ascii_lowercase()
            .contains("authorization: bearer secret"),
        "{head}"
    );
}

#[tokio::test]
async fn test_failure_envelope_carries_server_message() {
    let (base, _requests) =
        spawn_server(vec![(200, r#"{"success":false,"error":"Service unavailable"}"#)]).await;

    let err = client(&base, None)
        .get("/metrics/summary", "Failed to fetch dashboard-metrics")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Service unavailable");
}

#[tokio::test]
async fn test_failure_without_message_uses_fallback() {
    let (base, _requests) = spawn_server(vec![(200, r#"{"success":true}"#)]).await;

    let err = client(&base, None)
        .get("/topics", "Failed to fetch topics-tree")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FetchError::Application {
            message: "Failed to fetch topics-tree".to_string()
        }
    );
}

#[tokio::test]
async fn test_error_status_with_envelope_uses_server_message() {
    let (base, _requests) =
        spawn_server(vec![(503, r#"{"success":false,"error":"Broker offline"}"#)]).await;

    let err = client(&base, None).get("/brokers/active", "x").await.unwrap_err();
    assert_eq!(err.to_string(), "Broker offline");
}

#[tokio::test]
async fn test_unauthorized_and_plain_errors() {
    let (base, _requests) = spawn_server(vec![
        (401, r#"{"success":false,"error":"Token expired"}"#),
        (500, "<html>oops</html>"),
        (200, "not json"),
    ])
    .await;
    let api = client(&base, Some("stale"));
    assert!(!api.expiry().is_expired());

    assert_eq!(
        api.get("/topics", "x").await.unwrap_err(),
        FetchError::Unauthorized
    );
    assert!(api.expiry().is_expired());
    assert_eq!(
        api.get("/topics", "x").await.unwrap_err(),
        FetchError::Http { status: 500 }
    );
    assert!(matches!(
        api.get("/topics", "x").await.unwrap_err(),
        FetchError::Parse { .. }
    ));
}

#[tokio::test]
async fn test_optional_endpoint_accepts_missing_data() {
    let (base, mut requests) = spawn_server(vec![
        (200, r#"{"success":true,"data":null}"#),
        (200, r#"{"success":true}"#),
        (200, r#"{"success":false,"error":"Broker store offline"}"#),
        (200, r#"{"success":true,"data":null}"#),
    ])
    .await;
    let key = DataSetKey::new("active-broker");
    let optional =
        HttpEndpoint::new(client(&base, None), &key, "/brokers/active").with_payload(Payload::Optional);

    assert_eq!(optional.fetch().await.unwrap(), serde_json::Value::Null);
    assert!(
        requests
            .recv()
            .await
            .unwrap()
            .starts_with("GET /api/brokers/active ")
    );
    assert_eq!(optional.fetch().await.unwrap(), serde_json::Value::Null);
    assert_eq!(
        optional.fetch().await.unwrap_err().to_string(),
        "Broker store offline"
    );

    let required = HttpEndpoint::new(client(&base, None), &key, "/brokers/active");
    assert_eq!(
        required.fetch().await.unwrap_err(),
        FetchError::Application {
            message: "Failed to fetch active-broker".to_string()
        }
    );
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let api = ApiClient::with_timeout(
        &format!("http://{}/api", addr),
        Duration::from_millis(200),
        None,
    )
    .unwrap();
    assert_eq!(
        api.get("/topics", "x").await.unwrap_err(),
        FetchError::Timeout
    );
}

#[tokio::test]
async fn test_endpoint_in_cache_keeps_value_after_failure() {
    let (base, _requests) = spawn_server(vec![
        (200, r#"{"success":true,"data":{"system":{"totalTopics":50}}}"#),
        (200, r#"{"success":false,"error":"Service unavailable"}"#),
    ])
    .await;

    let cache = DataSetCache::new(ConnectivitySignal::new());
    let key = DataSetKey::new("dashboard-metrics");
    let endpoint = HttpEndpoint::new(client(&base, None), &key, "/metrics/summary");
    cache
        .define(DataSetSpec::new(
            key,
            Arc::new(endpoint),
            FreshnessPolicy::fixed(Duration::from_secs(10), Duration::from_secs(5)),
        ))
        .unwrap();

    cache.read("dashboard-metrics").await.unwrap();
    cache.invalidate("dashboard-metrics").unwrap();
    let err = cache.read("dashboard-metrics").await.unwrap_err();
    assert_eq!(err.to_string(), "Service unavailable");

    let snapshot = cache.peek("dashboard-metrics").unwrap();
    assert_eq!(snapshot.status, EntryStatus::Error);
    assert_eq!(
        snapshot.value.as_deref().unwrap()["system"]["totalTopics"],
        50
    );
}
