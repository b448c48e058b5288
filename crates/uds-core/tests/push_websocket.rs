//! Push channel over a real WebSocket, with the test acting as the
//! Socket.IO server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use uds_core::push::WebSocketTransport;
use uds_core::{DataSetSpec, EntryStatus, FreshnessPolicy, PushState, Session, fetch_fn};

const OPEN: &str =
    r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
    while let Some(message) = ws.next().await {
        match message.ok()? {
            Message::Text(text) => return Some(text.to_string()),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

async fn wait_for(rx: &mut watch::Receiver<PushState>, want: PushState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while *rx.borrow_and_update() != want {
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_websocket_push_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let transport = WebSocketTransport::new(&format!("http://{}", addr)).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let session = Session::builder()
        .data_set(DataSetSpec::new(
            "topics-tree",
            fetch_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(serde_json::json!([])) }
            }),
            FreshnessPolicy::new(
                Duration::from_secs(30),
                Duration::from_secs(6),
                Duration::from_secs(15),
                Duration::from_secs(3),
            ),
        ))
        .rule("mqtt:message", ["topics-tree"])
        .token(Some("secret".to_string()))
        .transport(Arc::new(transport))
        .start()
        .unwrap();
    let mut state = session.subscribe_push_state();

    session.read("topics-tree").await.unwrap();
    assert_eq!(session.peek("topics-tree").unwrap().status, EntryStatus::Fresh);

    let (stream, _) = listener.accept().await.unwrap();
    let (uri_tx, uri_rx) = oneshot::channel();
    let mut ws = accept_hdr_async(
        stream,
        move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let _ = uri_tx.send(request.uri().to_string());
            Ok(response)
        },
    )
    .await
    .unwrap();
    assert_eq!(
        uri_rx.await.unwrap(),
        "/socket.io/?EIO=4&transport=websocket"
    );

    ws.send(Message::Text(OPEN.into())).await.unwrap();
    assert_eq!(
        next_text(&mut ws).await.as_deref(),
        Some(r#"40{"token":"secret"}"#)
    );
    ws.send(Message::Text(r#"40{"sid":"sock-1"}"#.into()))
        .await
        .unwrap();
    wait_for(&mut state, PushState::Connected).await;
    assert!(session.connectivity().is_connected());

    ws.send(Message::Text(
        r#"42["mqtt:message",{"topic":"plant/line1/temp","payload":21.5}]"#.into(),
    ))
    .await
    .unwrap();
    ws.send(Message::Text("2".into())).await.unwrap();
    assert_eq!(next_text(&mut ws).await.as_deref(), Some("3"));
    assert_eq!(session.peek("topics-tree").unwrap().status, EntryStatus::Stale);

    session.read("topics-tree").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    session.end().await;
    assert_eq!(next_text(&mut ws).await.as_deref(), Some("41"));
}
