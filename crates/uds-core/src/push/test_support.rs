//! In-memory push transport for tests. The test plays the server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use super::transport::{PushLink, PushTransport};
use crate::errors::PushError;

/// Engine.IO open packet with the server's default 25 s / 20 s ping settings.
pub(crate) const OPEN_FRAME: &str =
    r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

/// Server end of one accepted mock connection.
pub(crate) struct ServerSide {
    to_client: mpsc::Sender<Result<String, PushError>>,
    from_client: mpsc::Receiver<String>,
}

impl ServerSide {
    pub(crate) async fn send(&self, frame: &str) {
        self.to_client
            .send(Ok(frame.to_string()))
            .await
            .expect("client link dropped");
    }

    pub(crate) async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Open, accept the namespace connect and acknowledge it.
    pub(crate) async fn handshake(&mut self) {
        self.send(OPEN_FRAME).await;
        let connect = self.recv().await.expect("client sent nothing");
        assert!(connect.starts_with("40"), "unexpected connect frame {connect}");
        self.send(r#"40{"sid":"sock-1"}"#).await;
    }
}

pub(crate) struct MockTransport {
    accepted: mpsc::UnboundedSender<ServerSide>,
    refuse: AtomicUsize,
    attempts: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            accepted,
            refuse: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        });
        (transport, rx)
    }

    /// Fail the next `n` connect attempts.
    pub(crate) fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl PushTransport for MockTransport {
    fn connect(&self) -> BoxFuture<'static, Result<PushLink, PushError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return async {
                Err(PushError::ConnectFailed {
                    message: "connection refused".to_string(),
                })
            }
            .boxed();
        }

        let (to_client, incoming) = mpsc::channel(16);
        let (outgoing, from_client) = mpsc::channel(16);
        let _ = self.accepted.send(ServerSide {
            to_client,
            from_client,
        });
        async move { Ok(PushLink { incoming, outgoing }) }.boxed()
    }
}
