//! Text-frame transports for the push channel.

use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::errors::PushError;

const LINK_BUFFER: usize = 64;

/// Engine.IO path and query for a WebSocket-only Socket.IO connection.
const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// An open connection: text frames in, text frames out.
///
/// `incoming` yields `None` once the link is closed. Dropping `outgoing`
/// closes the link after pending frames are written.
#[derive(Debug)]
pub struct PushLink {
    pub incoming: mpsc::Receiver<Result<String, PushError>>,
    pub outgoing: mpsc::Sender<String>,
}

/// Opens push links. Implemented by [`WebSocketTransport`] and by test doubles.
pub trait PushTransport: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'static, Result<PushLink, PushError>>;
}

/// WebSocket transport to a Socket.IO endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// `push_url` is the server origin (`http://host:port`); the scheme is
    /// mapped to `ws`/`wss` and the Socket.IO path appended.
    pub fn new(push_url: &str) -> Result<Self, PushError> {
        Ok(Self {
            url: socket_io_url(push_url)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub(crate) fn socket_io_url(push_url: &str) -> Result<String, PushError> {
    let trimmed = push_url.trim_end_matches('/');
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| PushError::InvalidUrl {
            url: push_url.to_string(),
        })?;
    let ws_scheme = match scheme {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => {
            return Err(PushError::InvalidUrl {
                url: push_url.to_string(),
            });
        }
    };
    if rest.is_empty() {
        return Err(PushError::InvalidUrl {
            url: push_url.to_string(),
        });
    }
    Ok(format!("{}://{}{}", ws_scheme, rest, SOCKET_IO_PATH))
}

impl PushTransport for WebSocketTransport {
    fn connect(&self) -> BoxFuture<'static, Result<PushLink, PushError>> {
        let url = self.url.clone();
        async move {
            let (ws_stream, _) =
                connect_async(url.as_str())
                    .await
                    .map_err(|e| PushError::ConnectFailed {
                        message: format!("{}: {}", url, e),
                    })?;
            debug!(event = "core.push.websocket_opened", url = %url);

            let (mut sink, mut stream) = ws_stream.split();
            let (in_tx, in_rx) = mpsc::channel(LINK_BUFFER);
            let (out_tx, mut out_rx) = mpsc::channel::<String>(LINK_BUFFER);

            tokio::spawn(async move {
                while let Some(message) = stream.next().await {
                    let frame = match message {
                        Ok(Message::Text(text)) => Ok(text),
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => Err(PushError::Transport {
                            message: e.to_string(),
                        }),
                    };
                    let failed = frame.is_err();
                    if in_tx.send(frame).await.is_err() || failed {
                        break;
                    }
                }
                debug!(event = "core.push.websocket_reader_exited");
            });

            tokio::spawn(async move {
                while let Some(text) = out_rx.recv().await {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!(event = "core.push.websocket_write_failed", error = %e);
                        return;
                    }
                }
                let _ = sink.close().await;
                debug!(event = "core.push.websocket_writer_exited");
            });

            Ok(PushLink {
                incoming: in_rx,
                outgoing: out_tx,
            })
        }
        .boxed()
    }
}
