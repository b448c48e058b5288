//! Text packet codec for Socket.IO v5 carried over Engine.IO v4.
//!
//! The push channel is a WebSocket whose text frames are Engine.IO packets
//! (`0` open, `2` ping, `4` message, ...). Engine.IO `message` packets wrap a
//! Socket.IO packet (`40` connect, `42["event",payload]`, ...). Binary
//! attachments are not used by the backend and are rejected.
//!
//! Reference layout of a Socket.IO packet:
//! `<type>[<namespace>,][<ack id>][<json>]`

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default namespace.
pub const ROOT_NAMESPACE: &str = "/";

/// Handshake payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong before closing.
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// One Engine.IO packet as carried in a WebSocket text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(Option<String>),
    Pong(Option<String>),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// One Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Client → server: join a namespace, `data` is the auth object.
    /// Server → client: namespace joined, `data` holds the socket `sid`.
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
}

/// Error decoding a push-channel frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame contained no packet type.
    Empty,
    /// Packet type character not defined by the protocol.
    UnknownType { layer: &'static str, found: char },
    /// JSON payload could not be parsed.
    InvalidJson { message: String },
    /// Packet parsed but its shape is wrong (e.g. event without a name).
    Malformed { message: String },
    /// Valid packet the client does not handle (binary attachments).
    Unsupported { what: &'static str },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Empty => write!(f, "Empty frame"),
            FrameError::UnknownType { layer, found } => {
                write!(f, "Unknown {} packet type '{}'", layer, found)
            }
            FrameError::InvalidJson { message } => write!(f, "Invalid JSON payload: {}", message),
            FrameError::Malformed { message } => write!(f, "Malformed packet: {}", message),
            FrameError::Unsupported { what } => write!(f, "Unsupported packet: {}", what),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<serde_json::Error> for FrameError {
    fn from(e: serde_json::Error) -> Self {
        FrameError::InvalidJson {
            message: e.to_string(),
        }
    }
}

impl EnginePacket {
    /// Decode one WebSocket text frame.
    pub fn decode(frame: &str) -> Result<Self, FrameError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let rest = chars.as_str();
        let payload = || (!rest.is_empty()).then(|| rest.to_string());

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(payload())),
            '3' => Ok(EnginePacket::Pong(payload())),
            '4' => Ok(EnginePacket::Message(SocketPacket::decode(rest)?)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(FrameError::UnknownType {
                layer: "engine.io",
                found: other,
            }),
        }
    }

    /// Encode as a WebSocket text frame.
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                // OpenHandshake only holds strings and integers.
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data.as_deref().unwrap_or_default()),
            EnginePacket::Pong(data) => format!("3{}", data.as_deref().unwrap_or_default()),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    /// Connect to the root namespace, optionally with an auth object.
    pub fn connect(auth: Option<Value>) -> Self {
        SocketPacket::Connect {
            namespace: ROOT_NAMESPACE.to_string(),
            data: auth,
        }
    }

    pub fn disconnect() -> Self {
        SocketPacket::Disconnect {
            namespace: ROOT_NAMESPACE.to_string(),
        }
    }

    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        SocketPacket::Event {
            namespace: ROOT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.into(),
            args,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Decode the Socket.IO part of an Engine.IO `message` packet.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        if matches!(kind, '5' | '6') {
            return Err(FrameError::Unsupported {
                what: "binary attachment",
            });
        }
        if !matches!(kind, '0'..='4') {
            return Err(FrameError::UnknownType {
                layer: "socket.io",
                found: kind,
            });
        }

        let rest = chars.as_str();
        let (namespace, rest) = split_namespace(rest);
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let ack_id = if digits > 0 {
            Some(rest[..digits].parse::<u64>().map_err(|e| FrameError::Malformed {
                message: format!("ack id: {}", e),
            })?)
        } else {
            None
        };
        let body = &rest[digits..];
        let data: Option<Value> = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_str(body)?)
        };
        let namespace = namespace.to_string();

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args = into_array(data, "event")?;
                if args.is_empty() {
                    return Err(FrameError::Malformed {
                        message: "event without name".to_string(),
                    });
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(FrameError::Malformed {
                            message: format!("event name is not a string: {}", other),
                        });
                    }
                };
                Ok(SocketPacket::Event {
                    namespace,
                    ack_id,
                    name,
                    args,
                })
            }
            '3' => {
                let ack_id = ack_id.ok_or_else(|| FrameError::Malformed {
                    message: "ack without id".to_string(),
                })?;
                Ok(SocketPacket::Ack {
                    namespace,
                    ack_id,
                    args: into_array(data, "ack")?,
                })
            }
            _ => {
                let message = match data {
                    Some(Value::Object(map)) => map
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("connection refused")
                        .to_string(),
                    Some(Value::String(s)) => s,
                    _ => "connection refused".to_string(),
                };
                Ok(SocketPacket::ConnectError { namespace, message })
            }
        }
    }

    pub fn encode(&self) -> String {
        let (kind, namespace, ack_id, body) = match self {
            SocketPacket::Connect { namespace, data } => (
                '0',
                namespace,
                None,
                data.as_ref().map(Value::to_string),
            ),
            SocketPacket::Disconnect { namespace } => ('1', namespace, None, None),
            SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args,
            } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                ('2', namespace, *ack_id, Some(Value::Array(items).to_string()))
            }
            SocketPacket::Ack {
                namespace,
                ack_id,
                args,
            } => (
                '3',
                namespace,
                Some(*ack_id),
                Some(Value::Array(args.clone()).to_string()),
            ),
            SocketPacket::ConnectError { namespace, message } => (
                '4',
                namespace,
                None,
                Some(serde_json::json!({ "message": message }).to_string()),
            ),
        };

        let mut out = String::new();
        out.push(kind);
        if namespace != ROOT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(body) = body {
            out.push_str(&body);
        }
        out
    }
}

fn split_namespace(rest: &str) -> (&str, &str) {
    if !rest.starts_with('/') {
        return (ROOT_NAMESPACE, rest);
    }
    match rest.find(',') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    }
}

fn into_array(data: Option<Value>, what: &str) -> Result<Vec<Value>, FrameError> {
    match data {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(FrameError::Malformed {
            message: format!("{} payload is not an array: {}", what, other),
        }),
        None => Err(FrameError::Malformed {
            message: format!("{} without payload", what),
        }),
    }
}
