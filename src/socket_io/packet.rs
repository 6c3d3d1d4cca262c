//! Engine.IO v4 and Socket.IO v5 text packet codec.
//!
//! Every WebSocket text frame is one Engine.IO packet: a single type digit
//! followed by an optional payload. Socket.IO packets travel inside Engine.IO
//! `message` packets:
//!
//! ```text
//! <type>[<namespace>,][<ack id>][<json>]
//! 42["message",{"action":"init"}]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

pub const DEFAULT_NAMESPACE: &str = "/";

/// Handshake data sent by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(OpenPayload),
    Close,
    Ping,
    Pong,
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, TransportError> {
        let (kind, data) = split_type(frame)?;
        match kind {
            b'0' => serde_json::from_str(data)
                .map(Self::Open)
                .map_err(|e| TransportError::Packet(format!("open payload: {e}"))),
            b'1' => Ok(Self::Close),
            b'2' => Ok(Self::Ping),
            b'3' => Ok(Self::Pong),
            b'4' => Ok(Self::Message(data.to_string())),
            b'5' => Ok(Self::Upgrade),
            b'6' => Ok(Self::Noop),
            other => Err(TransportError::Packet(format!(
                "unknown engine packet type {:?}",
                char::from(other)
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(payload) => {
                format!("0{}", serde_json::to_string(payload).unwrap_or_default())
            }
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// A Socket.IO packet. Binary variants are not supported.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        data: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        data: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

impl Packet {
    pub fn connect() -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: None,
        }
    }

    pub fn disconnect() -> Self {
        Self::Disconnect {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// An event on the default namespace: `["<name>", <payload>]`.
    pub fn event(name: &str, payload: Value) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            id: None,
            data: vec![Value::String(name.to_string()), payload],
        }
    }

    pub fn decode(text: &str) -> Result<Self, TransportError> {
        let (kind, rest) = split_type(text)?;
        if matches!(kind, b'5' | b'6') {
            return Err(TransportError::Packet(
                "binary packets are not supported".to_string(),
            ));
        }

        let (namespace, rest) = split_namespace(rest);
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = match digits {
            0 => None,
            _ => Some(
                rest[..digits]
                    .parse::<u64>()
                    .map_err(|e| TransportError::Packet(format!("ack id: {e}")))?,
            ),
        };
        let data = match &rest[digits..] {
            "" => None,
            json => Some(
                serde_json::from_str::<Value>(json)
                    .map_err(|e| TransportError::Packet(format!("payload: {e}")))?,
            ),
        };

        match kind {
            b'0' => Ok(Self::Connect { namespace, data }),
            b'1' => Ok(Self::Disconnect { namespace }),
            b'2' => Ok(Self::Event {
                namespace,
                id,
                data: expect_array(data)?,
            }),
            b'3' => Ok(Self::Ack {
                namespace,
                id: id.ok_or_else(|| TransportError::Packet("ack without id".to_string()))?,
                data: expect_array(data)?,
            }),
            b'4' => Ok(Self::ConnectError {
                namespace,
                data: data.unwrap_or(Value::Null),
            }),
            other => Err(TransportError::Packet(format!(
                "unknown socket packet type {:?}",
                char::from(other)
            ))),
        }
    }

    pub fn encode(&self) -> String {
        let (kind, namespace, id, data) = match self {
            Self::Connect { namespace, data } => ('0', namespace, None, data.clone()),
            Self::Disconnect { namespace } => ('1', namespace, None, None),
            Self::Event {
                namespace,
                id,
                data,
            } => ('2', namespace, *id, Some(Value::Array(data.clone()))),
            Self::Ack {
                namespace,
                id,
                data,
            } => ('3', namespace, Some(*id), Some(Value::Array(data.clone()))),
            Self::ConnectError { namespace, data } => ('4', namespace, None, Some(data.clone())),
        };

        let mut out = String::from(kind);
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Wrap this packet in an Engine.IO message frame.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

fn split_type(text: &str) -> Result<(u8, &str), TransportError> {
    match text.as_bytes().first() {
        Some(kind) if kind.is_ascii_digit() => Ok((*kind, &text[1..])),
        Some(_) => Err(TransportError::Packet(format!("invalid packet type in {text:?}"))),
        None => Err(TransportError::Packet("empty packet".to_string())),
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), rest);
    }
    match rest.find(',') {
        Some(i) => (rest[..i].to_string(), &rest[i + 1..]),
        None => (rest.to_string(), ""),
    }
}

fn expect_array(data: Option<Value>) -> Result<Vec<Value>, TransportError> {
    match data {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(TransportError::Packet(format!(
            "expected array payload, got {other}"
        ))),
        None => Ok(Vec::new()),
    }
}
