use std::{error::Error as StdError, fmt, io, result::Result as StdResult};

use tokio_tungstenite::tungstenite;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    InvalidUrl(String),
    Packet(String),
    Handshake(String),
    ConnectRejected(String),
    Unreachable(String),
    Timeout,
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(url) => write!(f, "Invalid server URL: {url}"),
            Self::Packet(msg) => write!(f, "Malformed packet: {msg}"),
            Self::Handshake(msg) => write!(f, "Handshake failed: {msg}"),
            Self::ConnectRejected(msg) => write!(f, "Server rejected connection: {msg}"),
            Self::Unreachable(msg) => write!(f, "Server unreachable: {msg}"),
            Self::Timeout => write!(f, "Connection timed out"),
            Self::Closed => write!(f, "Socket is closed"),
        }
    }
}

impl StdError for TransportError {}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Json(serde_json::Error),
    WebSocket(tungstenite::Error),
    Transport(TransportError),
    Lsp(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::WebSocket(e) => write!(f, "WebSocket error: {e}"),
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::Lsp(e) => write!(f, "LSP error: {e}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::WebSocket(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Lsp(_) => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Self::WebSocket(e)
    }
}

pub type Result<T> = StdResult<T, Error>;
