//! Socket.IO client over a single WebSocket transport.
//!
//! [`connect`] spawns a driver task that owns the WebSocket. The returned
//! [`Socket`] handle queues outgoing frames to the driver, and lifecycle
//! changes come back on a [`SocketEvent`] channel.

use std::{fmt, time::Duration};

use async_lsp::lsp_types::Url;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{sleep, timeout, Instant},
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use super::packet::{EnginePacket, OpenPayload, Packet};
use crate::error::{Result, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on the heartbeat window a server can ask for.
const MAX_HEARTBEAT_WINDOW: Duration = Duration::from_secs(600);

/// Connection settings, named after the `socket.io-client` manager options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub url: String,
    pub reconnection_delay: Duration,
    pub reconnection_delay_max: Duration,
    /// Reconnection attempts after the first try. Zero means try once.
    pub reconnection_attempts: u32,
    /// Bound on the whole connect + handshake sequence.
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            url: "http://localhost:24337".to_string(),
            reconnection_delay: Duration::from_millis(5000),
            reconnection_delay_max: Duration::from_millis(5000),
            reconnection_attempts: 0,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl ClientOptions {
    /// Delay before reconnection attempt `attempt` (1-based), doubling up to
    /// the configured maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.reconnection_delay
            .saturating_mul(factor)
            .min(self.reconnection_delay_max)
    }
}

/// Lifecycle notifications from the driver task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Connect,
    Disconnect(DisconnectReason),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientDisconnect,
    ServerDisconnect,
    TransportClose,
    TransportError(String),
    PingTimeout,
}

impl DisconnectReason {
    const fn should_reconnect(&self) -> bool {
        matches!(
            self,
            Self::TransportClose | Self::TransportError(_) | Self::PingTimeout
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientDisconnect => write!(f, "io client disconnect"),
            Self::ServerDisconnect => write!(f, "io server disconnect"),
            Self::TransportClose => write!(f, "transport close"),
            Self::TransportError(e) => write!(f, "transport error ({e})"),
            Self::PingTimeout => write!(f, "ping timeout"),
        }
    }
}

#[derive(Debug)]
enum Outgoing {
    Frame(String),
    Disconnect,
}

/// Handle to a Socket.IO connection. Cheap to clone; the driver stops once
/// [`Socket::disconnect`] is called or every handle is dropped.
#[derive(Debug, Clone)]
pub struct Socket {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Socket {
    /// Emit `payload` on the `event` channel. Fire-and-forget: an error only
    /// means the driver has already shut down.
    pub fn emit(&self, event: &str, payload: &impl Serialize) -> Result<()> {
        let frame = Packet::event(event, serde_json::to_value(payload)?).to_frame();
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| TransportError::Closed.into())
    }

    pub fn disconnect(&self) {
        let _ = self.tx.send(Outgoing::Disconnect);
    }

    /// Resolves once the driver task has finished, including the WebSocket
    /// close handshake after [`Socket::disconnect`].
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Start connecting in the background.
pub fn connect(options: ClientOptions) -> (Socket, mpsc::UnboundedReceiver<SocketEvent>) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    tokio::spawn(drive(options, out_rx, event_tx));

    (Socket { tx: out_tx }, event_rx)
}

/// Map `http(s)://host:port` to the Engine.IO WebSocket endpoint.
pub fn websocket_url(base: &str) -> Result<Url> {
    let invalid = || TransportError::InvalidUrl(base.to_string());
    let mut url = Url::parse(base).map_err(|_| invalid())?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid().into()),
    };
    url.set_scheme(scheme).map_err(|()| invalid())?;
    url.set_path("/socket.io/");
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");

    Ok(url)
}

async fn drive(
    options: ClientOptions,
    mut out_rx: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let mut attempt = 0;

    loop {
        match establish(&options).await {
            Ok(session) => {
                attempt = 0;
                let _ = events.send(SocketEvent::Connect);
                let reason = session.run(&mut out_rx).await;
                tracing::debug!("Socket.IO session ended: {reason}");
                let reconnect = reason.should_reconnect();
                let _ = events.send(SocketEvent::Disconnect(reason));
                if !reconnect {
                    return;
                }
            }
            Err(e) => {
                let _ = events.send(SocketEvent::Error(e.to_string()));
            }
        }

        if attempt >= options.reconnection_attempts {
            tracing::debug!("No reconnection attempts left for {}", options.url);
            return;
        }
        attempt += 1;

        if !wait_before_retry(options.backoff(attempt), &mut out_rx).await {
            return;
        }
    }
}

/// Sleep until the next attempt, dropping frames emitted in the meantime.
/// Returns `false` when the owner asked to stop.
async fn wait_before_retry(delay: Duration, out_rx: &mut mpsc::UnboundedReceiver<Outgoing>) -> bool {
    let pause = sleep(delay);
    tokio::pin!(pause);

    loop {
        tokio::select! {
            () = &mut pause => return true,
            out = out_rx.recv() => match out {
                Some(Outgoing::Frame(_)) => tracing::debug!("Dropping event emitted while disconnected"),
                Some(Outgoing::Disconnect) | None => return false,
            },
        }
    }
}

async fn establish(options: &ClientOptions) -> Result<Session> {
    let url = websocket_url(&options.url)?;
    timeout(options.timeout, handshake(url))
        .await
        .map_err(|_| TransportError::Timeout)?
}

async fn handshake(url: Url) -> Result<Session> {
    let (mut ws, _) = connect_async(url.as_str()).await?;

    let open = match next_packet(&mut ws).await? {
        EnginePacket::Open(open) => open,
        other => {
            return Err(TransportError::Handshake(format!("expected open packet, got {other:?}")).into())
        }
    };
    tracing::debug!(
        sid = %open.sid,
        upgrades = ?open.upgrades,
        max_payload = ?open.max_payload,
        "Engine.IO handshake"
    );

    ws.send(WsMessage::Text(Packet::connect().to_frame())).await?;

    loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Message(payload) => match Packet::decode(&payload)? {
                Packet::Connect { namespace, data } => {
                    let sid = data
                        .as_ref()
                        .and_then(|d| d.get("sid"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    tracing::debug!("Joined namespace {namespace} as {sid}");
                    break;
                }
                Packet::ConnectError { data, .. } => {
                    let message = data
                        .get("message")
                        .and_then(Value::as_str)
                        .map_or_else(|| data.to_string(), str::to_string);
                    return Err(TransportError::ConnectRejected(message).into());
                }
                other => tracing::debug!("Ignoring packet before connect ack: {other:?}"),
            },
            EnginePacket::Ping => ws.send(WsMessage::Text(EnginePacket::Pong.encode())).await?,
            EnginePacket::Close => return Err(TransportError::Closed.into()),
            _ => {}
        }
    }

    Ok(Session { ws, open })
}

/// Read the next Engine.IO packet, skipping non-text frames.
async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket> {
    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => return Ok(EnginePacket::decode(&text)?),
            Some(Ok(WsMessage::Close(_))) | None => return Err(TransportError::Closed.into()),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

struct Session {
    ws: WsStream,
    open: OpenPayload,
}

/// How long to wait for the next ping before giving up on the server.
fn heartbeat_window(open: &OpenPayload) -> Duration {
    Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout))
        .min(MAX_HEARTBEAT_WINDOW)
}

impl Session {
    async fn run(self, out_rx: &mut mpsc::UnboundedReceiver<Outgoing>) -> DisconnectReason {
        let window = heartbeat_window(&self.open);
        let (mut sink, mut stream) = self.ws.split();
        let deadline = sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => return DisconnectReason::PingTimeout,
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => match EnginePacket::decode(&text) {
                        Ok(EnginePacket::Ping) => {
                            deadline.as_mut().reset(Instant::now() + window);
                            let pong = WsMessage::Text(EnginePacket::Pong.encode());
                            if let Err(e) = sink.send(pong).await {
                                return DisconnectReason::TransportError(e.to_string());
                            }
                        }
                        Ok(EnginePacket::Close) => return DisconnectReason::TransportClose,
                        Ok(EnginePacket::Message(payload)) => {
                            if let Some(reason) = handle_inbound(&payload) {
                                return reason;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Ignoring frame: {e}"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => return DisconnectReason::TransportClose,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return DisconnectReason::TransportError(e.to_string()),
                },
                out = out_rx.recv() => match out {
                    Some(Outgoing::Frame(frame)) => {
                        if let Err(e) = sink.send(WsMessage::Text(frame)).await {
                            return DisconnectReason::TransportError(e.to_string());
                        }
                    }
                    Some(Outgoing::Disconnect) | None => {
                        let _ = sink.send(WsMessage::Text(Packet::disconnect().to_frame())).await;
                        let _ = sink.close().await;
                        // Wait for the server's close frame to finish the handshake.
                        let _ = timeout(CLOSE_TIMEOUT, async {
                            while let Some(Ok(msg)) = stream.next().await {
                                if msg.is_close() {
                                    break;
                                }
                            }
                        })
                        .await;
                        return DisconnectReason::ClientDisconnect;
                    }
                },
            }
        }
    }
}

/// Inbound application packets are not consumed; only a server-side
/// disconnect ends the session.
fn handle_inbound(payload: &str) -> Option<DisconnectReason> {
    match Packet::decode(payload) {
        Ok(Packet::Disconnect { namespace }) => {
            tracing::debug!("Server closed namespace {namespace}");
            Some(DisconnectReason::ServerDisconnect)
        }
        Ok(Packet::Event { namespace, data, .. }) => {
            let name = data.first().and_then(Value::as_str).unwrap_or_default();
            tracing::debug!("Ignoring inbound event {name:?} on {namespace}");
            None
        }
        Ok(Packet::Ack { id, .. }) => {
            tracing::debug!("Ignoring unexpected ack {id}");
            None
        }
        Ok(Packet::ConnectError { data, .. }) => {
            tracing::warn!("Server reported an error: {data}");
            None
        }
        Ok(Packet::Connect { .. }) => None,
        Err(e) => {
            tracing::warn!("Ignoring packet: {e}");
            None
        }
    }
}
