//! Minimal Socket.IO client: WebSocket transport only, default namespace,
//! text packets.

mod client;
mod packet;

pub use client::{connect, ClientOptions, DisconnectReason, Socket, SocketEvent};
