//! Forwards the editor's open files to AiderDesk.
//!
//! ```text
//! LSP proxy ──EditorEvent──→ Bridge ──Message──→ Socket.IO → AiderDesk
//!                              ↑
//!                         SocketEvent
//! ```

mod bridge;
mod message;
mod state;
mod tracker;

pub use bridge::BridgeHandle;
