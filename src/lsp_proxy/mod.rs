//! LSP proxy that sits between the editor and its language server.
//!
//! Architecture:
//! ```text
//! Editor ←→ [Intercept] ←→ wrapped server (or standalone router)
//!              ↓
//!         BridgeHandle → AiderDesk
//! ```

mod editor_events;
mod intercept;
mod proxy;

pub use proxy::run;
