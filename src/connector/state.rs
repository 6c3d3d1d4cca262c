//! Connection state: the single live connection and the workspace root it
//! was opened for.

use std::path::{Path, PathBuf};

use super::{
    message::{Message, MESSAGE_CHANNEL},
    tracker,
};
use crate::{
    editor::Workspace,
    error::Result,
    socket_io::{DisconnectReason, Socket},
};

/// Outbound side of a connection.
pub trait Emitter {
    fn send(&self, message: &Message) -> Result<()>;
    fn close(&self);
}

impl Emitter for Socket {
    fn send(&self, message: &Message) -> Result<()> {
        self.emit(MESSAGE_CHANNEL, message)
    }

    fn close(&self) {
        self.disconnect();
    }
}

pub struct Connection<E> {
    socket: E,
    base_dir: PathBuf,
}

impl<E: Emitter> Connection<E> {
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Send without retrying; failures are only logged.
    pub fn send(&self, message: &Message) {
        if let Err(e) = self.socket.send(message) {
            tracing::error!("Error sending message to server: {e}");
        }
    }
}

pub struct ConnectionState<E> {
    current: Option<Connection<E>>,
}

impl<E> Default for ConnectionState<E> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<E: Emitter> ConnectionState<E> {
    pub const fn current(&self) -> Option<&Connection<E>> {
        self.current.as_ref()
    }

    /// Adopt `socket` for the workspace's root and announce the open files.
    /// Without a workspace folder nothing is stored.
    pub fn on_connect(&mut self, socket: E, workspace: &Workspace) {
        tracing::info!("Connected to server");

        let Some(root) = workspace.root() else {
            tracing::warn!("No workspace folder found");
            return;
        };

        let connection = Connection {
            socket,
            base_dir: root.to_path_buf(),
        };
        let files = tracker::open_files(workspace, connection.base_dir());
        connection.send(&Message::init(connection.base_dir(), files));
        self.current = Some(connection);
    }

    pub fn on_disconnect(&mut self, reason: &DisconnectReason) {
        tracing::info!("Disconnected from server: {reason}");
        self.current = None;
    }

    /// Close the live connection, if any.
    pub fn cleanup(&mut self) {
        if let Some(connection) = self.current.take() {
            connection.socket.close();
            tracing::info!("Cleaned up Socket.IO connection");
        }
    }
}
