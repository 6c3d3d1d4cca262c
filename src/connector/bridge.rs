//! The bridge task: owns the workspace model and the connection state and
//! handles editor and transport events one at a time.

use std::time::Duration;

use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};

use super::{
    state::{ConnectionState, Emitter},
    tracker,
};
use crate::{
    editor::{EditorEvent, Workspace},
    socket_io::{self, ClientOptions, Socket, SocketEvent},
};

/// How long teardown waits for the socket to finish closing.
const CLOSE_GRACE: Duration = Duration::from_secs(3);

enum BridgeEvent {
    Editor(EditorEvent),
    Activate,
    Deactivate(Option<oneshot::Sender<()>>),
}

/// Handle used by the editor side to feed the bridge. Sends after teardown
/// are ignored.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl BridgeHandle {
    /// Spawn the bridge task. No connection is made until [`Self::activate`].
    pub fn spawn(options: ClientOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(options, rx));
        Self { tx }
    }

    pub fn editor(&self, event: EditorEvent) {
        let _ = self.tx.send(BridgeEvent::Editor(event));
    }

    /// Open the connection. Repeated calls are ignored.
    pub fn activate(&self) {
        let _ = self.tx.send(BridgeEvent::Activate);
    }

    /// Request teardown without waiting for it.
    pub fn shutdown(&self) {
        let _ = self.tx.send(BridgeEvent::Deactivate(None));
    }

    /// Close the connection and stop the bridge. Returns once the socket has
    /// finished closing. Safe to call more than once.
    pub async fn deactivate(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(BridgeEvent::Deactivate(Some(reply_tx))).is_ok() {
            let _ = reply_rx.await;
        }
    }
}

/// Bridge state, independent of the transport.
pub struct Bridge<E> {
    workspace: Workspace,
    connection: ConnectionState<E>,
}

impl<E> Default for Bridge<E> {
    fn default() -> Self {
        Self {
            workspace: Workspace::default(),
            connection: ConnectionState::default(),
        }
    }
}

impl<E: Emitter + Clone> Bridge<E> {
    pub fn on_editor(&mut self, event: EditorEvent) {
        if let Some(change) = self.workspace.apply(event) {
            tracker::handle_tab_change(&change, &self.connection);
        }
    }

    pub fn on_transport(&mut self, event: SocketEvent, socket: &E) {
        match event {
            SocketEvent::Connect => self.connection.on_connect(socket.clone(), &self.workspace),
            SocketEvent::Disconnect(reason) => self.connection.on_disconnect(&reason),
            SocketEvent::Error(e) => tracing::error!("Socket error: {e}"),
        }
    }

    pub fn teardown(&mut self) {
        self.connection.cleanup();
    }
}

type Transport = (Socket, mpsc::UnboundedReceiver<SocketEvent>);

async fn run(options: ClientOptions, mut rx: mpsc::UnboundedReceiver<BridgeEvent>) {
    let mut bridge = Bridge::<Socket>::default();
    let mut transport: Option<Transport> = None;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(BridgeEvent::Editor(event)) => bridge.on_editor(event),
                Some(BridgeEvent::Activate) => {
                    if transport.is_none() {
                        tracing::info!("Starting client connection to {}", options.url);
                        transport = Some(socket_io::connect(options.clone()));
                    }
                }
                Some(BridgeEvent::Deactivate(reply)) => {
                    bridge.teardown();
                    if let Some((socket, _)) = transport.take() {
                        socket.disconnect();
                        if timeout(CLOSE_GRACE, socket.closed()).await.is_err() {
                            tracing::warn!("Socket did not close within {CLOSE_GRACE:?}");
                        }
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                    return;
                }
                None => {
                    bridge.teardown();
                    return;
                }
            },
            Some(event) = next_socket_event(&mut transport) => {
                if let Some((socket, _)) = &transport {
                    bridge.on_transport(event, socket);
                }
            }
        }
    }
}

async fn next_socket_event(transport: &mut Option<Transport>) -> Option<SocketEvent> {
    match transport {
        Some((_, events)) => events.recv().await,
        None => std::future::pending().await,
    }
}
