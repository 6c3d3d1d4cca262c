//! One-shot reachability check against the AiderDesk server.

use crate::{
    error::{Result, TransportError},
    socket_io::{self, ClientOptions, SocketEvent},
};

/// Connect once, report the outcome and disconnect.
pub async fn run(options: ClientOptions) -> Result<()> {
    let url = options.url.clone();
    let (socket, mut events) = socket_io::connect(options);

    let outcome = events.recv().await;
    socket.disconnect();
    socket.closed().await;

    match outcome {
        Some(SocketEvent::Connect) => {
            println!("Connected to {url}");
            Ok(())
        }
        Some(SocketEvent::Error(e)) => Err(TransportError::Unreachable(format!("{url}: {e}")).into()),
        Some(SocketEvent::Disconnect(reason)) => {
            Err(TransportError::Unreachable(format!("{url}: {reason}")).into())
        }
        None => Err(TransportError::Closed.into()),
    }
}
