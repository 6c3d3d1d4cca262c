//! LSP proxy orchestration: wiring the editor's stdio to either a wrapped
//! language server or the built-in standalone server.

use std::{
    ops::ControlFlow,
    process::Stdio,
    task::{Context, Poll},
};

use async_lsp::{
    lsp_types::{
        notification::Exit,
        request::{Initialize, Shutdown},
        InitializeResult, ServerCapabilities, ServerInfo, TextDocumentSyncCapability,
        TextDocumentSyncKind, TextDocumentSyncOptions,
    },
    router::Router,
    AnyEvent, AnyNotification, AnyRequest, ClientSocket, LspService, MainLoop,
};
use tokio::{
    process::{Child, ChildStdin, ChildStdout, Command},
    task::JoinError,
};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

use super::intercept::Intercept;
use crate::{
    connector::BridgeHandle,
    error::{Error, Result},
    socket_io::ClientOptions,
};

/// Run the bridge behind the editor's LSP connection on stdio.
///
/// With a non-empty `command` the proxy sits between the editor and that
/// language server; otherwise it answers the editor itself.
pub async fn run(options: ClientOptions, command: Vec<String>) -> Result<()> {
    let bridge = BridgeHandle::spawn(options);

    let result = match command.split_first() {
        Some((program, args)) => proxy(program, args, &bridge).await,
        None => standalone(&bridge).await,
    };

    bridge.deactivate().await;
    result
}

/// Spawn the wrapped language server.
fn spawn_language_server(program: &str, args: &[String]) -> Result<(Child, ChildStdin, ChildStdout)> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Lsp(format!("Failed to capture {program} stdin")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Lsp(format!("Failed to capture {program} stdout")))?;

    Ok((child, stdin, stdout))
}

/// Relays the wrapped server's messages to the editor. The editor socket
/// only exists once the server-side main loop is built, so it is plugged in
/// afterwards.
struct ToEditor {
    editor: Option<ClientSocket>,
}

impl ToEditor {
    fn socket(&mut self) -> &mut ClientSocket {
        self.editor
            .as_mut()
            .expect("editor socket is set before the main loop runs")
    }
}

impl tower_service::Service<AnyRequest> for ToEditor {
    type Response = <ClientSocket as tower_service::Service<AnyRequest>>::Response;
    type Error = <ClientSocket as tower_service::Service<AnyRequest>>::Error;
    type Future = <ClientSocket as tower_service::Service<AnyRequest>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        tower_service::Service::poll_ready(self.socket(), cx)
    }

    fn call(&mut self, req: AnyRequest) -> Self::Future {
        tower_service::Service::call(self.socket(), req)
    }
}

impl LspService for ToEditor {
    fn notify(&mut self, notif: AnyNotification) -> ControlFlow<async_lsp::Result<()>> {
        // `ClientSocket` has inherent `notify` / `emit` with other signatures.
        LspService::notify(self.socket(), notif)
    }

    fn emit(&mut self, event: AnyEvent) -> ControlFlow<async_lsp::Result<()>> {
        LspService::emit(self.socket(), event)
    }
}

/// editor ↔ aiderdesk-connector ↔ wrapped server.
async fn proxy(program: &str, args: &[String], bridge: &BridgeHandle) -> Result<()> {
    let (_child, child_stdin, child_stdout) = spawn_language_server(program, args)?;
    tracing::info!("Proxying to {program}");

    // Client side: messages from the wrapped server go straight to the editor.
    let (mut client_mainloop, server_socket) =
        MainLoop::new_client(|_| ToEditor { editor: None });

    // Server side: editor → aiderdesk-connector → wrapped server.
    let (server_mainloop, client_socket) =
        MainLoop::new_server(|_| Intercept::new(server_socket, bridge.clone()));

    client_mainloop.get_mut().editor = Some(client_socket);

    let client_task = tokio::spawn(async move {
        client_mainloop
            .run_buffered(child_stdout.compat(), child_stdin.compat_write())
            .await
    });

    let server_task = tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        server_mainloop
            .run_buffered(stdin.compat(), stdout.compat_write())
            .await
    });

    tokio::select! {
        result = client_task => {
            tracing::info!("{program} closed its connection");
            loop_outcome(result)
        }
        result = server_task => {
            tracing::info!("Editor closed its connection");
            loop_outcome(result)
        }
    }
}

/// Either side closing its stream is the normal end of a session, e.g. the
/// wrapped server exiting after `exit`.
fn loop_outcome(result: std::result::Result<async_lsp::Result<()>, JoinError>) -> Result<()> {
    match result.map_err(|e| Error::Lsp(e.to_string()))? {
        Ok(()) | Err(async_lsp::Error::Eof | async_lsp::Error::ServiceStopped) => Ok(()),
        Err(e) => Err(Error::Lsp(e.to_string())),
    }
}

/// Minimal server that only asks the editor for open/close notifications.
fn standalone_server() -> Router<()> {
    let mut router = Router::new(());
    router
        .request::<Initialize, _>(|_, _| async move {
            Ok(InitializeResult {
                capabilities: ServerCapabilities {
                    text_document_sync: Some(TextDocumentSyncCapability::Options(
                        TextDocumentSyncOptions {
                            open_close: Some(true),
                            change: Some(TextDocumentSyncKind::NONE),
                            ..TextDocumentSyncOptions::default()
                        },
                    )),
                    ..ServerCapabilities::default()
                },
                server_info: Some(ServerInfo {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: Some(env!("CARGO_PKG_VERSION").to_string()),
                }),
            })
        })
        .request::<Shutdown, _>(|_, ()| async move { Ok(()) })
        .notification::<Exit>(|_, ()| ControlFlow::Break(Ok(())))
        .unhandled_notification(|_, _| ControlFlow::Continue(()));
    router
}

async fn standalone(bridge: &BridgeHandle) -> Result<()> {
    tracing::info!("Running standalone");

    let (server_mainloop, _client) =
        MainLoop::new_server(|_| Intercept::new(standalone_server(), bridge.clone()));

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    server_mainloop
        .run_buffered(stdin.compat(), stdout.compat_write())
        .await
        .map_err(|e| Error::Lsp(e.to_string()))
}
