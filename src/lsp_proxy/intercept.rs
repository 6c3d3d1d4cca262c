//! LSP service interceptor that feeds editor events to the bridge.

use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_lsp::lsp_types::notification::{Exit, Initialized, Notification};
use async_lsp::{AnyEvent, AnyNotification, AnyRequest, LspService};
use futures::Future;

use super::editor_events::{editor_event, workspace_folders};
use crate::{connector::BridgeHandle, editor::EditorEvent};

/// Observes editor → server traffic and forwards it to the inner service
/// unchanged.
pub struct Intercept<S> {
    pub service: S,
    pub bridge: BridgeHandle,
}

impl<S: LspService> Intercept<S> {
    pub const fn new(service: S, bridge: BridgeHandle) -> Self {
        Self { service, bridge }
    }

    fn handle_request(&self, req: &AnyRequest) {
        if let Some(folders) = workspace_folders(req) {
            tracing::info!(?folders, "workspace folders");
            self.bridge.editor(EditorEvent::WorkspaceFolders(folders));
        }
    }

    fn handle_notification(&self, notif: &AnyNotification) {
        if notif.method == Initialized::METHOD {
            self.bridge.activate();
        } else if notif.method == Exit::METHOD {
            self.bridge.shutdown();
        } else if let Some(event) = editor_event(notif) {
            self.bridge.editor(event);
        }
    }
}

impl<S: LspService> tower_service::Service<AnyRequest> for Intercept<S>
where
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, req: AnyRequest) -> Self::Future {
        self.handle_request(&req);

        let method = req.method.clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            tracing::debug!("response {method}");
            result
        })
    }
}

impl<S: LspService> LspService for Intercept<S>
where
    S::Future: Send + 'static,
{
    fn notify(&mut self, notif: AnyNotification) -> ControlFlow<async_lsp::Result<()>> {
        self.handle_notification(&notif);
        tracing::debug!("notification {}", notif.method);
        self.service.notify(notif)
    }

    fn emit(&mut self, event: AnyEvent) -> ControlFlow<async_lsp::Result<()>> {
        self.service.emit(event)
    }
}
