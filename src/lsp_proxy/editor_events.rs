//! Editor events extracted from LSP messages.

use std::path::PathBuf;

use async_lsp::lsp_types::{
    notification::{
        DidChangeWorkspaceFolders, DidCloseTextDocument, DidOpenTextDocument, Notification,
    },
    request::{Initialize, Request},
    DidChangeWorkspaceFoldersParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams, Url,
    WorkspaceFolder,
};
use async_lsp::{AnyNotification, AnyRequest};
use serde::Deserialize;

use crate::editor::{EditorEvent, Tab};

/// The part of `InitializeParams` that names the workspace.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceParams {
    #[serde(default)]
    workspace_folders: Option<Vec<WorkspaceFolder>>,
    #[serde(default)]
    root_uri: Option<Url>,
}

/// Workspace folders announced by an `initialize` request. Falls back to
/// `rootUri` when the editor sends no folders.
pub fn workspace_folders(req: &AnyRequest) -> Option<Vec<PathBuf>> {
    (req.method == <Initialize as Request>::METHOD)
        .then(|| {
            let params: WorkspaceParams = serde_json::from_value(req.params.clone()).ok()?;
            let folders = match params.workspace_folders {
                Some(folders) if !folders.is_empty() => folder_paths(&folders),
                _ => params
                    .root_uri
                    .iter()
                    .filter_map(|uri| uri.to_file_path().ok())
                    .collect(),
            };
            Some(folders)
        })
        .flatten()
}

/// Tab and folder changes carried by document sync notifications.
pub fn editor_event(notif: &AnyNotification) -> Option<EditorEvent> {
    let method = notif.method.as_str();

    if method == DidOpenTextDocument::METHOD {
        let params: DidOpenTextDocumentParams = serde_json::from_value(notif.params.clone()).ok()?;
        Some(EditorEvent::Opened(Tab::new(params.text_document.uri)))
    } else if method == DidCloseTextDocument::METHOD {
        let params: DidCloseTextDocumentParams = serde_json::from_value(notif.params.clone()).ok()?;
        Some(EditorEvent::Closed(Tab::new(params.text_document.uri)))
    } else if method == DidChangeWorkspaceFolders::METHOD {
        let params: DidChangeWorkspaceFoldersParams =
            serde_json::from_value(notif.params.clone()).ok()?;
        Some(EditorEvent::FoldersChanged {
            added: folder_paths(&params.event.added),
            removed: folder_paths(&params.event.removed),
        })
    } else {
        None
    }
}

fn folder_paths(folders: &[WorkspaceFolder]) -> Vec<PathBuf> {
    folders
        .iter()
        .filter_map(|folder| folder.uri.to_file_path().ok())
        .collect()
}
