//! Turns open tabs into workspace-relative file events.

use std::path::{Path, PathBuf};

use super::{
    message::{FileRef, Message},
    state::{Connection, ConnectionState, Emitter},
};
use crate::editor::{Tab, TabChange, Workspace};

/// `full` relative to `base_dir`, or `None` when it lies outside it.
/// Containment is checked per path component, so `/proj2/a` is not under `/proj`.
pub fn relative_path(base_dir: &Path, full: &Path) -> Option<String> {
    let relative = full.strip_prefix(base_dir).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(relative.to_string_lossy().into_owned())
}

/// Relative paths of every open file tab under `base_dir`, in tab order.
pub fn open_files(workspace: &Workspace, base_dir: &Path) -> Vec<String> {
    let paths: Vec<PathBuf> = workspace.tabs().iter().filter_map(Tab::fs_path).collect();
    tracing::debug!(
        tabs = workspace.tabs().len(),
        files = ?paths,
        "Getting open files"
    );

    paths
        .iter()
        .filter_map(|path| relative_path(base_dir, path))
        .collect()
}

/// Forward a tab change as `drop-file` / `add-file` events. Closed tabs go
/// first. Nothing is sent without a live connection.
pub fn handle_tab_change<E: Emitter>(change: &TabChange, state: &ConnectionState<E>) {
    let Some(connection) = state.current() else {
        return;
    };

    for path in change.closed.iter().filter_map(Tab::fs_path) {
        tracing::info!("Tab closed: {}", path.display());
        send_file_event(connection, Message::DropFile, &path);
    }

    for path in change.opened.iter().filter_map(Tab::fs_path) {
        tracing::info!("Tab opened: {}", path.display());
        send_file_event(connection, Message::AddFile, &path);
    }
}

fn send_file_event<E: Emitter>(
    connection: &Connection<E>,
    action: fn(FileRef) -> Message,
    full_path: &Path,
) {
    let Some(relative) = relative_path(connection.base_dir(), full_path) else {
        return;
    };
    connection.send(&action(FileRef::new(relative)));
}
