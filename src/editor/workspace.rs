use std::path::{Path, PathBuf};

use async_lsp::lsp_types::Url;

/// An open document in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub uri: Url,
}

impl Tab {
    pub const fn new(uri: Url) -> Self {
        Self { uri }
    }

    /// Filesystem path of a tab backed by a real file. Untitled buffers and
    /// virtual documents have none.
    pub fn fs_path(&self) -> Option<PathBuf> {
        if self.uri.scheme() != "file" {
            return None;
        }
        self.uri.to_file_path().ok()
    }
}

/// Tabs opened and closed by a single editor notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabChange {
    pub opened: Vec<Tab>,
    pub closed: Vec<Tab>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    WorkspaceFolders(Vec<PathBuf>),
    FoldersChanged {
        added: Vec<PathBuf>,
        removed: Vec<PathBuf>,
    },
    Opened(Tab),
    Closed(Tab),
}

/// Workspace folders and open tabs, in the order the editor reported them.
#[derive(Debug, Default)]
pub struct Workspace {
    folders: Vec<PathBuf>,
    tabs: Vec<Tab>,
}

impl Workspace {
    /// The primary folder, if the editor has one open.
    pub fn root(&self) -> Option<&Path> {
        self.folders.first().map(PathBuf::as_path)
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    /// Update the model and report which tabs changed, if any.
    pub fn apply(&mut self, event: EditorEvent) -> Option<TabChange> {
        match event {
            EditorEvent::WorkspaceFolders(folders) => {
                self.folders = folders;
                None
            }
            EditorEvent::FoldersChanged { added, removed } => {
                self.folders.retain(|folder| !removed.contains(folder));
                for folder in added {
                    if !self.folders.contains(&folder) {
                        self.folders.push(folder);
                    }
                }
                None
            }
            EditorEvent::Opened(tab) => {
                self.tabs.push(tab.clone());
                Some(TabChange {
                    opened: vec![tab],
                    closed: Vec::new(),
                })
            }
            EditorEvent::Closed(tab) => {
                if let Some(index) = self.tabs.iter().position(|open| open.uri == tab.uri) {
                    self.tabs.remove(index);
                }
                Some(TabChange {
                    opened: Vec::new(),
                    closed: vec![tab],
                })
            }
        }
    }
}
