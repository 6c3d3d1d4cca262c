use std::path::Path;

use serde::{Deserialize, Serialize};

/// Socket.IO event name every payload is emitted on.
pub const MESSAGE_CHANNEL: &str = "message";

/// Identifies this integration to the server.
pub const SOURCE_TYPE: &str = "editor";

/// A workspace file, relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub path: String,
    pub source_type: String,
}

impl FileRef {
    pub fn new(path: String) -> Self {
        Self {
            path,
            source_type: SOURCE_TYPE.to_string(),
        }
    }
}

/// Payloads sent to the server on [`MESSAGE_CHANNEL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Message {
    /// Sent once per connection with every open file.
    #[serde(rename_all = "camelCase")]
    Init {
        base_dir: String,
        context_files: Vec<FileRef>,
    },
    AddFile(FileRef),
    DropFile(FileRef),
}

impl Message {
    pub fn init(base_dir: &Path, files: Vec<String>) -> Self {
        Self::Init {
            base_dir: base_dir.to_string_lossy().into_owned(),
            context_files: files.into_iter().map(FileRef::new).collect(),
        }
    }
}
