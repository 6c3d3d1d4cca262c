//! Editor host model: workspace folders and open tabs as reported by the
//! editor.

mod workspace;

pub use workspace::{EditorEvent, Tab, TabChange, Workspace};
