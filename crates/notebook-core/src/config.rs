//! Document options.

use serde::{Deserialize, Serialize};

/// Options of a [`NotebookDocument`](crate::NotebookDocument).
///
/// ```rust
/// use notebook_core::NotebookOptions;
///
/// let options: NotebookOptions = serde_json::from_str(r#"{"transient_outputs": true}"#).unwrap();
/// assert!(options.transient_outputs);
/// assert_eq!(options.max_undo_entries, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotebookOptions {
    /// Maximum number of undo entries kept; the oldest entry is dropped first.
    pub max_undo_entries: usize,
    /// Output changes are not recorded in undo history.
    pub transient_outputs: bool,
}

impl Default for NotebookOptions {
    fn default() -> Self {
        Self {
            max_undo_entries: 1000,
            transient_outputs: false,
        }
    }
}
