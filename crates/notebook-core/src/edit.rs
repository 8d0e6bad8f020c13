//! Edit operations accepted by [`NotebookDocument::apply_edits`](crate::NotebookDocument::apply_edits).
//!
//! Every index carried by an operation refers to the document *before* the batch runs.
//! Handle-addressed operations are resolved to the cell's position at the moment they run.

use crate::cell::{CellData, CellHandle, InternalMetadata, Metadata};
use crate::output::{OutputData, OutputItem};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How an operation addresses a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellTarget {
    /// Pre-batch index.
    Index(usize),
    /// Stable handle.
    Handle(CellHandle),
}

/// A single structural or content edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "editType", rename_all = "camelCase")]
pub enum CellEdit {
    /// Remove `count` cells at `index` and insert `cells` in their place.
    Replace {
        /// Pre-batch index.
        index: usize,
        /// Number of cells removed.
        count: usize,
        /// Cells inserted.
        cells: Vec<CellData>,
    },
    /// Replace (or extend, with `append`) a cell's output list.
    Output {
        /// Target cell.
        target: CellTarget,
        /// Outputs to set or append.
        outputs: Vec<OutputData>,
        /// Append instead of replace.
        append: bool,
    },
    /// Replace (or extend, with `append`) the items of one output, located by id.
    OutputItems {
        /// Output id, searched across the whole document.
        output_id: String,
        /// Items to set or append.
        items: Vec<OutputItem>,
        /// Append instead of replace.
        append: bool,
    },
    /// Replace a cell's metadata.
    Metadata {
        /// Pre-batch index.
        index: usize,
        /// New metadata.
        metadata: Metadata,
    },
    /// Shallow-merge keys into a cell's metadata.
    PartialMetadata {
        /// Pre-batch index.
        index: usize,
        /// Keys to set.
        metadata: Metadata,
    },
    /// Merge execution metadata into a cell.
    PartialInternalMetadata {
        /// Target cell.
        target: CellTarget,
        /// Fields to set (`None` fields are left untouched).
        metadata: InternalMetadata,
    },
    /// Change a cell's language tag, keeping its handle.
    CellLanguage {
        /// Pre-batch index.
        index: usize,
        /// New language tag.
        language: String,
    },
    /// Replace the document-level metadata.
    DocumentMetadata {
        /// New metadata.
        metadata: Metadata,
    },
}

impl CellEdit {
    /// Insert `cells` at `index`.
    pub fn insert(index: usize, cells: Vec<CellData>) -> Self {
        Self::Replace {
            index,
            count: 0,
            cells,
        }
    }

    /// Delete `count` cells at `index`.
    pub fn delete(index: usize, count: usize) -> Self {
        Self::Replace {
            index,
            count,
            cells: Vec::new(),
        }
    }

    /// Replace the outputs of the cell at `index`.
    pub fn set_outputs(index: usize, outputs: Vec<OutputData>) -> Self {
        Self::Output {
            target: CellTarget::Index(index),
            outputs,
            append: false,
        }
    }

    /// Append items to the output `output_id`.
    pub fn append_output_items(output_id: impl Into<String>, items: Vec<OutputItem>) -> Self {
        Self::OutputItems {
            output_id: output_id.into(),
            items,
            append: true,
        }
    }

    /// Whether this operation only touches cell metadata (user or execution metadata).
    pub fn is_metadata_edit(&self) -> bool {
        matches!(
            self,
            Self::Metadata { .. } | Self::PartialMetadata { .. } | Self::PartialInternalMetadata { .. }
        )
    }
}

/// Reasons a batch is rejected. A rejected batch leaves the document untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// A cell index is outside the document.
    #[error("cell index {index} out of range (cell count {len})")]
    IndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Cell count before the batch.
        len: usize,
    },

    /// A replace range is outside the document.
    #[error("replace range {index}+{count} out of bounds (cell count {len})")]
    RangeOutOfBounds {
        /// Range start.
        index: usize,
        /// Range length.
        count: usize,
        /// Cell count before the batch.
        len: usize,
    },

    /// A handle does not name a live cell.
    #[error("unknown cell handle {0}")]
    UnknownHandle(CellHandle),

    /// An operation targets a cell removed earlier in the same batch.
    #[error("cell {0} is removed earlier in the same batch")]
    CellRemovedInBatch(CellHandle),

    /// Two replace operations of one batch delete overlapping ranges.
    #[error("replace at index {index} overlaps a range deleted earlier in the batch")]
    OverlappingReplace {
        /// Pre-batch index of the later replace.
        index: usize,
    },

    /// Undo requested with an empty undo stack.
    #[error("nothing to undo")]
    NothingToUndo,

    /// Redo requested with an empty redo stack.
    #[error("nothing to redo")]
    NothingToRedo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edit_wire_shape() {
        let edit = CellEdit::delete(2, 1);
        let value = serde_json::to_value(&edit).unwrap();
        assert_eq!(
            value,
            json!({"editType": "replace", "index": 2, "count": 1, "cells": []})
        );

        let parsed: CellEdit = serde_json::from_value(json!({
            "editType": "output",
            "target": {"handle": 7},
            "outputs": [],
            "append": false
        }))
        .unwrap();
        assert_eq!(
            parsed,
            CellEdit::Output {
                target: CellTarget::Handle(CellHandle::new(7)),
                outputs: Vec::new(),
                append: false,
            }
        );
    }

    #[test]
    fn test_error_messages() {
        let err = EditError::IndexOutOfRange { index: 9, len: 3 };
        assert_eq!(err.to_string(), "cell index 9 out of range (cell count 3)");
        assert_eq!(
            EditError::UnknownHandle(CellHandle::new(4)).to_string(),
            "unknown cell handle #4"
        );
    }
}
