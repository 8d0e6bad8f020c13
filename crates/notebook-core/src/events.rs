//! Change events and observer registration.
//!
//! Observers are registered explicitly and get back a [`Disposer`] token. Handing the token to
//! [`NotebookDocument::dispose`](crate::NotebookDocument::dispose) is the only way to remove the
//! observer; dropping the token leaves the observer registered for the document's lifetime.

use crate::cell::CellHandle;

/// Half-open range of cell indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// First index.
    pub start: usize,
    /// One past the last index.
    pub end: usize,
}

impl CellRange {
    /// Create a range.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Cell selection computed by the caller after an edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    /// Focused cell.
    pub primary: Option<CellHandle>,
    /// Selected ranges.
    pub selections: Vec<CellRange>,
}

/// One structural splice of the cell list, in positions at the time it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSplice {
    /// Position of the splice.
    pub index: usize,
    /// Number of cells removed.
    pub delete_count: usize,
    /// Handles of the inserted cells.
    pub inserted: Vec<CellHandle>,
}

/// Fired before cells are added or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillAddRemoveCellsEvent {
    /// The splice about to run.
    pub splice: CellSplice,
    /// Handles of the cells about to be removed.
    pub removed: Vec<CellHandle>,
}

/// Individual change inside a [`ContentChangedEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawContentChange {
    /// Cells were added and/or removed.
    ModelChange(CellSplice),
    /// A cell's output list was replaced or extended.
    Output {
        /// Cell index after the change.
        index: usize,
        /// Cell handle.
        handle: CellHandle,
        /// Whether outputs were appended.
        append: bool,
        /// Ids of the outputs set or appended.
        output_ids: Vec<String>,
    },
    /// Items of one output were replaced or extended.
    OutputItems {
        /// Cell index after the change.
        index: usize,
        /// Cell handle.
        handle: CellHandle,
        /// Output id.
        output_id: String,
        /// Whether items were appended.
        append: bool,
    },
    /// Cell metadata changed.
    CellMetadata {
        /// Cell index after the change.
        index: usize,
        /// Cell handle.
        handle: CellHandle,
    },
    /// Cell execution metadata changed.
    CellInternalMetadata {
        /// Cell index after the change.
        index: usize,
        /// Cell handle.
        handle: CellHandle,
    },
    /// Cell language changed.
    CellLanguage {
        /// Cell index after the change.
        index: usize,
        /// Cell handle.
        handle: CellHandle,
        /// New language tag.
        language: String,
    },
    /// Document metadata changed.
    DocumentMetadata,
}

/// Fired once per batch (or undo/redo step) that changed the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChangedEvent {
    /// Individual changes in the order they ran.
    pub raw_events: Vec<RawContentChange>,
    /// Document version after the batch.
    pub version_id: u64,
    /// The `synchronous` flag passed by the caller.
    pub synchronous: bool,
    /// Selection computed by the caller after the batch.
    pub end_selection_state: Option<SelectionState>,
}

/// Callback for [`WillAddRemoveCellsEvent`].
pub type WillAddRemoveCellsCallback = Box<dyn FnMut(&WillAddRemoveCellsEvent) + Send>;

/// Callback for [`ContentChangedEvent`].
pub type ContentChangedCallback = Box<dyn FnMut(&ContentChangedEvent) + Send>;

/// Token returned by observer registration.
#[must_use = "the observer stays registered until the token is passed to `NotebookDocument::dispose`"]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Disposer {
    id: u64,
}

impl Disposer {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

pub(crate) struct Observers<E> {
    entries: Vec<(u64, Box<dyn FnMut(&E) + Send>)>,
}

impl<E> Observers<E> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, id: u64, callback: Box<dyn FnMut(&E) + Send>) -> Disposer {
        self.entries.push((id, callback));
        Disposer { id }
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub(crate) fn notify(&mut self, event: &E) {
        for (_, callback) in &mut self.entries {
            callback(event);
        }
    }
}
