//! Version and undo bookkeeping.
//!
//! The coordinator owns the document version id and the undo/redo stacks. Each applied batch
//! becomes one [`UndoEntry`] holding the effective steps of the batch; entries sharing an
//! [`UndoGroupId`] are undone and redone together.
//!
//! Two consecutive entries are combined into one only when an undo transaction is open, both
//! entries were recorded in it, and both consist solely of metadata steps on cells created in
//! that same transaction. Cells remember the transaction epoch they were created in, so the
//! check is a plain integer comparison.

use crate::cell::{CellHandle, CellSnapshot, InternalMetadata, Metadata};
use crate::output::CellOutput;

/// Groups undo entries that are undone and redone together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UndoGroupId(u64);

impl UndoGroupId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// One effective change, with enough state to revert and reapply it.
#[derive(Debug, Clone)]
pub(crate) enum UndoStep {
    /// Replayed by handle. `anchor` is the cell just before the splice (`None` at the start);
    /// `index` is only consulted when the anchor has since been removed.
    Splice {
        anchor: Option<CellHandle>,
        index: usize,
        removed: Vec<CellSnapshot>,
        inserted: Vec<CellSnapshot>,
    },
    Outputs {
        handle: CellHandle,
        before: Vec<CellOutput>,
        after: Vec<CellOutput>,
    },
    Metadata {
        handle: CellHandle,
        before: Metadata,
        after: Metadata,
    },
    InternalMetadata {
        handle: CellHandle,
        before: InternalMetadata,
        after: InternalMetadata,
    },
    Language {
        handle: CellHandle,
        before: String,
        after: String,
    },
    DocumentMetadata {
        before: Metadata,
        after: Metadata,
    },
}

impl UndoStep {
    pub(crate) fn is_output(&self) -> bool {
        matches!(self, UndoStep::Outputs { .. })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct UndoEntry {
    pub(crate) group: Option<UndoGroupId>,
    epoch: Option<u64>,
    metadata_on_new_cells: bool,
    pub(crate) steps: Vec<UndoStep>,
}

impl UndoEntry {
    /// Build an entry recorded while `epoch` is the open transaction.
    ///
    /// `created_epoch` reports the creation epoch of a live cell.
    pub(crate) fn new(
        group: Option<UndoGroupId>,
        epoch: Option<u64>,
        steps: Vec<UndoStep>,
        created_epoch: impl Fn(CellHandle) -> Option<u64>,
    ) -> Self {
        let metadata_on_new_cells = epoch.is_some()
            && steps.iter().all(|step| match step {
                UndoStep::Metadata { handle, .. } => created_epoch(*handle) == epoch,
                UndoStep::InternalMetadata { .. } => true,
                _ => false,
            })
            && steps
                .iter()
                .any(|step| matches!(step, UndoStep::Metadata { .. }));

        Self {
            group,
            epoch,
            metadata_on_new_cells,
            steps,
        }
    }
}

#[derive(Debug)]
pub(crate) struct UndoCoordinator {
    version_id: u64,
    undo_stack: Vec<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
    max_undo: usize,
    /// Clean point tracking. Uses `undo_stack.len()` as the saved position in the linear history.
    /// When `redo_stack` is non-empty, `clean_index` may be greater than `undo_stack.len()`.
    clean_index: Option<usize>,
    next_epoch: u64,
    open_epoch: Option<u64>,
    next_group_id: u64,
}

impl UndoCoordinator {
    pub(crate) fn new(max_undo: usize) -> Self {
        Self {
            version_id: 0,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_undo: max_undo.max(1),
            clean_index: Some(0),
            next_epoch: 0,
            open_epoch: None,
            next_group_id: 0,
        }
    }

    pub(crate) fn version_id(&self) -> u64 {
        self.version_id
    }

    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version_id += 1;
        self.version_id
    }

    pub(crate) fn new_group(&mut self) -> UndoGroupId {
        let id = UndoGroupId(self.next_group_id);
        self.next_group_id += 1;
        id
    }

    pub(crate) fn begin_transaction(&mut self) -> u64 {
        self.next_epoch += 1;
        self.open_epoch = Some(self.next_epoch);
        self.next_epoch
    }

    pub(crate) fn end_transaction(&mut self) {
        self.open_epoch = None;
    }

    pub(crate) fn open_epoch(&self) -> Option<u64> {
        self.open_epoch
    }

    pub(crate) fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub(crate) fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub(crate) fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub(crate) fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.clean_index == Some(self.undo_stack.len())
    }

    pub(crate) fn mark_clean(&mut self) {
        self.clean_index = Some(self.undo_stack.len());
        self.end_transaction();
    }

    fn clear_redo_and_adjust_clean(&mut self) {
        if self.redo_stack.is_empty() {
            return;
        }

        // If clean point is in redo area, it becomes unreachable after clearing redo.
        if let Some(clean_index) = self.clean_index
            && clean_index > self.undo_stack.len()
        {
            self.clean_index = None;
        }

        self.redo_stack.clear();
    }

    fn can_combine(&self, last: &UndoEntry, next: &UndoEntry) -> bool {
        self.open_epoch.is_some()
            && last.epoch == self.open_epoch
            && next.epoch == self.open_epoch
            && last.metadata_on_new_cells
            && next.metadata_on_new_cells
            && last.group == next.group
            && self.clean_index != Some(self.undo_stack.len())
    }

    /// Push an entry for a freshly applied batch. Returns `true` if it was combined into the
    /// previous entry.
    pub(crate) fn push(&mut self, entry: UndoEntry) -> bool {
        self.clear_redo_and_adjust_clean();

        let combine = self
            .undo_stack
            .last()
            .is_some_and(|last| self.can_combine(last, &entry));
        if combine && let Some(last) = self.undo_stack.last_mut() {
            last.steps.extend(entry.steps);
            return true;
        }

        if self.undo_stack.len() >= self.max_undo {
            self.undo_stack.remove(0);
            if let Some(clean_index) = self.clean_index {
                if clean_index == 0 {
                    self.clean_index = None;
                } else {
                    self.clean_index = Some(clean_index - 1);
                }
            }
        }

        self.undo_stack.push(entry);
        false
    }

    /// Pop the newest entry and every directly preceding entry of the same group, newest first.
    pub(crate) fn pop_undo_group(&mut self) -> Option<Vec<UndoEntry>> {
        let entries = pop_group(&mut self.undo_stack)?;
        self.end_transaction();
        Some(entries)
    }

    /// Pop the next redo group, oldest first.
    pub(crate) fn pop_redo_group(&mut self) -> Option<Vec<UndoEntry>> {
        let entries = pop_group(&mut self.redo_stack)?;
        self.end_transaction();
        Some(entries)
    }

    /// Record entries that were just undone (newest first).
    pub(crate) fn push_redo(&mut self, entries: Vec<UndoEntry>) {
        self.redo_stack.extend(entries);
    }

    /// Record entries that were just redone (oldest first).
    pub(crate) fn push_undone_redo(&mut self, entries: Vec<UndoEntry>) {
        self.undo_stack.extend(entries);
    }
}

fn pop_group(stack: &mut Vec<UndoEntry>) -> Option<Vec<UndoEntry>> {
    let first = stack.pop()?;
    let group = first.group;
    let mut entries = vec![first];

    if group.is_some() {
        while stack.last().is_some_and(|entry| entry.group == group) {
            if let Some(entry) = stack.pop() {
                entries.push(entry);
            }
        }
    }

    Some(entries)
}
