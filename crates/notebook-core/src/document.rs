//! Notebook document and the edit batch applier.
//!
//! # Overview
//!
//! [`NotebookDocument`] owns the ordered cell list, document metadata, the version/undo
//! coordinator and the observer registries. All mutation goes through
//! [`NotebookDocument::apply_edits`] (or undo/redo), which runs a batch in three phases:
//!
//! 1. **Plan**: every index and handle is checked against the pre-batch document, operations
//!    are ordered by ascending pre-batch index (stable for ties) and replace positions are
//!    translated with a running offset. Any failure rejects the whole batch untouched.
//! 2. **Execute**: the planned operations run in order. Handle-addressed operations look up
//!    the cell's *current* position. Operations that would not change anything are skipped.
//! 3. **Publish**: if anything changed, the version id is bumped once, the undo entry is
//!    recorded and a single [`ContentChangedEvent`] is fired.
//!
//! # Example
//!
//! ```rust
//! use notebook_core::{CellData, CellEdit, NotebookDocument, OutputData, OutputItem};
//!
//! let mut doc = NotebookDocument::new(vec![CellData::code("print(1)", "python")]);
//!
//! let changed = doc
//!     .apply(vec![CellEdit::set_outputs(
//!         0,
//!         vec![OutputData::new("out-1", vec![OutputItem::stdout("1\n")])],
//!     )])
//!     .unwrap();
//! assert!(changed);
//! assert_eq!(doc.version_id(), 1);
//!
//! // Clearing twice: the second batch is a no-op and does not bump the version.
//! assert!(doc.apply(vec![CellEdit::set_outputs(0, Vec::new())]).unwrap());
//! assert!(!doc.apply(vec![CellEdit::set_outputs(0, Vec::new())]).unwrap());
//! assert_eq!(doc.version_id(), 2);
//! ```

use crate::cell::{Cell, CellData, CellHandle, CellSnapshot, InternalMetadata, Metadata};
use crate::cell_list::{CellList, SpliceTracker};
use crate::config::NotebookOptions;
use crate::edit::{CellEdit, CellTarget, EditError};
use crate::events::{
    CellSplice, ContentChangedEvent, Disposer, Observers, RawContentChange, SelectionState,
    WillAddRemoveCellsEvent,
};
use crate::output::{CellOutput, OutputData, OutputItem};
use crate::source::{SourceBuffer, SourceBufferFactory, rope_buffer_factory};
use crate::undo::{UndoCoordinator, UndoEntry, UndoGroupId, UndoStep};
use std::collections::HashSet;

/// Caller-supplied callback computing the selection after a batch.
pub type SelectionComputer<'a> = &'a dyn Fn(&NotebookDocument) -> Option<SelectionState>;

/// An operation after validation, in execution order.
#[derive(Debug)]
enum PlannedEdit {
    Splice {
        position: usize,
        count: usize,
        cells: Vec<CellData>,
    },
    Outputs {
        handle: CellHandle,
        outputs: Vec<OutputData>,
        append: bool,
    },
    OutputItems {
        output_id: String,
        items: Vec<OutputItem>,
        append: bool,
    },
    Metadata {
        handle: CellHandle,
        metadata: Metadata,
        partial: bool,
    },
    InternalMetadata {
        handle: CellHandle,
        metadata: InternalMetadata,
    },
    Language {
        handle: CellHandle,
        language: String,
    },
    DocumentMetadata {
        metadata: Metadata,
    },
}

impl PlannedEdit {
    fn handle(&self) -> Option<CellHandle> {
        match self {
            PlannedEdit::Outputs { handle, .. }
            | PlannedEdit::Metadata { handle, .. }
            | PlannedEdit::InternalMetadata { handle, .. }
            | PlannedEdit::Language { handle, .. } => Some(*handle),
            PlannedEdit::Splice { .. }
            | PlannedEdit::OutputItems { .. }
            | PlannedEdit::DocumentMetadata { .. } => None,
        }
    }
}

/// An operation whose cell has been resolved but whose position is not known yet.
enum PendingEdit {
    Replace {
        index: usize,
        count: usize,
        cells: Vec<CellData>,
    },
    Ready(PlannedEdit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

impl Direction {
    fn pick<'a, T>(self, before: &'a T, after: &'a T) -> &'a T {
        match self {
            Direction::Undo => before,
            Direction::Redo => after,
        }
    }
}

#[derive(Debug, Default)]
struct BatchRecord {
    raw_events: Vec<RawContentChange>,
    steps: Vec<UndoStep>,
}

/// A notebook: ordered cells plus document metadata, versioned and undoable.
pub struct NotebookDocument {
    cells: CellList,
    metadata: Metadata,
    options: NotebookOptions,
    undo: UndoCoordinator,
    alternative_version_id: String,
    buffer_factory: SourceBufferFactory,
    next_observer_id: u64,
    will_add_remove: Observers<WillAddRemoveCellsEvent>,
    content_changed: Observers<ContentChangedEvent>,
}

impl NotebookDocument {
    /// Create a document with default options and rope-backed sources.
    pub fn new(cells: Vec<CellData>) -> Self {
        Self::with_options(cells, NotebookOptions::default())
    }

    /// Create a document with the given options.
    pub fn with_options(cells: Vec<CellData>, options: NotebookOptions) -> Self {
        Self::with_buffer_factory(cells, options, rope_buffer_factory())
    }

    /// Create a document whose cell sources are created by `buffer_factory`.
    pub fn with_buffer_factory(
        cells: Vec<CellData>,
        options: NotebookOptions,
        buffer_factory: SourceBufferFactory,
    ) -> Self {
        let mut list = CellList::new();
        let initial: Vec<Cell> = cells
            .into_iter()
            .map(|data| {
                let handle = list.allocate_handle();
                let source = buffer_factory(handle, &data.source);
                Cell::new(handle, data, source, None)
            })
            .collect();
        list.splice(0, 0, initial);

        let mut doc = Self {
            cells: list,
            metadata: Metadata::new(),
            undo: UndoCoordinator::new(options.max_undo_entries),
            options,
            alternative_version_id: String::new(),
            buffer_factory,
            next_observer_id: 0,
            will_add_remove: Observers::new(),
            content_changed: Observers::new(),
        };
        doc.alternative_version_id = doc.compute_alternative_version_id();
        doc
    }

    /// Set the initial document metadata (not versioned, not undoable).
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    // ----- queries -----

    /// Number of cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Cell at `index`.
    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Cell with `handle`.
    pub fn cell_by_handle(&self, handle: CellHandle) -> Option<&Cell> {
        self.cells.index_of(handle).and_then(|index| self.cells.get(index))
    }

    /// Current index of `handle`.
    pub fn index_of(&self, handle: CellHandle) -> Option<usize> {
        self.cells.index_of(handle)
    }

    /// The cell list.
    pub fn cells(&self) -> &CellList {
        &self.cells
    }

    /// Handles in document order.
    pub fn handles(&self) -> Vec<CellHandle> {
        self.cells.handles()
    }

    /// Describe every cell as plain [`CellData`].
    pub fn to_cell_data(&self) -> Vec<CellData> {
        self.cells.iter().map(Cell::to_data).collect()
    }

    /// Document metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Options this document was created with.
    pub fn options(&self) -> &NotebookOptions {
        &self.options
    }

    /// Version id: +1 per batch (or undo/redo) that changed the document.
    pub fn version_id(&self) -> u64 {
        self.undo.version_id()
    }

    /// Structural fingerprint `"<version>_<index>,<cell version>;..."`, recomputed after every
    /// applied batch.
    pub fn alternative_version_id(&self) -> &str {
        &self.alternative_version_id
    }

    /// Output with `output_id`, searched across all cells.
    pub fn output(&self, output_id: &str) -> Option<&CellOutput> {
        let (cell_index, output_index) = self.cells.find_output(output_id)?;
        self.cells.get(cell_index)?.outputs().get(output_index)
    }

    /// Bytes appended to output `output_id` for `mime` since the output's `version`.
    ///
    /// See [`CellOutput::appended_since_version`].
    pub fn appended_since_version(&self, output_id: &str, version: u64, mime: &str) -> Option<&[u8]> {
        self.output(output_id)?.appended_since_version(version, mime)
    }

    /// Mutable access to a cell's source buffer (text edits bypass the batch applier).
    pub fn cell_source_mut(&mut self, handle: CellHandle) -> Option<&mut dyn SourceBuffer> {
        let index = self.cells.index_of(handle)?;
        self.cells.get_mut(index).map(Cell::source_mut)
    }

    // ----- observers -----

    /// Observe cell additions/removals before they happen.
    pub fn on_will_add_remove_cells<F>(&mut self, callback: F) -> Disposer
    where
        F: FnMut(&WillAddRemoveCellsEvent) + Send + 'static,
    {
        let id = self.next_observer_id();
        self.will_add_remove.register(id, Box::new(callback))
    }

    /// Observe content changes after each effective batch.
    pub fn on_did_change_content<F>(&mut self, callback: F) -> Disposer
    where
        F: FnMut(&ContentChangedEvent) + Send + 'static,
    {
        let id = self.next_observer_id();
        self.content_changed.register(id, Box::new(callback))
    }

    /// Unregister an observer. Returns `false` if it was already gone.
    pub fn dispose(&mut self, disposer: Disposer) -> bool {
        let id = disposer.id();
        self.will_add_remove.remove(id) || self.content_changed.remove(id)
    }

    fn next_observer_id(&mut self) -> u64 {
        let id = self.next_observer_id;
        self.next_observer_id += 1;
        id
    }

    // ----- undo state -----

    /// Whether there is anything to undo.
    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    /// Whether there is anything to redo.
    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Undo stack depth (in entries).
    pub fn undo_depth(&self) -> usize {
        self.undo.undo_depth()
    }

    /// Redo stack depth (in entries).
    pub fn redo_depth(&self) -> usize {
        self.undo.redo_depth()
    }

    /// Whether the document differs from the last saved point.
    pub fn is_dirty(&self) -> bool {
        !self.undo.is_clean()
    }

    /// Mark the current state as saved.
    pub fn mark_saved(&mut self) {
        self.undo.mark_clean();
    }

    /// Allocate a new undo group id.
    pub fn new_undo_group(&mut self) -> UndoGroupId {
        self.undo.new_group()
    }

    /// Open a new undo transaction and return its epoch.
    ///
    /// Cells inserted while it is open remember the epoch; metadata-only batches on those cells
    /// are combined into a single undo entry.
    pub fn begin_undo_transaction(&mut self) -> u64 {
        self.undo.begin_transaction()
    }

    /// Close the open undo transaction, if any.
    pub fn end_undo_transaction(&mut self) {
        self.undo.end_transaction();
    }

    // ----- edits -----

    /// Apply a batch with default flags: synchronous, no undo group, no selection, undoable.
    pub fn apply(&mut self, edits: Vec<CellEdit>) -> Result<bool, EditError> {
        self.apply_edits(edits, true, None, None, false)
    }

    /// Validate and apply a batch of edits atomically.
    ///
    /// Returns `Ok(false)` if the batch changed nothing: no version bump, no undo entry, no
    /// event. Returns an error, leaving the document untouched, if any operation addresses a
    /// cell that does not exist.
    ///
    /// - `synchronous` is forwarded in the [`ContentChangedEvent`].
    /// - `undo_group` tags the undo entry; entries of one group are undone together.
    /// - `compute_selections_after` runs after the batch to produce the end selection.
    /// - `transient` batches are applied without an undo entry.
    pub fn apply_edits(
        &mut self,
        edits: Vec<CellEdit>,
        synchronous: bool,
        undo_group: Option<UndoGroupId>,
        compute_selections_after: Option<SelectionComputer<'_>>,
        transient: bool,
    ) -> Result<bool, EditError> {
        let edit_count = edits.len();
        let planned = self.plan(edits).inspect_err(|err| {
            tracing::debug!(%err, edit_count, "edit batch rejected");
        })?;

        let mut record = BatchRecord::default();
        for edit in planned {
            self.execute(edit, &mut record);
        }

        let BatchRecord { raw_events, steps } = record;
        if raw_events.is_empty() {
            tracing::debug!(
                edit_count,
                version_id = self.version_id(),
                "edit batch changed nothing"
            );
            return Ok(false);
        }

        let version_id = self.publish_version();
        if !transient {
            self.record_undo(undo_group, steps);
        }
        let end_selection_state = compute_selections_after.and_then(|compute| compute(self));

        tracing::debug!(
            edit_count,
            changes = raw_events.len(),
            version_id,
            transient,
            "edit batch applied"
        );
        self.content_changed.notify(&ContentChangedEvent {
            raw_events,
            version_id,
            synchronous,
            end_selection_state,
        });
        Ok(true)
    }

    /// Revert the newest undo entry (and the entries of its group).
    pub fn undo(&mut self) -> Result<(), EditError> {
        let mut entries = self.undo.pop_undo_group().ok_or(EditError::NothingToUndo)?;

        let mut record = BatchRecord::default();
        for entry in &mut entries {
            for step in entry.steps.iter_mut().rev() {
                self.replay(step, Direction::Undo, &mut record);
            }
        }
        tracing::debug!(entries = entries.len(), "undo");
        self.undo.push_redo(entries);
        self.publish_replay(record);
        Ok(())
    }

    /// Reapply the newest redo entry (and the entries of its group).
    pub fn redo(&mut self) -> Result<(), EditError> {
        let mut entries = self.undo.pop_redo_group().ok_or(EditError::NothingToRedo)?;

        let mut record = BatchRecord::default();
        for entry in &mut entries {
            for step in &mut entry.steps {
                self.replay(step, Direction::Redo, &mut record);
            }
        }
        tracing::debug!(entries = entries.len(), "redo");
        self.undo.push_undone_redo(entries);
        self.publish_replay(record);
        Ok(())
    }

    // ----- planning -----

    fn plan(&self, edits: Vec<CellEdit>) -> Result<Vec<PlannedEdit>, EditError> {
        let len = self.cells.len();

        let mut keyed: Vec<(usize, PendingEdit)> = Vec::with_capacity(edits.len());
        for edit in edits {
            let pending = match edit {
                CellEdit::Replace {
                    index,
                    count,
                    cells,
                } => {
                    if index.checked_add(count).is_none_or(|end| end > len) {
                        return Err(EditError::RangeOutOfBounds { index, count, len });
                    }
                    (index, PendingEdit::Replace {
                        index,
                        count,
                        cells,
                    })
                }
                CellEdit::Output {
                    target,
                    outputs,
                    append,
                } => {
                    let (index, handle) = self.resolve_target(target)?;
                    (index, PendingEdit::Ready(PlannedEdit::Outputs {
                        handle,
                        outputs,
                        append,
                    }))
                }
                CellEdit::PartialInternalMetadata { target, metadata } => {
                    let (index, handle) = self.resolve_target(target)?;
                    (index, PendingEdit::Ready(PlannedEdit::InternalMetadata {
                        handle,
                        metadata,
                    }))
                }
                CellEdit::Metadata { index, metadata } => {
                    let (index, handle) = self.resolve_target(CellTarget::Index(index))?;
                    (index, PendingEdit::Ready(PlannedEdit::Metadata {
                        handle,
                        metadata,
                        partial: false,
                    }))
                }
                CellEdit::PartialMetadata { index, metadata } => {
                    let (index, handle) = self.resolve_target(CellTarget::Index(index))?;
                    (index, PendingEdit::Ready(PlannedEdit::Metadata {
                        handle,
                        metadata,
                        partial: true,
                    }))
                }
                CellEdit::CellLanguage { index, language } => {
                    let (index, handle) = self.resolve_target(CellTarget::Index(index))?;
                    (index, PendingEdit::Ready(PlannedEdit::Language { handle, language }))
                }
                CellEdit::OutputItems {
                    output_id,
                    items,
                    append,
                } => {
                    // Unknown ids sort last and are skipped at execution.
                    let key = self
                        .cells
                        .find_output(&output_id)
                        .map_or(len, |(cell_index, _)| cell_index);
                    (key, PendingEdit::Ready(PlannedEdit::OutputItems {
                        output_id,
                        items,
                        append,
                    }))
                }
                CellEdit::DocumentMetadata { metadata } => {
                    (0, PendingEdit::Ready(PlannedEdit::DocumentMetadata { metadata }))
                }
            };
            keyed.push(pending);
        }
        keyed.sort_by_key(|(key, _)| *key);

        let handles = self.cells.handles();
        let mut tracker = SpliceTracker::new();
        let mut removed: HashSet<CellHandle> = HashSet::new();
        let mut planned = Vec::with_capacity(keyed.len());

        for (_, pending) in keyed {
            let edit = match pending {
                PendingEdit::Replace {
                    index,
                    count,
                    cells,
                } => {
                    if count > 0 && tracker.is_deleted(index) {
                        return Err(EditError::OverlappingReplace { index });
                    }
                    let position = tracker.position(index);
                    removed.extend(handles[index..index + count].iter().copied());
                    tracker.record(index, count, cells.len());
                    PlannedEdit::Splice {
                        position,
                        count,
                        cells,
                    }
                }
                PendingEdit::Ready(edit) => {
                    if let Some(handle) = edit.handle()
                        && removed.contains(&handle)
                    {
                        return Err(EditError::CellRemovedInBatch(handle));
                    }
                    edit
                }
            };
            planned.push(edit);
        }

        Ok(planned)
    }

    fn resolve_target(&self, target: CellTarget) -> Result<(usize, CellHandle), EditError> {
        match target {
            CellTarget::Index(index) => self
                .cells
                .get(index)
                .map(|cell| (index, cell.handle()))
                .ok_or(EditError::IndexOutOfRange {
                    index,
                    len: self.cells.len(),
                }),
            CellTarget::Handle(handle) => self
                .cells
                .index_of(handle)
                .map(|index| (index, handle))
                .ok_or(EditError::UnknownHandle(handle)),
        }
    }

    // ----- execution -----

    fn execute(&mut self, edit: PlannedEdit, record: &mut BatchRecord) {
        match edit {
            PlannedEdit::Splice {
                position,
                count,
                cells,
            } => self.splice_cells(position, count, cells, record),
            PlannedEdit::Outputs {
                handle,
                outputs,
                append,
            } => self.set_outputs(handle, outputs, append, record),
            PlannedEdit::OutputItems {
                output_id,
                items,
                append,
            } => self.set_output_items(output_id, items, append, record),
            PlannedEdit::Metadata {
                handle,
                metadata,
                partial,
            } => self.set_metadata(handle, metadata, partial, record),
            PlannedEdit::InternalMetadata { handle, metadata } => {
                self.merge_internal_metadata(handle, &metadata, record)
            }
            PlannedEdit::Language { handle, language } => {
                self.set_language(handle, language, record)
            }
            PlannedEdit::DocumentMetadata { metadata } => {
                self.set_document_metadata(metadata, record)
            }
        }
    }

    fn splice_cells(
        &mut self,
        position: usize,
        count: usize,
        cells: Vec<CellData>,
        record: &mut BatchRecord,
    ) {
        if count == 0 && cells.is_empty() {
            return;
        }

        let epoch = self.undo.open_epoch();
        let inserted: Vec<Cell> = cells
            .into_iter()
            .map(|data| {
                let handle = self.cells.allocate_handle();
                let source = (self.buffer_factory)(handle, &data.source);
                Cell::new(handle, data, source, epoch)
            })
            .collect();
        let inserted_snapshots: Vec<CellSnapshot> = inserted.iter().map(Cell::snapshot).collect();
        let anchor = position
            .checked_sub(1)
            .and_then(|before| self.cells.get(before))
            .map(Cell::handle);

        let removed = self.replace_cells(position, count, inserted, record);
        record.steps.push(UndoStep::Splice {
            anchor,
            index: position,
            removed,
            inserted: inserted_snapshots,
        });
    }

    /// Notify, splice and release. Returns snapshots of the removed cells. The range must be in
    /// bounds.
    fn replace_cells(
        &mut self,
        position: usize,
        count: usize,
        inserted: Vec<Cell>,
        record: &mut BatchRecord,
    ) -> Vec<CellSnapshot> {
        let removed_handles: Vec<CellHandle> = self
            .cells
            .iter()
            .skip(position)
            .take(count)
            .map(Cell::handle)
            .collect();
        let splice = CellSplice {
            index: position,
            delete_count: count,
            inserted: inserted.iter().map(Cell::handle).collect(),
        };
        self.will_add_remove.notify(&WillAddRemoveCellsEvent {
            splice: splice.clone(),
            removed: removed_handles,
        });

        let mut removed = self.cells.splice(position, count, inserted);
        let snapshots = removed.iter().map(Cell::snapshot).collect();
        for cell in &mut removed {
            cell.release_source();
        }

        record.raw_events.push(RawContentChange::ModelChange(splice));
        snapshots
    }

    fn set_outputs(
        &mut self,
        handle: CellHandle,
        outputs: Vec<OutputData>,
        append: bool,
        record: &mut BatchRecord,
    ) {
        let Some(index) = self.cells.index_of(handle) else {
            return;
        };
        let Some(cell) = self.cells.get_mut(index) else {
            return;
        };
        if outputs.is_empty() && (append || cell.outputs.is_empty()) {
            return;
        }

        let output_ids: Vec<String> = outputs.iter().map(|o| o.output_id.clone()).collect();
        let before = cell.outputs.clone();
        let created = outputs.into_iter().map(CellOutput::new);
        if append {
            cell.outputs.extend(created);
        } else {
            cell.outputs = created.collect();
        }
        cell.bump_revision();

        record.steps.push(UndoStep::Outputs {
            handle,
            before,
            after: cell.outputs.clone(),
        });
        record.raw_events.push(RawContentChange::Output {
            index,
            handle,
            append,
            output_ids,
        });
    }

    fn set_output_items(
        &mut self,
        output_id: String,
        items: Vec<OutputItem>,
        append: bool,
        record: &mut BatchRecord,
    ) {
        let Some((index, output_index)) = self.cells.find_output(&output_id) else {
            tracing::debug!(%output_id, "output items edit for unknown output ignored");
            return;
        };
        let Some(cell) = self.cells.get_mut(index) else {
            return;
        };
        let before = cell.outputs.clone();
        let Some(output) = cell.outputs.get_mut(output_index) else {
            return;
        };

        let changed = if append {
            output.append_items(items)
        } else {
            output.replace_items(items);
            true
        };
        if !changed {
            return;
        }
        cell.bump_revision();

        let handle = cell.handle();
        record.steps.push(UndoStep::Outputs {
            handle,
            before,
            after: cell.outputs.clone(),
        });
        record.raw_events.push(RawContentChange::OutputItems {
            index,
            handle,
            output_id,
            append,
        });
    }

    fn set_metadata(
        &mut self,
        handle: CellHandle,
        metadata: Metadata,
        partial: bool,
        record: &mut BatchRecord,
    ) {
        let Some(index) = self.cells.index_of(handle) else {
            return;
        };
        let Some(cell) = self.cells.get_mut(index) else {
            return;
        };

        let next = if partial {
            let mut merged = cell.metadata.clone();
            merged.extend(metadata);
            merged
        } else {
            metadata
        };
        if next == cell.metadata {
            return;
        }

        let before = std::mem::replace(&mut cell.metadata, next);
        cell.bump_revision();
        record.steps.push(UndoStep::Metadata {
            handle,
            before,
            after: cell.metadata.clone(),
        });
        record
            .raw_events
            .push(RawContentChange::CellMetadata { index, handle });
    }

    fn merge_internal_metadata(
        &mut self,
        handle: CellHandle,
        metadata: &InternalMetadata,
        record: &mut BatchRecord,
    ) {
        let Some(index) = self.cells.index_of(handle) else {
            return;
        };
        let Some(cell) = self.cells.get_mut(index) else {
            return;
        };

        let before = cell.internal_metadata.clone();
        if !cell.internal_metadata.merge(metadata) {
            return;
        }
        cell.bump_revision();
        record.steps.push(UndoStep::InternalMetadata {
            handle,
            before,
            after: cell.internal_metadata.clone(),
        });
        record
            .raw_events
            .push(RawContentChange::CellInternalMetadata { index, handle });
    }

    fn set_language(&mut self, handle: CellHandle, language: String, record: &mut BatchRecord) {
        let Some(index) = self.cells.index_of(handle) else {
            return;
        };
        let Some(cell) = self.cells.get_mut(index) else {
            return;
        };
        if cell.language() == language {
            return;
        }

        let before = cell.set_language(language.clone());
        cell.bump_revision();
        record.steps.push(UndoStep::Language {
            handle,
            before,
            after: language.clone(),
        });
        record.raw_events.push(RawContentChange::CellLanguage {
            index,
            handle,
            language,
        });
    }

    fn set_document_metadata(&mut self, metadata: Metadata, record: &mut BatchRecord) {
        if metadata == self.metadata {
            return;
        }
        let before = std::mem::replace(&mut self.metadata, metadata);
        record.steps.push(UndoStep::DocumentMetadata {
            before,
            after: self.metadata.clone(),
        });
        record.raw_events.push(RawContentChange::DocumentMetadata);
    }

    // ----- undo/redo replay -----

    fn replay(&mut self, step: &mut UndoStep, direction: Direction, record: &mut BatchRecord) {
        match step {
            UndoStep::Splice {
                anchor,
                index,
                removed,
                inserted,
            } => {
                let (taken_out, put_back) = match direction {
                    Direction::Undo => (inserted, removed),
                    Direction::Redo => (removed, inserted),
                };
                let cells = self.restore_cells(put_back);
                // Refreshed snapshots keep source edits made since the step was recorded.
                *taken_out = match self.contiguous_run(taken_out) {
                    Some(position) => {
                        self.replace_cells(position, taken_out.len(), cells, record)
                    }
                    None => {
                        let snapshots = self.remove_cells(taken_out, record);
                        if !cells.is_empty() {
                            let position = self.anchor_position(*anchor, *index);
                            self.replace_cells(position, 0, cells, record);
                        }
                        snapshots
                    }
                };
            }
            UndoStep::Outputs {
                handle,
                before,
                after,
            } => {
                let outputs = direction.pick(before, after);
                if let Some(index) = self.cells.index_of(*handle)
                    && let Some(cell) = self.cells.get_mut(index)
                {
                    cell.outputs = outputs.clone();
                    cell.bump_revision();
                    record.raw_events.push(RawContentChange::Output {
                        index,
                        handle: *handle,
                        append: false,
                        output_ids: outputs.iter().map(|o| o.output_id().to_string()).collect(),
                    });
                }
            }
            UndoStep::Metadata {
                handle,
                before,
                after,
            } => {
                let metadata = direction.pick(before, after);
                if let Some(index) = self.cells.index_of(*handle)
                    && let Some(cell) = self.cells.get_mut(index)
                {
                    cell.metadata = metadata.clone();
                    cell.bump_revision();
                    record.raw_events.push(RawContentChange::CellMetadata {
                        index,
                        handle: *handle,
                    });
                }
            }
            UndoStep::InternalMetadata {
                handle,
                before,
                after,
            } => {
                let metadata = direction.pick(before, after);
                if let Some(index) = self.cells.index_of(*handle)
                    && let Some(cell) = self.cells.get_mut(index)
                {
                    cell.internal_metadata = metadata.clone();
                    cell.bump_revision();
                    record.raw_events.push(RawContentChange::CellInternalMetadata {
                        index,
                        handle: *handle,
                    });
                }
            }
            UndoStep::Language {
                handle,
                before,
                after,
            } => {
                let language = direction.pick(before, after);
                if let Some(index) = self.cells.index_of(*handle)
                    && let Some(cell) = self.cells.get_mut(index)
                {
                    cell.set_language(language.clone());
                    cell.bump_revision();
                    record.raw_events.push(RawContentChange::CellLanguage {
                        index,
                        handle: *handle,
                        language: language.clone(),
                    });
                }
            }
            UndoStep::DocumentMetadata { before, after } => {
                self.metadata = direction.pick(before, after).clone();
                record.raw_events.push(RawContentChange::DocumentMetadata);
            }
        }
    }

    fn restore_cells(&mut self, snapshots: &[CellSnapshot]) -> Vec<Cell> {
        snapshots
            .iter()
            .map(|snapshot| {
                self.cells.reserve_handle(snapshot.handle);
                let source = (self.buffer_factory)(snapshot.handle, &snapshot.source);
                Cell::restore(snapshot.clone(), source)
            })
            .collect()
    }

    /// Position of `snapshots` if their cells still sit side by side in order.
    fn contiguous_run(&self, snapshots: &[CellSnapshot]) -> Option<usize> {
        let first = self.cells.index_of(snapshots.first()?.handle)?;
        snapshots
            .iter()
            .enumerate()
            .all(|(offset, snapshot)| {
                self.cells.get(first + offset).map(Cell::handle) == Some(snapshot.handle)
            })
            .then_some(first)
    }

    /// Remove the listed cells one by one, wherever they are now. Cells that are already gone
    /// keep their old snapshot.
    fn remove_cells(
        &mut self,
        snapshots: &[CellSnapshot],
        record: &mut BatchRecord,
    ) -> Vec<CellSnapshot> {
        snapshots
            .iter()
            .map(|snapshot| match self.cells.index_of(snapshot.handle) {
                Some(index) => self
                    .replace_cells(index, 1, Vec::new(), record)
                    .pop()
                    .unwrap_or_else(|| snapshot.clone()),
                None => snapshot.clone(),
            })
            .collect()
    }

    fn anchor_position(&self, anchor: Option<CellHandle>, recorded: usize) -> usize {
        let Some(anchor) = anchor else {
            return 0;
        };
        match self.cells.index_of(anchor) {
            Some(index) => index + 1,
            None => {
                tracing::debug!(%anchor, recorded, "splice anchor is gone, using recorded index");
                recorded.min(self.cells.len())
            }
        }
    }

    // ----- publishing -----

    fn publish_version(&mut self) -> u64 {
        let version_id = self.undo.bump_version();
        self.alternative_version_id = self.compute_alternative_version_id();
        version_id
    }

    fn publish_replay(&mut self, record: BatchRecord) {
        if record.raw_events.is_empty() {
            return;
        }
        let version_id = self.publish_version();
        self.content_changed.notify(&ContentChangedEvent {
            raw_events: record.raw_events,
            version_id,
            synchronous: true,
            end_selection_state: None,
        });
    }

    fn record_undo(&mut self, group: Option<UndoGroupId>, mut steps: Vec<UndoStep>) {
        if self.options.transient_outputs {
            steps.retain(|step| !step.is_output());
        }
        if steps.is_empty() {
            return;
        }

        let cells = &self.cells;
        let entry = UndoEntry::new(group, self.undo.open_epoch(), steps, |handle| {
            cells
                .index_of(handle)
                .and_then(|index| cells.get(index))
                .and_then(Cell::created_epoch)
        });
        if self.undo.push(entry) {
            tracing::debug!("metadata edit combined into previous undo entry");
        }
    }

    fn compute_alternative_version_id(&self) -> String {
        let cells: Vec<String> = self
            .cells
            .iter()
            .enumerate()
            .map(|(index, cell)| format!("{index},{}", cell.internal_version()))
            .collect();
        format!("{}_{}", self.undo.version_id(), cells.join(";"))
    }
}

impl std::fmt::Debug for NotebookDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotebookDocument")
            .field("cells", &self.cells)
            .field("metadata", &self.metadata)
            .field("version_id", &self.undo.version_id())
            .field("alternative_version_id", &self.alternative_version_id)
            .finish_non_exhaustive()
    }
}
