//! Notebook cell model.
//!
//! A [`Cell`] is the live, document-owned unit of content. Hosts describe cells they want to
//! create with [`CellData`]; the document turns each one into a [`Cell`] with a freshly
//! allocated [`CellHandle`] and a source buffer produced by its
//! [`SourceBufferFactory`](crate::SourceBufferFactory).

use crate::output::{CellOutput, OutputData};
use crate::source::SourceBuffer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque metadata map attached to cells and documents.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Stable identifier of a cell.
///
/// Handles are assigned when a cell is created and are never reassigned to another cell,
/// no matter how the cell moves around the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellHandle(u64);

impl CellHandle {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cell kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    /// Markup (documentation) cell.
    Markup,
    /// Executable code cell.
    Code,
}

/// Execution bookkeeping kept next to the user-visible metadata.
///
/// Used both as the stored value and as a partial update: `None` fields in an update leave the
/// stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalMetadata {
    /// Execution counter shown next to the cell.
    pub execution_order: Option<u32>,
    /// Whether the last run succeeded.
    pub last_run_success: Option<bool>,
    /// Start timestamp of the last run (milliseconds, host-defined epoch).
    pub run_start_time: Option<u64>,
    /// End timestamp of the last run (milliseconds, host-defined epoch).
    pub run_end_time: Option<u64>,
}

impl InternalMetadata {
    /// Merge the `Some` fields of `partial` into `self`.
    ///
    /// Returns `true` if any stored value changed.
    pub fn merge(&mut self, partial: &InternalMetadata) -> bool {
        let before = self.clone();
        if partial.execution_order.is_some() {
            self.execution_order = partial.execution_order;
        }
        if partial.last_run_success.is_some() {
            self.last_run_success = partial.last_run_success;
        }
        if partial.run_start_time.is_some() {
            self.run_start_time = partial.run_start_time;
        }
        if partial.run_end_time.is_some() {
            self.run_end_time = partial.run_end_time;
        }
        *self != before
    }
}

/// Plain description of a cell's content, used to create cells and as diff targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellData {
    /// Source text.
    pub source: String,
    /// Language tag (e.g. `python`, `markdown`).
    pub language: String,
    /// Cell kind.
    pub kind: CellKind,
    /// Optional mime type of the source.
    #[serde(default)]
    pub mime: Option<String>,
    /// Outputs attached to the cell.
    #[serde(default)]
    pub outputs: Vec<OutputData>,
    /// User-visible metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Execution metadata.
    #[serde(default)]
    pub internal_metadata: InternalMetadata,
}

impl CellData {
    /// Create a code cell description.
    pub fn code(source: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language: language.into(),
            kind: CellKind::Code,
            mime: None,
            outputs: Vec::new(),
            metadata: Metadata::new(),
            internal_metadata: InternalMetadata::default(),
        }
    }

    /// Create a markdown cell description.
    pub fn markup(source: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Markup,
            ..Self::code(source, "markdown")
        }
    }

    /// Attach outputs.
    pub fn with_outputs(mut self, outputs: Vec<OutputData>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the source mime type.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// A live cell owned by a [`NotebookDocument`](crate::NotebookDocument).
pub struct Cell {
    handle: CellHandle,
    source: Box<dyn SourceBuffer>,
    language: String,
    kind: CellKind,
    mime: Option<String>,
    pub(crate) metadata: Metadata,
    pub(crate) internal_metadata: InternalMetadata,
    pub(crate) outputs: Vec<CellOutput>,
    revision: u64,
    created_epoch: Option<u64>,
}

impl Cell {
    pub(crate) fn new(
        handle: CellHandle,
        data: CellData,
        source: Box<dyn SourceBuffer>,
        created_epoch: Option<u64>,
    ) -> Self {
        Self {
            handle,
            source,
            language: data.language,
            kind: data.kind,
            mime: data.mime,
            metadata: data.metadata,
            internal_metadata: data.internal_metadata,
            outputs: data.outputs.into_iter().map(CellOutput::new).collect(),
            revision: 0,
            created_epoch,
        }
    }

    pub(crate) fn restore(snapshot: CellSnapshot, source: Box<dyn SourceBuffer>) -> Self {
        Self {
            handle: snapshot.handle,
            source,
            language: snapshot.language,
            kind: snapshot.kind,
            mime: snapshot.mime,
            metadata: snapshot.metadata,
            internal_metadata: snapshot.internal_metadata,
            outputs: snapshot.outputs,
            revision: snapshot.revision,
            created_epoch: snapshot.created_epoch,
        }
    }

    /// Stable handle of this cell.
    pub fn handle(&self) -> CellHandle {
        self.handle
    }

    /// Current source text, read from the source buffer.
    pub fn source_text(&self) -> String {
        self.source.text()
    }

    /// Read access to the source buffer.
    pub fn source(&self) -> &dyn SourceBuffer {
        self.source.as_ref()
    }

    pub(crate) fn source_mut(&mut self) -> &mut dyn SourceBuffer {
        self.source.as_mut()
    }

    /// Language tag.
    pub fn language(&self) -> &str {
        &self.language
    }

    pub(crate) fn set_language(&mut self, language: String) -> String {
        std::mem::replace(&mut self.language, language)
    }

    /// Cell kind.
    pub fn kind(&self) -> CellKind {
        self.kind
    }

    /// Source mime type, if any.
    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    /// User-visible metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Execution metadata.
    pub fn internal_metadata(&self) -> &InternalMetadata {
        &self.internal_metadata
    }

    /// Outputs in display order.
    pub fn outputs(&self) -> &[CellOutput] {
        &self.outputs
    }

    /// Undo transaction epoch this cell was created in, if one was open.
    pub fn created_epoch(&self) -> Option<u64> {
        self.created_epoch
    }

    /// Per-cell version used in the document's alternative version id.
    ///
    /// Advances whenever the document mutates the cell or its source buffer reports a new
    /// version.
    pub fn internal_version(&self) -> u64 {
        self.revision.wrapping_add(self.source.version_id())
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub(crate) fn release_source(&mut self) {
        self.source.release();
    }

    /// Describe this cell as plain [`CellData`].
    pub fn to_data(&self) -> CellData {
        CellData {
            source: self.source_text(),
            language: self.language.clone(),
            kind: self.kind,
            mime: self.mime.clone(),
            outputs: self.outputs.iter().map(CellOutput::to_data).collect(),
            metadata: self.metadata.clone(),
            internal_metadata: self.internal_metadata.clone(),
        }
    }

    pub(crate) fn snapshot(&self) -> CellSnapshot {
        CellSnapshot {
            handle: self.handle,
            source: self.source_text(),
            language: self.language.clone(),
            kind: self.kind,
            mime: self.mime.clone(),
            metadata: self.metadata.clone(),
            internal_metadata: self.internal_metadata.clone(),
            outputs: self.outputs.clone(),
            revision: self.revision,
            created_epoch: self.created_epoch,
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("handle", &self.handle)
            .field("source", &self.source.text())
            .field("language", &self.language)
            .field("kind", &self.kind)
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}

/// Full copy of a cell, kept by undo entries so removed cells can come back with their handle.
#[derive(Debug, Clone)]
pub(crate) struct CellSnapshot {
    pub(crate) handle: CellHandle,
    pub(crate) source: String,
    language: String,
    kind: CellKind,
    mime: Option<String>,
    metadata: Metadata,
    internal_metadata: InternalMetadata,
    outputs: Vec<CellOutput>,
    revision: u64,
    created_epoch: Option<u64>,
}
