#![warn(missing_docs)]
//! Notebook Core - Headless Notebook Document Edit Engine
//!
//! # Overview
//!
//! `notebook-core` maintains an ordered list of notebook cells (source, language, kind, metadata,
//! outputs) and applies batches of structural and content edits to it atomically.
//! It does not render anything and does not execute code; front-ends and kernels talk to it
//! through edit batches and change events.
//!
//! # Core Features
//!
//! - **Atomic Batches**: all-or-nothing validation, deterministic application order, one version bump per batch
//! - **Stable Handles**: cells keep their handle across edits, undo and redo
//! - **Streaming Outputs**: stdout/stderr appends are merged in place with cursor-up and carriage-return handling
//! - **Incremental Output Reads**: `appended_since_version` returns only the bytes appended since a version
//! - **Undo/Redo**: grouped entries, transaction-scoped combination of metadata edits, clean-point tracking
//! - **Diffing**: positional `compute_edits` from a desired end state
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  NotebookDocument (Edit Batch Applier)      │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  compute_edits (Diff Synthesizer)           │  ← Edit planning
//! ├─────────────────────────────────────────────┤
//! │  Undo Coordinator    │  Observers / Events  │  ← History & notifications
//! ├─────────────────────────────────────────────┤
//! │  Cell List Store     │  Output Compactor    │  ← Document state
//! ├─────────────────────────────────────────────┤
//! │  SourceBuffer (Rope)  │  Stream merger      │  ← Storage & codecs
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use notebook_core::{CellData, CellEdit, NotebookDocument, OutputData, OutputItem, STDOUT_MIME};
//!
//! let mut doc = NotebookDocument::new(vec![
//!     CellData::markup("# Title"),
//!     CellData::code("for i in range(3): print(i)", "python"),
//! ]);
//!
//! // Observe changes.
//! let _subscription = doc.on_did_change_content(|event| {
//!     println!("version {} with {} changes", event.version_id, event.raw_events.len());
//! });
//!
//! // A kernel starts streaming output.
//! doc.apply(vec![CellEdit::set_outputs(
//!     1,
//!     vec![OutputData::new("run-1", vec![OutputItem::stdout("0\n")])],
//! )])
//! .unwrap();
//! doc.apply(vec![CellEdit::append_output_items("run-1", vec![OutputItem::stdout("1\n")])])
//!     .unwrap();
//!
//! let output = doc.output("run-1").unwrap();
//! assert_eq!(output.items().len(), 1);
//! assert_eq!(output.items()[0].as_text(), "0\n1\n");
//! assert_eq!(doc.appended_since_version("run-1", 0, STDOUT_MIME), Some(&b"1\n"[..]));
//!
//! // Undo the append.
//! doc.undo().unwrap();
//! assert_eq!(doc.output("run-1").unwrap().items()[0].as_text(), "0\n");
//! ```
//!
//! # Module Description
//!
//! - [`cell`] - Cell data model and live cells
//! - [`source`] - Per-cell source buffers
//! - [`cell_list`] - Ordered cell storage
//! - [`stream`] - Streaming text control-token handling
//! - [`output`] - Outputs and the output compactor
//! - [`edit`] - Edit operations and errors
//! - [`events`] - Change events and observers
//! - [`undo`] - Version and undo bookkeeping
//! - [`document`] - The notebook document
//! - [`diff`] - Edit synthesis from a target state
//! - [`config`] - Document options

pub mod cell;
pub mod cell_list;
pub mod config;
pub mod diff;
pub mod document;
pub mod edit;
pub mod events;
pub mod output;
pub mod source;
pub mod stream;
pub mod undo;

pub use cell::{Cell, CellData, CellHandle, CellKind, InternalMetadata, Metadata};
pub use cell_list::CellList;
pub use config::NotebookOptions;
pub use diff::compute_edits;
pub use document::{NotebookDocument, SelectionComputer};
pub use edit::{CellEdit, CellTarget, EditError};
pub use events::{
    CellRange, CellSplice, ContentChangedCallback, ContentChangedEvent, Disposer,
    RawContentChange, SelectionState, WillAddRemoveCellsCallback, WillAddRemoveCellsEvent,
};
pub use output::{CellOutput, OutputData, OutputItem, STDERR_MIME, STDOUT_MIME, is_stream_mime};
pub use source::{RopeSourceBuffer, SourceBuffer, SourceBufferFactory, rope_buffer_factory};
pub use stream::{CURSOR_UP_ONE_LINE, merge_stream};
pub use undo::UndoGroupId;
