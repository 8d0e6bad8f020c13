//! Edit synthesis from a desired end state.
//!
//! [`compute_edits`] compares the document with target cell contents strictly by position: no
//! move detection, no matching across indices. The result can be passed straight to
//! [`NotebookDocument::apply_edits`](crate::NotebookDocument::apply_edits).

use crate::cell::{Cell, CellData, CellHandle};
use crate::document::NotebookDocument;
use crate::edit::{CellEdit, CellTarget};
use crate::output::{CellOutput, OutputData};

/// Compute the edits turning `document` into `target`.
///
/// At each shared position a cell whose source, language, kind or mime differs is replaced
/// outright (outputs included). Otherwise the cell keeps its handle and only these are
/// produced, in order:
///
/// - a `Metadata` edit if metadata differs,
/// - a `PartialInternalMetadata` edit if execution metadata differs,
/// - output edits if outputs differ.
///
/// Extra target cells are inserted at the end; extra document cells are deleted.
///
/// `executing` lists handles of cells currently running. Target cells carry no executing
/// state, so a running cell is kept like any other; its outputs and execution metadata belong
/// to the run and are not diffed.
///
/// Execution metadata is merged, so a field that is set on the cell but unset in the target
/// stays set.
pub fn compute_edits(
    document: &NotebookDocument,
    target: &[CellData],
    executing: &[CellHandle],
) -> Vec<CellEdit> {
    let current = document.cells();
    let shared = current.len().min(target.len());
    let mut edits = Vec::new();

    for (index, (cell, wanted)) in current.iter().zip(target).enumerate() {
        if structurally_differs(cell, wanted) {
            edits.push(CellEdit::Replace {
                index,
                count: 1,
                cells: vec![wanted.clone()],
            });
            continue;
        }

        if cell.metadata() != &wanted.metadata {
            edits.push(CellEdit::Metadata {
                index,
                metadata: wanted.metadata.clone(),
            });
        }
        if executing.contains(&cell.handle()) {
            continue;
        }
        if cell.internal_metadata().clone().merge(&wanted.internal_metadata) {
            edits.push(CellEdit::PartialInternalMetadata {
                target: CellTarget::Handle(cell.handle()),
                metadata: wanted.internal_metadata.clone(),
            });
        }
        edits.extend(output_edits(cell, &wanted.outputs));
    }

    if target.len() > shared {
        edits.push(CellEdit::insert(shared, target[shared..].to_vec()));
    } else if current.len() > shared {
        edits.push(CellEdit::delete(shared, current.len() - shared));
    }

    edits
}

fn structurally_differs(cell: &Cell, wanted: &CellData) -> bool {
    cell.kind() != wanted.kind
        || cell.language() != wanted.language
        || cell.mime() != wanted.mime.as_deref()
        || cell.source_text() != wanted.source
}

fn output_edits(cell: &Cell, wanted: &[OutputData]) -> Vec<CellEdit> {
    let current = cell.outputs();
    let target = CellTarget::Handle(cell.handle());

    let common = current
        .iter()
        .zip(wanted)
        .take_while(|(have, want)| have.matches(want))
        .count();
    if common == current.len() && common == wanted.len() {
        return Vec::new();
    }

    // Existing outputs untouched, new ones added at the end.
    if common == current.len() {
        return vec![CellEdit::Output {
            target,
            outputs: wanted[common..].to_vec(),
            append: true,
        }];
    }

    if same_outputs_with_new_items(current, wanted) {
        return current
            .iter()
            .zip(wanted)
            .filter(|(have, want)| !have.matches(want))
            .map(|(_, want)| CellEdit::OutputItems {
                output_id: want.output_id.clone(),
                items: want.items.clone(),
                append: false,
            })
            .collect();
    }

    vec![CellEdit::Output {
        target,
        outputs: wanted.to_vec(),
        append: false,
    }]
}

/// Same ids in the same order with the same output metadata: only item lists differ.
fn same_outputs_with_new_items(current: &[CellOutput], wanted: &[OutputData]) -> bool {
    current.len() == wanted.len()
        && current
            .iter()
            .zip(wanted)
            .all(|(have, want)| have.output_id() == want.output_id && have.metadata() == &want.metadata)
}
