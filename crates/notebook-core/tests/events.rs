use notebook_core::{
    CellData, CellEdit, CellSplice, ContentChangedEvent, NotebookDocument, RawContentChange,
    WillAddRemoveCellsEvent,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

fn notebook(sources: &[&str]) -> NotebookDocument {
    NotebookDocument::new(
        sources
            .iter()
            .map(|s| CellData::code(*s, "python"))
            .collect(),
    )
}

#[test]
fn test_will_add_remove_precedes_content_event() {
    let mut doc = notebook(&["a", "b"]);
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let will = log.clone();
    let _will = doc.on_will_add_remove_cells(move |event: &WillAddRemoveCellsEvent| {
        will.lock()
            .unwrap()
            .push(format!("will:{}-{}", event.splice.index, event.splice.delete_count));
    });
    let did = log.clone();
    let _did = doc.on_did_change_content(move |event: &ContentChangedEvent| {
        did.lock().unwrap().push(format!("did:{}", event.version_id));
    });

    doc.apply(vec![
        CellEdit::delete(0, 1),
        CellEdit::insert(2, vec![CellData::markup("c")]),
    ])
    .unwrap();

    assert_eq!(
        log.lock().unwrap().clone(),
        vec!["will:0-1", "will:1-0", "did:1"]
    );
}

#[test]
fn test_will_add_remove_reports_removed_handles() {
    let removed = Arc::new(Mutex::new(None::<Vec<String>>));
    let mut notebook = notebook(&["keep", "drop"]);
    let handles = notebook.handles();

    let seen = removed.clone();
    let _observer = notebook.on_will_add_remove_cells(move |event| {
        *seen.lock().unwrap() = Some(event.removed.iter().map(|h| h.to_string()).collect());
    });
    notebook.apply(vec![CellEdit::delete(1, 1)]).unwrap();

    assert_eq!(
        removed.lock().unwrap().clone(),
        Some(vec![handles[1].to_string()])
    );
    assert_eq!(notebook.cell_by_handle(handles[1]).map(|c| c.handle()), None);
}

#[test]
fn test_undo_emits_model_change() {
    let mut doc = notebook(&["a", "b"]);
    let removed = doc.handles()[1];
    doc.apply(vec![CellEdit::delete(1, 1)]).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _observer = doc.on_did_change_content(move |event| sink.lock().unwrap().push(event.clone()));
    doc.undo().unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].version_id, 2);
    assert_eq!(
        events[0].raw_events,
        vec![RawContentChange::ModelChange(CellSplice {
            index: 1,
            delete_count: 0,
            inserted: vec![removed],
        })]
    );
}

#[test]
fn test_dispose_is_idempotent_per_observer() {
    let mut doc = notebook(&["a"]);
    let count = Arc::new(Mutex::new(0));

    let counter = count.clone();
    let first = doc.on_did_change_content(move |_| *counter.lock().unwrap() += 1);
    let counter = count.clone();
    let _second = doc.on_did_change_content(move |_| *counter.lock().unwrap() += 10);

    doc.apply(vec![CellEdit::delete(0, 1)]).unwrap();
    assert_eq!(*count.lock().unwrap(), 11);

    assert!(doc.dispose(first));
    doc.apply(vec![CellEdit::insert(0, vec![CellData::markup("x")])])
        .unwrap();
    assert_eq!(*count.lock().unwrap(), 21);
}

#[test]
fn test_no_op_batch_emits_nothing() {
    let mut doc = notebook(&["a", "b"]);
    let fired = Arc::new(Mutex::new(false));

    let flag = fired.clone();
    let _will = doc.on_will_add_remove_cells(move |_| *flag.lock().unwrap() = true);
    let flag = fired.clone();
    let _did = doc.on_did_change_content(move |_| *flag.lock().unwrap() = true);

    let changed = doc
        .apply(vec![
            CellEdit::set_outputs(0, Vec::new()),
            CellEdit::set_outputs(1, Vec::new()),
            CellEdit::insert(0, Vec::new()),
        ])
        .unwrap();

    assert!(!changed);
    assert!(!*fired.lock().unwrap());
}
