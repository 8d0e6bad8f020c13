use notebook_core::{
    CURSOR_UP_ONE_LINE, CellData, CellEdit, CellTarget, NotebookDocument, OutputData, OutputItem,
    RawContentChange, STDERR_MIME, STDOUT_MIME,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

fn running_cell(initial: &str) -> NotebookDocument {
    NotebookDocument::new(vec![
        CellData::code("run()", "python")
            .with_outputs(vec![OutputData::new("out", vec![OutputItem::stdout(initial)])]),
    ])
}

fn append(doc: &mut NotebookDocument, items: Vec<OutputItem>) -> bool {
    doc.apply(vec![CellEdit::append_output_items("out", items)])
        .unwrap()
}

fn text(doc: &NotebookDocument) -> Vec<String> {
    doc.output("out")
        .unwrap()
        .items()
        .iter()
        .map(|item| item.as_text().into_owned())
        .collect()
}

#[test]
fn test_streaming_appends_collapse_and_report_delta() {
    let mut doc = running_cell("foo");

    append(&mut doc, vec![OutputItem::stdout("bar")]);
    append(&mut doc, vec![OutputItem::stdout("baz")]);

    assert_eq!(text(&doc), vec!["foobarbaz"]);
    assert_eq!(doc.output("out").unwrap().version(), 2);
    assert_eq!(
        doc.appended_since_version("out", 0, STDOUT_MIME),
        Some(&b"barbaz"[..])
    );
    assert_eq!(
        doc.appended_since_version("out", 1, STDOUT_MIME),
        Some(&b"baz"[..])
    );
    assert_eq!(doc.appended_since_version("out", 2, STDOUT_MIME), None);
    assert_eq!(doc.appended_since_version("out", 7, STDOUT_MIME), None);
    assert_eq!(doc.appended_since_version("missing", 0, STDOUT_MIME), None);
}

#[test]
fn test_appended_since_version_shrinks_as_version_grows() {
    let mut doc = running_cell("");
    for chunk in ["a", "bb", "ccc", "dddd"] {
        append(&mut doc, vec![OutputItem::stdout(chunk)]);
    }

    let sizes: Vec<usize> = (0..=4)
        .map(|v| {
            doc.appended_since_version("out", v, STDOUT_MIME)
                .map_or(0, <[u8]>::len)
        })
        .collect();
    assert_eq!(sizes, vec![10, 9, 7, 4, 0]);
}

#[test]
fn test_cursor_up_compression_invalidates_history() {
    let mut doc = running_cell("append 1\nappend 1");
    let chunk = [CURSOR_UP_ONE_LINE, &b"\nappend 2"[..]].concat();

    append(&mut doc, vec![OutputItem::new(STDOUT_MIME, chunk)]);

    assert_eq!(text(&doc), vec!["append 1\nappend 2"]);
    assert_eq!(doc.output("out").unwrap().version(), 1);
    assert_eq!(doc.appended_since_version("out", 0, STDOUT_MIME), None);
}

#[test]
fn test_carriage_return_rewrites_current_line() {
    let mut doc = running_cell("step 1/3\nprogress 10%");

    append(&mut doc, vec![OutputItem::stdout("\rprogress 50%")]);
    append(&mut doc, vec![OutputItem::stdout("\rprogress 100%\n")]);

    assert_eq!(text(&doc), vec!["step 1/3\nprogress 100%\n"]);
    assert_eq!(doc.appended_since_version("out", 1, STDOUT_MIME), None);
}

#[test]
fn test_non_stream_and_mixed_mimes_push_new_items() {
    let mut doc = running_cell("out");

    append(
        &mut doc,
        vec![
            OutputItem::stderr("err"),
            OutputItem::stderr(" more"),
            OutputItem::new("image/png", vec![0x89, b'P', b'N', b'G']),
        ],
    );

    let output = doc.output("out").unwrap();
    let mimes: Vec<&str> = output.items().iter().map(|item| item.mime.as_str()).collect();
    assert_eq!(mimes, vec![STDOUT_MIME, STDERR_MIME, "image/png"]);
    assert_eq!(output.items()[1].as_text(), "err more");
    assert_eq!(output.version(), 1);
}

#[test]
fn test_replacing_items_bumps_version_and_clears_history() {
    let mut doc = running_cell("a");
    append(&mut doc, vec![OutputItem::stdout("b")]);

    let changed = doc
        .apply(vec![CellEdit::OutputItems {
            output_id: "out".to_string(),
            items: vec![OutputItem::stdout("fresh")],
            append: false,
        }])
        .unwrap();

    assert!(changed);
    assert_eq!(text(&doc), vec!["fresh"]);
    assert_eq!(doc.output("out").unwrap().version(), 2);
    assert_eq!(doc.appended_since_version("out", 0, STDOUT_MIME), None);
    assert_eq!(doc.appended_since_version("out", 1, STDOUT_MIME), None);
}

#[test]
fn test_empty_append_is_a_no_op() {
    let mut doc = running_cell("a");

    assert!(!append(&mut doc, Vec::new()));
    assert!(
        !doc.apply(vec![CellEdit::Output {
            target: CellTarget::Index(0),
            outputs: Vec::new(),
            append: true,
        }])
        .unwrap()
    );
    assert_eq!(doc.version_id(), 0);
    assert_eq!(doc.output("out").unwrap().version(), 0);
}

#[test]
fn test_unknown_output_id_is_ignored() {
    let mut doc = running_cell("a");

    let changed = doc
        .apply(vec![
            CellEdit::append_output_items("nope", vec![OutputItem::stdout("x")]),
            CellEdit::append_output_items("out", vec![OutputItem::stdout("b")]),
        ])
        .unwrap();

    assert!(changed);
    assert_eq!(text(&doc), vec!["ab"]);
}

#[test]
fn test_full_output_replace_discards_reused_ids() {
    let mut doc = running_cell("a");
    append(&mut doc, vec![OutputItem::stdout("b")]);

    doc.apply(vec![CellEdit::set_outputs(
        0,
        vec![OutputData::new("out", vec![OutputItem::stdout("new")])],
    )])
    .unwrap();

    let output = doc.output("out").unwrap();
    assert_eq!(output.version(), 0);
    assert_eq!(text(&doc), vec!["new"]);
    assert_eq!(doc.appended_since_version("out", 0, STDOUT_MIME), None);
}

#[test]
fn test_output_append_pushes_without_merging() {
    let mut doc = running_cell("a");
    let handle = doc.handles()[0];
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _subscription =
        doc.on_did_change_content(move |event| sink.lock().unwrap().extend(event.raw_events.clone()));

    doc.apply(vec![CellEdit::Output {
        target: CellTarget::Handle(handle),
        outputs: vec![OutputData::new("out-2", vec![OutputItem::stdout("b")])],
        append: true,
    }])
    .unwrap();

    let cell = doc.cell(0).unwrap();
    assert_eq!(cell.outputs().len(), 2);
    assert_eq!(cell.outputs()[1].output_id(), "out-2");
    assert_eq!(
        events.lock().unwrap().clone(),
        vec![RawContentChange::Output {
            index: 0,
            handle,
            append: true,
            output_ids: vec!["out-2".to_string()],
        }]
    );
}
