use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use notebook_core::{CellData, CellEdit, NotebookDocument, OutputData, OutputItem, compute_edits};

fn large_notebook(cell_count: usize) -> Vec<CellData> {
    (0..cell_count)
        .map(|i| {
            if i % 5 == 0 {
                CellData::markup(format!("## Section {i}\nSome prose for cell {i}."))
            } else {
                CellData::code(format!("x_{i} = compute({i})\nprint(x_{i})"), "python")
                    .with_outputs(vec![OutputData::new(
                        format!("out-{i}"),
                        vec![OutputItem::stdout(&format!("{i}\n"))],
                    )])
            }
        })
        .collect()
}

fn bench_open_large_notebook(c: &mut Criterion) {
    let cells = large_notebook(5_000);
    c.bench_function("open/5k_cells", |b| {
        b.iter_batched(
            || cells.clone(),
            |cells| {
                let doc = NotebookDocument::new(cells);
                black_box(doc.cell_count());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_streaming_appends(c: &mut Criterion) {
    c.bench_function("stream/1k_appends", |b| {
        b.iter_batched(
            || NotebookDocument::new(large_notebook(10)),
            |mut doc| {
                for i in 0..1_000 {
                    let chunk = if i % 10 == 0 {
                        format!("\rprogress {i}")
                    } else {
                        format!("line {i}\n")
                    };
                    doc.apply_edits(
                        vec![CellEdit::append_output_items("out-1", vec![OutputItem::stdout(&chunk)])],
                        false,
                        None,
                        None,
                        true,
                    )
                    .unwrap();
                }
                black_box(doc.version_id());
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_scattered_batch(c: &mut Criterion) {
    let cells = large_notebook(2_000);
    c.bench_function("batch/200_scattered_replaces", |b| {
        b.iter_batched(
            || NotebookDocument::new(cells.clone()),
            |mut doc| {
                let edits: Vec<CellEdit> = (0..200)
                    .rev()
                    .map(|i| CellEdit::Replace {
                        index: i * 10,
                        count: 1,
                        cells: vec![CellData::code(format!("y = {i}"), "python")],
                    })
                    .collect();
                doc.apply(edits).unwrap();
                black_box(doc.cell_count());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_compute_edits(c: &mut Criterion) {
    let cells = large_notebook(2_000);
    let doc = NotebookDocument::new(cells.clone());
    let mut target = cells;
    for (i, cell) in target.iter_mut().enumerate().step_by(7) {
        cell.source.push_str(&format!("\n# edited {i}"));
    }

    c.bench_function("diff/2k_cells", |b| {
        b.iter(|| black_box(compute_edits(&doc, black_box(&target), &[]).len()))
    });
}

fn bench_undo_redo(c: &mut Criterion) {
    c.bench_function("undo_redo/100_batches", |b| {
        b.iter_batched(
            || NotebookDocument::new(large_notebook(200)),
            |mut doc| {
                for i in 0..100 {
                    doc.apply(vec![CellEdit::delete(i % 50, 1)]).unwrap();
                }
                while doc.can_undo() {
                    doc.undo().unwrap();
                }
                while doc.can_redo() {
                    doc.redo().unwrap();
                }
                black_box(doc.cell_count());
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_open_large_notebook,
    bench_streaming_appends,
    bench_scattered_batch,
    bench_compute_edits,
    bench_undo_redo
);
criterion_main!(benches);
