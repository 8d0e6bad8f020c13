//! Cell outputs and the output compactor.
//!
//! # Overview
//!
//! A [`CellOutput`] is a named bundle of mime-tagged [`OutputItem`]s. Besides the items it
//! keeps a version counter and, for streaming mimes, byte-length marks recorded at past
//! versions. The marks let renderers that already hold the content of version `v` fetch only
//! what was appended since ([`CellOutput::appended_since_version`]) instead of the full item.
//!
//! Appending a streaming item to an output whose last item has the same mime merges the bytes
//! (see [`crate::stream`]). Merges that discard existing bytes invalidate every mark, because
//! old lengths no longer describe a prefix of the current content.

use crate::cell::Metadata;
use crate::stream::merge_stream;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Mime of process standard output.
pub const STDOUT_MIME: &str = "application/vnd.code.notebook.stdout";
/// Mime of process standard error.
pub const STDERR_MIME: &str = "application/vnd.code.notebook.stderr";

/// Whether `mime` belongs to the (closed) set of streaming text mimes.
pub fn is_stream_mime(mime: &str) -> bool {
    mime == STDOUT_MIME || mime == STDERR_MIME
}

/// One mime-tagged payload of an output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputItem {
    /// Mime type.
    pub mime: String,
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl OutputItem {
    /// Create an item from raw bytes.
    pub fn new(mime: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime: mime.into(),
            data: data.into(),
        }
    }

    /// Create a standard output item.
    pub fn stdout(text: &str) -> Self {
        Self::new(STDOUT_MIME, text)
    }

    /// Create a standard error item.
    pub fn stderr(text: &str) -> Self {
        Self::new(STDERR_MIME, text)
    }

    /// Payload decoded as UTF-8 (lossy).
    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

impl fmt::Debug for OutputItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputItem")
            .field("mime", &self.mime)
            .field("data", &self.as_text())
            .finish()
    }
}

/// Plain description of an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    /// Identifier, unique across the document while the output is live.
    pub output_id: String,
    /// Items in display order.
    pub items: Vec<OutputItem>,
    /// Output metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl OutputData {
    /// Create an output description without metadata.
    pub fn new(output_id: impl Into<String>, items: Vec<OutputItem>) -> Self {
        Self {
            output_id: output_id.into(),
            items,
            metadata: Metadata::new(),
        }
    }
}

/// A live output attached to a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellOutput {
    output_id: String,
    items: Vec<OutputItem>,
    metadata: Metadata,
    version: u64,
    /// mime -> (version -> length of the last item of that mime before the mutation at version).
    marks: BTreeMap<String, BTreeMap<u64, usize>>,
}

impl CellOutput {
    /// Create a live output at version 0.
    pub fn new(data: OutputData) -> Self {
        Self {
            output_id: data.output_id,
            items: data.items,
            metadata: data.metadata,
            version: 0,
            marks: BTreeMap::new(),
        }
    }

    /// Output id.
    pub fn output_id(&self) -> &str {
        &self.output_id
    }

    /// Items in display order.
    pub fn items(&self) -> &[OutputItem] {
        &self.items
    }

    /// Output metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Number of item mutations applied since creation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Describe this output as plain [`OutputData`].
    pub fn to_data(&self) -> OutputData {
        OutputData {
            output_id: self.output_id.clone(),
            items: self.items.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Whether this output holds exactly the content described by `data`.
    pub fn matches(&self, data: &OutputData) -> bool {
        self.output_id == data.output_id && self.items == data.items && self.metadata == data.metadata
    }

    /// Replace all items. Always counts as a mutation and clears the append history.
    pub fn replace_items(&mut self, items: Vec<OutputItem>) {
        self.items = items;
        self.marks.clear();
        self.version += 1;
    }

    /// Append items, merging streaming text into the last item when the mimes match.
    ///
    /// Returns `false` (and leaves the version untouched) when `items` is empty.
    pub fn append_items(&mut self, items: Vec<OutputItem>) -> bool {
        if items.is_empty() {
            return false;
        }

        let version = self.version;
        self.record_marks(version);

        let mut compressed = false;
        for item in items {
            match self.items.last_mut() {
                Some(last) if is_stream_mime(&item.mime) && last.mime == item.mime => {
                    compressed |= merge_stream(&mut last.data, &item.data);
                }
                _ => {
                    if is_stream_mime(&item.mime) {
                        // Marks for this mime described an earlier item; the new one starts empty.
                        self.marks
                            .insert(item.mime.clone(), BTreeMap::from([(version, 0)]));
                    }
                    self.items.push(item);
                }
            }
        }

        if compressed {
            tracing::trace!(
                output_id = %self.output_id,
                version,
                "stream output compressed, append history invalidated"
            );
            self.marks.clear();
        }
        self.version += 1;
        true
    }

    /// Bytes appended to the streaming item of `mime` since `version`.
    ///
    /// Returns `None` when the history cannot answer: `version` is not older than the current
    /// version, no append of that mime was recorded at `version`, or the history was
    /// invalidated by a replace or a compressing merge. Callers must then re-fetch the item.
    ///
    /// `Some` with an empty slice is a valid answer: the history is intact and nothing of that
    /// mime was appended since `version` (for example when only another mime grew).
    pub fn appended_since_version(&self, version: u64, mime: &str) -> Option<&[u8]> {
        if version >= self.version {
            return None;
        }
        let mark = *self.marks.get(mime)?.get(&version)?;
        let item = self.items.iter().rev().find(|item| item.mime == mime)?;
        item.data.get(mark..)
    }

    fn record_marks(&mut self, version: u64) {
        let mut lengths: Vec<(String, usize)> = Vec::new();
        for item in self.items.iter().rev() {
            if is_stream_mime(&item.mime) && !lengths.iter().any(|(mime, _)| *mime == item.mime) {
                lengths.push((item.mime.clone(), item.data.len()));
            }
        }
        for (mime, len) in lengths {
            self.marks.entry(mime).or_default().insert(version, len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdout_output(text: &str) -> CellOutput {
        CellOutput::new(OutputData::new("out", vec![OutputItem::stdout(text)]))
    }

    #[test]
    fn test_stream_appends_collapse_into_one_item() {
        let mut output = stdout_output("foo");
        assert!(output.append_items(vec![OutputItem::stdout("bar")]));
        assert!(output.append_items(vec![OutputItem::stdout("baz")]));

        assert_eq!(output.items().len(), 1);
        assert_eq!(output.items()[0].as_text(), "foobarbaz");
        assert_eq!(output.version(), 2);
        assert_eq!(
            output.appended_since_version(0, STDOUT_MIME),
            Some(&b"barbaz"[..])
        );
        assert_eq!(
            output.appended_since_version(1, STDOUT_MIME),
            Some(&b"baz"[..])
        );
        assert_eq!(output.appended_since_version(2, STDOUT_MIME), None);
    }

    #[test]
    fn test_compression_invalidates_history() {
        let mut output = stdout_output("append 1\nappend 1");
        output.append_items(vec![OutputItem::stdout("\x1b[A\nappend 2")]);

        assert_eq!(output.items().len(), 1);
        assert_eq!(output.items()[0].as_text(), "append 1\nappend 2");
        assert_eq!(output.version(), 1);
        assert_eq!(output.appended_since_version(0, STDOUT_MIME), None);

        // History restarts after the compressing version.
        output.append_items(vec![OutputItem::stdout("\nappend 3")]);
        assert_eq!(
            output.appended_since_version(1, STDOUT_MIME),
            Some(&b"\nappend 3"[..])
        );
    }

    #[test]
    fn test_replace_clears_history_and_bumps_version() {
        let mut output = stdout_output("a");
        output.append_items(vec![OutputItem::stdout("b")]);
        output.replace_items(vec![OutputItem::stdout("fresh")]);

        assert_eq!(output.version(), 2);
        assert_eq!(output.appended_since_version(0, STDOUT_MIME), None);
        assert_eq!(output.appended_since_version(1, STDOUT_MIME), None);
    }

    #[test]
    fn test_different_mimes_stay_distinct() {
        let mut output = stdout_output("out");
        output.append_items(vec![
            OutputItem::stderr("err"),
            OutputItem::new("text/plain", "x"),
            OutputItem::new("text/plain", "y"),
        ]);

        let mimes: Vec<&str> = output.items().iter().map(|i| i.mime.as_str()).collect();
        assert_eq!(mimes, vec![STDOUT_MIME, STDERR_MIME, "text/plain", "text/plain"]);
    }

    #[test]
    fn test_history_tracks_untouched_stream_mimes() {
        let mut output = CellOutput::new(OutputData::new(
            "o",
            vec![OutputItem::stdout("a"), OutputItem::stderr("e")],
        ));
        output.append_items(vec![OutputItem::stderr("rr")]);

        assert_eq!(output.appended_since_version(0, STDERR_MIME), Some(&b"rr"[..]));
        assert_eq!(output.appended_since_version(0, STDOUT_MIME), Some(&b""[..]));
    }

    #[test]
    fn test_new_distinct_stream_item_drops_old_marks() {
        let mut output = stdout_output("a");
        output.append_items(vec![OutputItem::stderr("e")]);
        output.append_items(vec![OutputItem::stdout("b")]);

        assert_eq!(output.items().len(), 3);
        assert_eq!(output.appended_since_version(1, STDOUT_MIME), Some(&b"b"[..]));
        assert_eq!(output.appended_since_version(0, STDOUT_MIME), None);
    }

    #[test]
    fn test_first_stream_item_history_starts_at_append() {
        let mut output = CellOutput::new(OutputData::new("o", Vec::new()));
        output.append_items(vec![OutputItem::stdout("foo")]);
        output.append_items(vec![OutputItem::stdout("bar")]);

        assert_eq!(output.appended_since_version(0, STDOUT_MIME), Some(&b"foobar"[..]));
        assert_eq!(output.appended_since_version(1, STDOUT_MIME), Some(&b"bar"[..]));
    }

    #[test]
    fn test_empty_append_is_not_a_mutation() {
        let mut output = stdout_output("a");
        assert!(!output.append_items(Vec::new()));
        assert_eq!(output.version(), 0);
    }
}
