//! Per-cell source storage.
//!
//! The document never stores cell text itself. Each cell owns a [`SourceBuffer`] created by
//! the document's [`SourceBufferFactory`]; hosts that already manage text models plug in their
//! own buffers, everyone else gets a [`RopeSourceBuffer`].
//!
//! When a cell is deleted the document calls [`SourceBuffer::release`] right after the
//! will-add/remove notification and before the handle becomes invalid.

use crate::cell::CellHandle;
use ropey::Rope;
use std::ops::Range;

/// Text storage for one cell.
pub trait SourceBuffer: Send {
    /// Full text of the buffer.
    fn text(&self) -> String;

    /// Monotonic version of the buffer content.
    fn version_id(&self) -> u64;

    /// Replace the whole content.
    fn set_text(&mut self, text: &str);

    /// Release resources held for the cell. Called once when the cell is deleted.
    fn release(&mut self) {}
}

/// Creates the source buffer for a newly created (or restored) cell.
pub type SourceBufferFactory = Box<dyn Fn(CellHandle, &str) -> Box<dyn SourceBuffer> + Send>;

/// Factory producing [`RopeSourceBuffer`]s.
pub fn rope_buffer_factory() -> SourceBufferFactory {
    Box::new(|_handle, text| Box::new(RopeSourceBuffer::new(text)))
}

/// Rope-backed source buffer.
#[derive(Debug, Clone)]
pub struct RopeSourceBuffer {
    rope: Rope,
    version: u64,
    released: bool,
}

impl RopeSourceBuffer {
    /// Create a buffer holding `text`.
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            version: 0,
            released: false,
        }
    }

    /// Number of characters.
    pub fn char_count(&self) -> usize {
        self.rope.len_chars()
    }

    /// Number of lines (an empty buffer has one line).
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Insert `text` at a character offset. Offsets past the end are clamped.
    pub fn insert(&mut self, char_offset: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        let offset = char_offset.min(self.rope.len_chars());
        self.rope.insert(offset, text);
        self.version += 1;
    }

    /// Remove a character range. The range is clamped to the buffer.
    pub fn remove(&mut self, range: Range<usize>) {
        let len = self.rope.len_chars();
        let start = range.start.min(len);
        let end = range.end.min(len);
        if start >= end {
            return;
        }
        self.rope.remove(start..end);
        self.version += 1;
    }

    /// Whether [`SourceBuffer::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl SourceBuffer for RopeSourceBuffer {
    fn text(&self) -> String {
        self.rope.to_string()
    }

    fn version_id(&self) -> u64 {
        self.version
    }

    fn set_text(&mut self, text: &str) {
        self.rope = Rope::from_str(text);
        self.version += 1;
    }

    fn release(&mut self) {
        self.released = true;
        self.rope = Rope::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rope_buffer_edits_bump_version() {
        let mut buffer = RopeSourceBuffer::new("print(1)\n");
        assert_eq!(buffer.version_id(), 0);
        assert_eq!(buffer.line_count(), 2);

        buffer.insert(0, "# hi\n");
        assert_eq!(buffer.text(), "# hi\nprint(1)\n");
        assert_eq!(buffer.version_id(), 1);

        buffer.remove(0..5);
        assert_eq!(buffer.text(), "print(1)\n");
        assert_eq!(buffer.version_id(), 2);

        // Empty edits are not versioned.
        buffer.insert(3, "");
        buffer.remove(4..4);
        assert_eq!(buffer.version_id(), 2);
    }

    #[test]
    fn test_release_drops_content() {
        let mut buffer = RopeSourceBuffer::new("x = 1");
        buffer.release();
        assert!(buffer.is_released());
        assert_eq!(buffer.char_count(), 0);
    }
}
