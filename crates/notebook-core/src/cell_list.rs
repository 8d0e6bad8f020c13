//! Ordered cell storage.
//!
//! Cells live in a plain vector; a cell's index is its position and nothing else. Handles are
//! allocated here from a counter that only grows.
//!
//! Batches address cells by their index *before* the batch. [`SpliceTracker`] translates those
//! pre-batch indices into current positions while splices are applied in ascending order.

use crate::cell::{Cell, CellHandle};

/// Ordered list of live cells.
#[derive(Debug, Default)]
pub struct CellList {
    cells: Vec<Cell>,
    next_handle: u64,
}

impl CellList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell at `index`.
    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Cell> {
        self.cells.get_mut(index)
    }

    /// Current index of `handle`.
    pub fn index_of(&self, handle: CellHandle) -> Option<usize> {
        self.cells.iter().position(|cell| cell.handle() == handle)
    }

    /// Iterate cells in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Cell> {
        self.cells.iter()
    }

    /// Handles in order.
    pub fn handles(&self) -> Vec<CellHandle> {
        self.cells.iter().map(Cell::handle).collect()
    }

    /// Locate an output by id: `(cell index, output index)`.
    pub fn find_output(&self, output_id: &str) -> Option<(usize, usize)> {
        self.cells.iter().enumerate().find_map(|(cell_index, cell)| {
            cell.outputs()
                .iter()
                .position(|output| output.output_id() == output_id)
                .map(|output_index| (cell_index, output_index))
        })
    }

    pub(crate) fn allocate_handle(&mut self) -> CellHandle {
        let handle = CellHandle::new(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Make sure future allocations never collide with `handle` (used when cells come back
    /// from undo history).
    pub(crate) fn reserve_handle(&mut self, handle: CellHandle) {
        self.next_handle = self.next_handle.max(handle.get() + 1);
    }

    /// Remove `count` cells at `index` and insert `inserted` in their place.
    ///
    /// Callers validate the range beforehand.
    pub(crate) fn splice(&mut self, index: usize, count: usize, inserted: Vec<Cell>) -> Vec<Cell> {
        self.cells.splice(index..index + count, inserted).collect()
    }
}

impl<'a> IntoIterator for &'a CellList {
    type Item = &'a Cell;
    type IntoIter = std::slice::Iter<'a, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

#[derive(Debug, Clone, Copy)]
struct AppliedSplice {
    index: usize,
    deleted: usize,
    inserted: usize,
}

/// Maps pre-batch indices to current positions.
///
/// Splices must be recorded in ascending order of their pre-batch index.
#[derive(Debug, Default)]
pub(crate) struct SpliceTracker {
    applied: Vec<AppliedSplice>,
}

impl SpliceTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Current position of pre-batch index `original`.
    ///
    /// An index inside an already deleted range maps to the end of whatever replaced it.
    pub(crate) fn position(&self, original: usize) -> usize {
        let mut position = original;
        for splice in &self.applied {
            if splice.index > original {
                continue;
            }
            let deleted_before = splice.deleted.min(original - splice.index);
            position = position + splice.inserted - deleted_before;
        }
        position
    }

    /// Whether the pre-batch cell at `original` was deleted by a recorded splice.
    pub(crate) fn is_deleted(&self, original: usize) -> bool {
        self.applied
            .iter()
            .any(|s| s.index <= original && original < s.index + s.deleted)
    }

    pub(crate) fn record(&mut self, index: usize, deleted: usize, inserted: usize) {
        self.applied.push(AppliedSplice {
            index,
            deleted,
            inserted,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_after_delete_then_insert_at_same_index() {
        let mut tracker = SpliceTracker::new();
        tracker.record(1, 1, 0);
        assert_eq!(tracker.position(1), 1);
        assert_eq!(tracker.position(2), 1);
        assert_eq!(tracker.position(5), 4);
        assert!(tracker.is_deleted(1));
        assert!(!tracker.is_deleted(2));
    }

    #[test]
    fn test_position_after_inserts() {
        let mut tracker = SpliceTracker::new();
        tracker.record(0, 0, 2);
        tracker.record(3, 2, 1);
        assert_eq!(tracker.position(0), 2);
        assert_eq!(tracker.position(3), 6);
        assert_eq!(tracker.position(4), 6);
        assert_eq!(tracker.position(5), 6);
        assert_eq!(tracker.position(7), 8);
    }

    #[test]
    fn test_handles_are_never_reused() {
        let mut list = CellList::new();
        let a = list.allocate_handle();
        let b = list.allocate_handle();
        assert_ne!(a, b);

        list.reserve_handle(CellHandle::new(10));
        assert_eq!(list.allocate_handle().get(), 11);
        list.reserve_handle(CellHandle::new(3));
        assert_eq!(list.allocate_handle().get(), 12);
    }
}
