//! Transaction state.

use crate::log::RangeRecord;
use crate::types::{SegmentHandle, TransactionId};

/// A range record together with the segment it was captured from.
#[derive(Debug, Clone)]
pub(crate) struct TrackedRange {
    pub handle: SegmentHandle,
    pub record: RangeRecord,
}

/// An active transaction.
///
/// A transaction exists only while it is active. Commit and abort consume it,
/// so a finished transaction cannot be reused.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    segments: Vec<SegmentHandle>,
    undo: Vec<TrackedRange>,
    redo: Vec<TrackedRange>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, segments: Vec<SegmentHandle>) -> Self {
        Self {
            id,
            segments,
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the segments locked by this transaction.
    #[must_use]
    pub fn segments(&self) -> &[SegmentHandle] {
        &self.segments
    }

    /// Returns the number of declared modify ranges.
    #[must_use]
    pub fn modify_count(&self) -> usize {
        self.redo.len()
    }

    /// Returns the total bytes held in undo snapshots.
    #[must_use]
    pub fn undo_bytes(&self) -> usize {
        self.undo.iter().map(|r| r.record.payload.len()).sum()
    }

    pub(crate) fn push_undo(&mut self, handle: SegmentHandle, record: RangeRecord) {
        debug_assert!(record.is_undo());
        self.undo.push(TrackedRange { handle, record });
    }

    pub(crate) fn push_redo(&mut self, handle: SegmentHandle, record: RangeRecord) {
        debug_assert!(!record.is_undo());
        self.redo.push(TrackedRange { handle, record });
    }

    pub(crate) fn redo_ranges(&self) -> &[TrackedRange] {
        &self.redo
    }

    pub(crate) fn into_undo(self) -> Vec<TrackedRange> {
        self.undo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(slot: u32) -> SegmentHandle {
        SegmentHandle {
            slot,
            generation: 0,
        }
    }

    #[test]
    fn tracks_undo_and_redo_separately() {
        let tid = TransactionId::new(1).unwrap();
        let mut txn = Transaction::new(tid, vec![handle(0)]);

        txn.push_undo(handle(0), RangeRecord::undo(tid, "A", 0, vec![0; 100]));
        txn.push_redo(handle(0), RangeRecord::redo(tid, "A", 10, vec![0; 4]));
        txn.push_redo(handle(0), RangeRecord::redo(tid, "A", 20, vec![0; 2]));

        assert_eq!(txn.id(), tid);
        assert_eq!(txn.segments(), &[handle(0)]);
        assert_eq!(txn.modify_count(), 2);
        assert_eq!(txn.undo_bytes(), 100);
        assert_eq!(txn.redo_ranges()[1].record.offset, 20);
        assert_eq!(txn.into_undo().len(), 1);
    }
}
