//! Transaction manager.

use crate::error::{RvmError, RvmResult};
use crate::log::{CommitLog, RangeRecord};
use crate::segment::SegmentDirectory;
use crate::transaction::state::Transaction;
use crate::types::{SegmentHandle, TransactionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    /// The committed transaction.
    pub tid: TransactionId,
    /// Number of redo records appended to the log.
    pub records: usize,
    /// Payload bytes appended to the log.
    pub bytes: u64,
    /// Log offset of the first record, `None` for an empty commit.
    pub log_offset: Option<u64>,
}

/// Tracks active transactions and their undo/redo records.
///
/// The manager does not own segments or the log; both are passed in by the
/// caller, which is expected to hold them under a single lock for the
/// duration of each call.
///
/// ## Single Writer per Segment
///
/// `begin` fails if any requested segment is already owned, and it checks
/// every segment before taking any, so a failed `begin` leaves ownership
/// untouched.
pub struct TransactionManager {
    next_tid: AtomicU64,
    active: HashMap<TransactionId, Transaction>,
}

impl TransactionManager {
    /// Creates a manager whose first transaction ID is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_tid: AtomicU64::new(1),
            active: HashMap::new(),
        }
    }

    /// Begins a transaction over `handles`.
    ///
    /// Takes a full-segment undo snapshot of every segment. Duplicate handles
    /// are collapsed.
    ///
    /// # Errors
    ///
    /// - `SegmentNotFound` if a handle does not resolve
    /// - `TransactionSegmentConflict` if a segment is already owned
    pub fn begin(
        &mut self,
        segments: &mut SegmentDirectory,
        handles: &[SegmentHandle],
    ) -> RvmResult<TransactionId> {
        let mut unique: Vec<SegmentHandle> = Vec::with_capacity(handles.len());
        for &handle in handles {
            let segment = segments.resolve(handle)?;
            if let Some(owner) = segment.owner() {
                return Err(RvmError::TransactionSegmentConflict {
                    name: segment.name().to_string(),
                    owner,
                });
            }
            if !unique.contains(&handle) {
                unique.push(handle);
            }
        }

        let tid = TransactionId::new(self.next_tid.fetch_add(1, Ordering::SeqCst)).ok_or_else(
            || {
                RvmError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "transaction id space exhausted",
                ))
            },
        )?;

        let mut txn = Transaction::new(tid, unique.clone());
        for handle in unique {
            let segment = segments.resolve_mut(handle)?;
            segment.set_owner(Some(tid));
            let snapshot = segment.buffer().as_slice().to_vec();
            txn.push_undo(handle, RangeRecord::undo(tid, segment.name(), 0, snapshot));
        }

        self.active.insert(tid, txn);
        Ok(tid)
    }

    /// Declares that `[offset, offset + len)` of `handle` is about to change.
    ///
    /// Returns `false`, capturing nothing, if the transaction is not active,
    /// the handle does not resolve, the segment is not owned by `tid`, or the
    /// range exceeds the segment.
    pub fn about_to_modify(
        &mut self,
        segments: &SegmentDirectory,
        tid: TransactionId,
        handle: SegmentHandle,
        offset: u64,
        len: u64,
    ) -> bool {
        let Some(txn) = self.active.get_mut(&tid) else {
            tracing::warn!(%tid, "about_to_modify ignored: transaction not active");
            return false;
        };
        let Some(segment) = segments.get(handle) else {
            tracing::warn!(%tid, %handle, "about_to_modify ignored: segment not mapped");
            return false;
        };
        if segment.owner() != Some(tid) {
            tracing::warn!(
                %tid,
                segment = segment.name(),
                "about_to_modify ignored: segment not owned by transaction"
            );
            return false;
        }
        let Ok(before) = segment.buffer().snapshot(offset, len) else {
            tracing::warn!(
                %tid,
                segment = segment.name(),
                offset,
                len,
                size = segment.size(),
                "about_to_modify ignored: range out of bounds"
            );
            return false;
        };

        txn.push_redo(handle, RangeRecord::redo(tid, segment.name(), offset, before));
        true
    }

    /// Commits a transaction.
    ///
    /// Every declared range is re-read from the segment so the log receives
    /// its final bytes. The records are appended to `log` before ownership is
    /// released. On error the transaction stays active and can be aborted,
    /// except for `LogTrimFailed`, after which it is treated as committed.
    ///
    /// # Errors
    ///
    /// - `TransactionNotFound` if `tid` is not active
    /// - `CommitWithNoChanges` if `strict_empty` and nothing was declared
    /// - `LogTrimFailed` if a failed append could not be removed from the log
    /// - Storage errors from the log append
    pub fn commit(
        &mut self,
        segments: &mut SegmentDirectory,
        log: &mut CommitLog,
        tid: TransactionId,
        strict_empty: bool,
    ) -> RvmResult<CommitSummary> {
        let txn = self
            .active
            .get(&tid)
            .ok_or(RvmError::TransactionNotFound { tid })?;

        if strict_empty && txn.modify_count() == 0 {
            return Err(RvmError::CommitWithNoChanges { tid });
        }

        let mut records = Vec::with_capacity(txn.modify_count());
        for range in txn.redo_ranges() {
            let segment = segments.resolve(range.handle)?;
            let after = segment
                .buffer()
                .snapshot(range.record.offset, range.record.len())?;
            records.push(RangeRecord::redo(
                tid,
                &range.record.segment,
                range.record.offset,
                after,
            ));
        }

        let log_offset = match log.append_transaction(&records) {
            Ok(offset) => offset,
            Err(e @ RvmError::LogTrimFailed { .. }) => {
                // The records may be durable, so undoing them in memory would
                // diverge from recovery.
                self.active.remove(&tid);
                segments.release_owner(tid);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.active.remove(&tid);
        segments.release_owner(tid);

        Ok(CommitSummary {
            tid,
            records: records.len(),
            bytes: records.iter().map(RangeRecord::len).sum(),
            log_offset,
        })
    }

    /// Aborts a transaction, restoring every owned segment from its undo
    /// snapshot and discarding all declared ranges.
    ///
    /// Returns the number of segments restored.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound` if `tid` is not active.
    pub fn abort(&mut self, segments: &mut SegmentDirectory, tid: TransactionId) -> RvmResult<usize> {
        let txn = self
            .active
            .remove(&tid)
            .ok_or(RvmError::TransactionNotFound { tid })?;

        let mut restored = 0;
        for range in txn.into_undo() {
            if let Some(segment) = segments.get_mut(range.handle) {
                segment
                    .buffer_mut()
                    .restore(range.record.offset, &range.record.payload)?;
                restored += 1;
            }
        }
        segments.release_owner(tid);

        Ok(restored)
    }

    /// Returns the active transaction with this ID.
    #[must_use]
    pub fn get(&self, tid: TransactionId) -> Option<&Transaction> {
        self.active.get(&tid)
    }

    /// Returns true if `tid` is active.
    #[must_use]
    pub fn is_active(&self, tid: TransactionId) -> bool {
        self.active.contains_key(&tid)
    }

    /// Returns the number of active transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("next_tid", &self.next_tid.load(Ordering::SeqCst))
            .field("active_count", &self.active_count())
            .finish()
    }
}
