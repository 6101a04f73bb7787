//! Commit log writer.

use crate::error::{RvmError, RvmResult};
use crate::log::reader::{LogCursor, LogIterator};
use crate::log::record::{RangeRecord, FLAGS_OFFSET, FLAG_BACKED};
use rvm_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Append-only commit log.
///
/// One call to [`CommitLog::append_transaction`] writes every redo record of
/// one transaction in a single append. The only in-place modification ever
/// made is [`CommitLog::mark_backed`].
pub struct CommitLog {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
}

impl CommitLog {
    /// Creates a commit log over an arbitrary backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend,
            sync_on_commit,
        }
    }

    /// Opens the log file at `path`, creating it empty if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path, sync_on_commit: bool) -> RvmResult<Self> {
        Ok(Self::new(Box::new(FileBackend::open(path)?), sync_on_commit))
    }

    /// Appends the redo records of one committed transaction.
    ///
    /// Returns the offset of the first record, or `None` if there was
    /// nothing to write.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be encoded or the write fails.
    /// Nothing is written if encoding fails. If the append, flush or sync
    /// fails, the log is trimmed back to its previous length. If that trim
    /// also fails, `LogTrimFailed` is returned and the records may still be
    /// in the log.
    pub fn append_transaction(&mut self, records: &[RangeRecord]) -> RvmResult<Option<u64>> {
        if records.is_empty() {
            return Ok(None);
        }

        let mut data = Vec::with_capacity(records.iter().map(RangeRecord::encoded_len).sum());
        for record in records {
            record.encode_into(&mut data)?;
        }

        let start = self.backend.size()?;
        let written = self
            .backend
            .append(&data)
            .and_then(|offset| {
                self.backend.flush()?;
                if self.sync_on_commit {
                    self.backend.sync()?;
                }
                Ok(offset)
            });
        let offset = match written {
            Ok(offset) => offset,
            Err(e) => {
                // The log must end on a record boundary, and a failed commit
                // must leave nothing behind.
                if let Err(trim) = self.backend.set_len(start) {
                    tracing::warn!(error = %trim, start, "failed to trim failed log append");
                    return Err(RvmError::LogTrimFailed {
                        offset: start,
                        message: format!("{e}; trim failed: {trim}"),
                    });
                }
                return Err(e.into());
            }
        };

        Ok(Some(offset))
    }

    /// Cuts a torn record off the end of the log.
    ///
    /// Returns the number of bytes removed. A complete record that fails
    /// validation is left in place for the checkpoint to report.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or truncated.
    pub fn trim_torn_tail(&mut self) -> RvmResult<u64> {
        let size = self.backend.size()?;
        let mut cursor = LogCursor::new(0, size);
        loop {
            match cursor.next_record(self.backend.as_ref()) {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(RvmError::LogCorruption { offset, message }) => {
                    tracing::warn!(offset, %message, "commit log corrupted; leaving tail in place");
                    return Ok(0);
                }
                Err(e) => return Err(e),
            }
        }

        let end = cursor.offset();
        if end == size {
            return Ok(0);
        }
        tracing::warn!(end, size, "trimming torn record from end of commit log");
        self.backend.set_len(end)?;
        self.backend.sync()?;
        Ok(size - end)
    }

    /// Appends one already-encoded record verbatim.
    ///
    /// Used by the checkpoint to carry records into the compacted log.
    pub(crate) fn append_raw(&mut self, encoded: &[u8]) -> RvmResult<u64> {
        Ok(self.backend.append(encoded)?)
    }

    /// Sets the BACKED flag on the record starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flags byte cannot be read or rewritten.
    pub fn mark_backed(&mut self, offset: u64) -> RvmResult<()> {
        let at = offset + FLAGS_OFFSET;
        let current = self.backend.read_at(at, 1)?;
        let flags = current
            .first()
            .copied()
            .ok_or_else(|| RvmError::log_corruption(offset, "missing flags byte"))?;
        self.backend.write_at(at, &[flags | FLAG_BACKED])?;
        Ok(())
    }

    /// Returns a cursor spanning the whole log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be determined.
    pub fn cursor(&self) -> RvmResult<LogCursor> {
        Ok(LogCursor::new(0, self.backend.size()?))
    }

    /// Reads the record at `cursor` and advances it.
    ///
    /// # Errors
    ///
    /// See [`LogCursor::next_record`].
    pub fn read_next(&self, cursor: &mut LogCursor) -> RvmResult<Option<(u64, RangeRecord)>> {
        cursor.next_record(self.backend.as_ref())
    }

    /// Returns a streaming iterator over all records.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be determined.
    pub fn iter(&self) -> RvmResult<LogIterator<'_>> {
        LogIterator::new(self.backend.as_ref())
    }

    /// Reads every record into memory.
    ///
    /// Prefer [`Self::iter`] for large logs.
    pub fn read_all(&self) -> RvmResult<Vec<(u64, RangeRecord)>> {
        self.iter()?.collect()
    }

    /// Flushes and syncs the log.
    pub fn sync(&mut self) -> RvmResult<()> {
        self.backend.flush()?;
        self.backend.sync()?;
        Ok(())
    }

    /// Returns the log size in bytes.
    pub fn size(&self) -> RvmResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Reopens the log at `path` after the file has been replaced by
    /// compaction.
    pub fn reopen(&mut self, path: &Path) -> RvmResult<()> {
        self.backend = Box::new(FileBackend::open(path)?);
        Ok(())
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionId;
    use rvm_storage::InMemoryBackend;

    fn create_log() -> CommitLog {
        CommitLog::new(Box::new(InMemoryBackend::new()), false)
    }

    fn redo(tid: u64, name: &str, offset: u64, payload: &[u8]) -> RangeRecord {
        RangeRecord::redo(TransactionId::new(tid).unwrap(), name, offset, payload.to_vec())
    }

    #[test]
    fn append_and_read_transaction() {
        let mut log = create_log();
        let records = vec![redo(1, "A", 10, &[1, 2, 3, 4]), redo(1, "B", 0, &[5])];

        assert_eq!(log.append_transaction(&records).unwrap(), Some(0));

        let read: Vec<_> = log.read_all().unwrap().into_iter().map(|(_, r)| r).collect();
        assert_eq!(read, records);
    }

    #[test]
    fn empty_transaction_writes_nothing() {
        let mut log = create_log();
        assert_eq!(log.append_transaction(&[]).unwrap(), None);
        assert_eq!(log.size().unwrap(), 0);
    }

    #[test]
    fn commit_order_is_log_order() {
        let mut log = create_log();
        log.append_transaction(&[redo(1, "A", 0, &[1])]).unwrap();
        let second = log.append_transaction(&[redo(2, "A", 0, &[2])]).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].0, second.unwrap());
        assert_eq!(all[0].1.tid.as_u64(), 1);
        assert_eq!(all[1].1.tid.as_u64(), 2);
    }

    #[test]
    fn mark_backed_flips_only_target_record() {
        let mut log = create_log();
        log.append_transaction(&[redo(1, "A", 0, &[1]), redo(1, "A", 1, &[2])])
            .unwrap();

        let offsets: Vec<u64> = log.read_all().unwrap().iter().map(|(o, _)| *o).collect();
        log.mark_backed(offsets[1]).unwrap();

        let all = log.read_all().unwrap();
        assert!(!all[0].1.backed);
        assert!(all[1].1.backed);
        assert_eq!(all[1].1.payload, vec![2]);
    }

    #[test]
    fn undo_record_rejected_without_partial_write() {
        let mut log = create_log();
        let undo = RangeRecord::undo(TransactionId::new(1).unwrap(), "A", 0, vec![0]);

        assert!(log
            .append_transaction(&[redo(1, "A", 0, &[1]), undo])
            .is_err());
        assert_eq!(log.size().unwrap(), 0);
    }

    #[test]
    fn cursor_allows_patching_between_reads() {
        let mut log = create_log();
        log.append_transaction(&[redo(1, "A", 0, &[1]), redo(1, "A", 1, &[2])])
            .unwrap();

        let mut cursor = log.cursor().unwrap();
        while let Some((offset, _)) = log.read_next(&mut cursor).unwrap() {
            log.mark_backed(offset).unwrap();
        }

        assert!(log.read_all().unwrap().iter().all(|(_, r)| r.backed));
    }

    #[test]
    fn trim_torn_tail_cuts_partial_record() {
        let mut log = create_log();
        log.append_transaction(&[redo(1, "A", 0, &[1, 2])]).unwrap();
        let good = log.size().unwrap();

        let mut torn = Vec::new();
        redo(2, "A", 0, &[3, 4]).encode_into(&mut torn).unwrap();
        log.append_raw(&torn[..20]).unwrap();

        assert_eq!(log.trim_torn_tail().unwrap(), 20);
        assert_eq!(log.size().unwrap(), good);

        log.append_transaction(&[redo(3, "A", 0, &[5])]).unwrap();
        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].1.tid.as_u64(), 3);
    }

    #[test]
    fn trim_torn_tail_leaves_clean_log_alone() {
        let mut log = create_log();
        assert_eq!(log.trim_torn_tail().unwrap(), 0);
        log.append_transaction(&[redo(1, "A", 0, &[1])]).unwrap();
        assert_eq!(log.trim_torn_tail().unwrap(), 0);
        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn trim_torn_tail_keeps_corrupted_record() {
        let mut log = create_log();
        let mut record = Vec::new();
        redo(1, "A", 0, &[1, 2]).encode_into(&mut record).unwrap();
        let last = record.len() - 1;
        record[last] ^= 0xFF;
        log.append_raw(&record).unwrap();

        assert_eq!(log.trim_torn_tail().unwrap(), 0);
        assert_eq!(log.size().unwrap(), record.len() as u64);
        assert!(log.read_all().is_err());
    }
}
