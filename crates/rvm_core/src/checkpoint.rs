//! Log truncation (checkpoint).
//!
//! A checkpoint walks the commit log in order. For each record:
//!
//! - Already BACKED: dropped.
//! - Unbacked, targeting a segment in the target set: its payload is written
//!   into the segment's backing file, the file is synced, and the record is
//!   marked BACKED in place.
//! - Unbacked, targeting any other segment: copied unchanged into the
//!   compacted log.
//!
//! The compacted log is written to `.rvm.log.new` and renamed over the live
//! log once complete, so a crash at any point leaves either the old log or
//! the new one. Applying a record twice writes the same bytes twice, so
//! replaying a partially completed checkpoint is harmless.

use crate::dir::RvmDir;
use crate::error::RvmResult;
use crate::log::CommitLog;
use rvm_storage::{FileBackend, StorageBackend};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// Counts from one checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointStats {
    /// Records written into backing files.
    pub applied: usize,
    /// Records carried into the compacted log.
    pub carried: usize,
    /// Records dropped because they were already backed.
    pub dropped: usize,
}

impl CheckpointStats {
    /// Returns the number of records examined.
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied + self.carried + self.dropped
    }
}

/// Applies unbacked records for `targets` to their backing files and
/// compacts the log.
///
/// `sync` controls whether backing files and the compacted log are fsynced.
///
/// # Errors
///
/// Returns `LogCorruption` if a complete record fails its checksum, or an
/// I/O error. On error the live log is left in place.
pub fn truncate_log(
    dir: &RvmDir,
    log: &mut CommitLog,
    targets: &HashSet<String>,
    sync: bool,
) -> RvmResult<CheckpointStats> {
    let mut stats = CheckpointStats::default();
    let mut compacted = CommitLog::new(
        Box::new(FileBackend::create_truncated(&dir.compact_log_path())?),
        false,
    );
    let mut backing: HashMap<String, FileBackend> = HashMap::new();

    let mut cursor = log.cursor()?;
    while let Some((offset, record)) = log.read_next(&mut cursor)? {
        if record.backed {
            stats.dropped += 1;
            continue;
        }

        if !targets.contains(&record.segment) {
            compacted.append_raw(&record.encode()?)?;
            stats.carried += 1;
            continue;
        }

        let file = match backing.entry(record.segment.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let path = dir.segment_path(&record.segment);
                e.insert(FileBackend::open(&path)?)
            }
        };
        file.write_at(record.offset, &record.payload)?;
        file.flush()?;
        if sync {
            file.sync()?;
        }
        log.mark_backed(offset)?;
        stats.applied += 1;
    }

    if sync {
        compacted.sync()?;
    }
    drop(compacted);
    drop(backing);

    dir.replace_log()?;
    log.reopen(&dir.log_path())?;

    tracing::debug!(
        applied = stats.applied,
        carried = stats.carried,
        dropped = stats.dropped,
        "log truncated"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::RangeRecord;
    use crate::types::TransactionId;
    use tempfile::tempdir;

    fn tid(id: u64) -> TransactionId {
        TransactionId::new(id).unwrap()
    }

    fn targets(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    fn open(dir: &RvmDir) -> CommitLog {
        CommitLog::open(&dir.log_path(), false).unwrap()
    }

    #[test]
    fn applies_targets_and_carries_others() {
        let temp = tempdir().unwrap();
        let dir = RvmDir::open(temp.path(), true).unwrap();
        let mut log = open(&dir);

        log.append_transaction(&[
            RangeRecord::redo(tid(1), "A", 0, vec![1, 2, 3]),
            RangeRecord::redo(tid(1), "B", 4, vec![9, 9]),
        ])
        .unwrap();

        let stats = truncate_log(&dir, &mut log, &targets(&["A"]), true).unwrap();
        assert_eq!(
            stats,
            CheckpointStats {
                applied: 1,
                carried: 1,
                dropped: 0
            }
        );

        assert_eq!(std::fs::read(dir.segment_path("A")).unwrap(), vec![1, 2, 3]);
        assert!(!dir.segment_path("B").exists());
        assert!(!dir.compact_log_path().exists());

        let remaining = log.read_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].1.segment, "B");
        assert!(!remaining[0].1.backed);
    }

    #[test]
    fn later_records_win() {
        let temp = tempdir().unwrap();
        let dir = RvmDir::open(temp.path(), true).unwrap();
        let mut log = open(&dir);

        log.append_transaction(&[RangeRecord::redo(tid(1), "A", 2, vec![1, 1, 1])])
            .unwrap();
        log.append_transaction(&[RangeRecord::redo(tid(2), "A", 3, vec![7])])
            .unwrap();

        truncate_log(&dir, &mut log, &targets(&["A"]), false).unwrap();

        assert_eq!(
            std::fs::read(dir.segment_path("A")).unwrap(),
            vec![0, 0, 1, 7, 1]
        );
        assert_eq!(log.size().unwrap(), 0);
    }

    #[test]
    fn second_checkpoint_is_noop() {
        let temp = tempdir().unwrap();
        let dir = RvmDir::open(temp.path(), true).unwrap();
        let mut log = open(&dir);

        log.append_transaction(&[RangeRecord::redo(tid(1), "A", 0, vec![5; 8])])
            .unwrap();
        truncate_log(&dir, &mut log, &targets(&["A"]), true).unwrap();
        let before = std::fs::read(dir.segment_path("A")).unwrap();

        let stats = truncate_log(&dir, &mut log, &targets(&["A"]), true).unwrap();
        assert_eq!(stats.total(), 0);
        assert_eq!(std::fs::read(dir.segment_path("A")).unwrap(), before);
    }

    #[test]
    fn backed_records_are_dropped() {
        let temp = tempdir().unwrap();
        let dir = RvmDir::open(temp.path(), true).unwrap();
        let mut log = open(&dir);

        let offset = log
            .append_transaction(&[RangeRecord::redo(tid(1), "A", 0, vec![1])])
            .unwrap()
            .unwrap();
        log.mark_backed(offset).unwrap();

        let stats = truncate_log(&dir, &mut log, &targets(&[]), true).unwrap();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.carried, 0);
        assert_eq!(log.size().unwrap(), 0);
    }

    #[test]
    fn empty_log_stays_empty() {
        let temp = tempdir().unwrap();
        let dir = RvmDir::open(temp.path(), true).unwrap();
        let mut log = open(&dir);

        let stats = truncate_log(&dir, &mut log, &targets(&["A"]), true).unwrap();
        assert_eq!(stats, CheckpointStats::default());
        assert!(dir.log_path().exists());
    }
}
