//! Crash simulation for RVM.
//!
//! A crash can leave the directory in a few distinct states, each of which
//! recovery has to handle:
//!
//! 1. **Torn append** - the last log record is cut short
//! 2. **Crash mid-checkpoint** - some records are BACKED, `.rvm.log.new` exists
//! 3. **Failed append** - the commit errors, the log is trimmed back and the
//!    transaction stays active
//!
//! The free functions here damage files directly and are meant to be called
//! from [`TestRvm::reopen_with`](crate::TestRvm::reopen_with) while no
//! instance holds the directory lock. [`CrashableBackend`] injects write
//! failures underneath a [`CommitLog`](rvm_core::CommitLog).

use rvm_core::{log_path_in, RangeRecord, TransactionId};
use rvm_storage::{FileBackend, StorageBackend, StorageError, StorageResult};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Returns a redo record for `segment`.
pub fn redo_record(tid: u64, segment: &str, offset: u64, payload: Vec<u8>) -> RangeRecord {
    let tid = TransactionId::new(tid).expect("transaction ids are non-zero");
    RangeRecord::redo(tid, segment, offset, payload)
}

/// Appends an encoded record to the commit log in `dir`.
///
/// Returns the record's log offset.
pub fn append_raw_record(dir: &Path, record: &RangeRecord) -> u64 {
    let encoded = record.encode().expect("record encodes");
    let mut log = FileBackend::open(&log_path_in(dir)).expect("open log");
    let offset = log.append(&encoded).expect("append record");
    log.sync().expect("sync log");
    offset
}

/// Appends the first `keep` bytes of `record`'s encoding, as a crash in the
/// middle of an append would.
pub fn append_torn_tail(dir: &Path, record: &RangeRecord, keep: usize) {
    let encoded = record.encode().expect("record encodes");
    assert!(keep < encoded.len(), "a torn tail must be shorter than the record");
    let mut log = FileBackend::open(&log_path_in(dir)).expect("open log");
    log.append(&encoded[..keep]).expect("append torn tail");
    log.sync().expect("sync log");
}

/// Flips every bit of the byte at `offset` in `path`.
pub fn corrupt_byte(path: &Path, offset: u64) {
    let mut file = FileBackend::open_existing(path).expect("open file");
    let byte = file.read_at(offset, 1).expect("read byte")[0];
    file.write_at(offset, &[!byte]).expect("write byte");
    file.sync().expect("sync file");
}

/// A storage backend wrapper that can simulate crashes.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
    fail_on_set_len: AtomicBool,
}

impl CrashableBackend {
    /// Creates a new crashable backend wrapping an inner backend.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
            fail_on_set_len: AtomicBool::new(false),
        }
    }

    /// Fails any append that would take the total appended past `bytes`,
    /// writing the part that fits first.
    pub fn crash_after(&self, bytes: usize) {
        self.crash_after_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Sets whether flush and sync should fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Sets whether truncation should fail.
    pub fn set_fail_on_set_len(&self, fail: bool) {
        self.fail_on_set_len.store(fail, Ordering::SeqCst);
    }

    /// Resets the crash state.
    pub fn reset(&self) {
        self.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.bytes_written.store(0, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_on_sync.store(false, Ordering::SeqCst);
        self.fail_on_set_len.store(false, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    fn simulated(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let current = self.bytes_written.fetch_add(data.len(), Ordering::SeqCst);
        let threshold = self.crash_after_bytes.load(Ordering::SeqCst);

        if current >= threshold {
            return Err(self.simulated("append"));
        }
        if current + data.len() > threshold {
            let partial = threshold - current;
            self.inner.append(&data[..partial])?;
            return Err(self.simulated("partial append"));
        }

        self.inner.append(data)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.inner.write_at(offset, data)
    }

    fn set_len(&mut self, len: u64) -> StorageResult<()> {
        if self.fail_on_set_len.load(Ordering::SeqCst) {
            return Err(self.simulated("set_len"));
        }
        self.inner.set_len(len)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.simulated("flush"));
        }
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.simulated("sync"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }
}
