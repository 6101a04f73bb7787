//! RVM instance facade.

use crate::checkpoint::{self, CheckpointStats};
use crate::config::Config;
use crate::dir::RvmDir;
use crate::error::{RvmError, RvmResult};
use crate::log::{CommitLog, RangeRecord};
use crate::segment::{Segment, SegmentBuffer, SegmentDirectory};
use crate::transaction::{CommitSummary, TransactionManager};
use crate::types::{validate_segment_name, SegmentHandle, TransactionId};
use parking_lot::Mutex;
use rvm_storage::{FileBackend, StorageBackend};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Emits an `info` event under the `rvm` target when the instance is verbose.
macro_rules! trace_op {
    ($rvm:expr, $($field:tt)+) => {
        if $rvm.is_verbose() {
            tracing::info!(target: "rvm", $($field)+);
        }
    };
}

/// Mutable state guarded by the instance lock.
struct RvmState {
    segments: SegmentDirectory,
    txns: TransactionManager,
    log: CommitLog,
}

/// A recoverable virtual memory instance bound to one directory.
///
/// `Rvm` is the entry point for mapping segments and running transactions
/// over them. All state lives behind a single mutex, so an `Rvm` can be
/// shared between threads; each operation is serialized against the others.
///
/// # Example
///
/// ```rust,ignore
/// use rvm_core::Rvm;
///
/// let rvm = Rvm::init("my_rvm")?;
/// let seg = rvm.map("accounts", 4096)?;
///
/// let tid = rvm.begin_trans(&[seg])?;
/// rvm.about_to_modify(tid, seg, 0, 8);
/// rvm.write(seg, 0, &42u64.to_le_bytes())?;
/// rvm.commit_trans(tid)?;
/// ```
///
/// # Recovery
///
/// There is no separate recovery step. Mapping a segment whose backing file
/// already exists first runs [`Rvm::truncate_log`], which applies every
/// committed record for that segment to its backing file before the file is
/// loaded.
pub struct Rvm {
    config: Config,
    dir: RvmDir,
    state: Mutex<RvmState>,
    verbose: AtomicBool,
}

impl Rvm {
    /// Opens an RVM directory with default configuration.
    ///
    /// # Errors
    ///
    /// See [`Rvm::init_with_config`].
    pub fn init(path: impl AsRef<Path>) -> RvmResult<Self> {
        Self::init_with_config(path, Config::default())
    }

    /// Opens an RVM directory, creating it and its commit log if absent.
    ///
    /// A compaction file left behind by a crash during `truncate_log` is
    /// discarded; the live log is still complete in that case. A torn record
    /// at the end of the log is cut off so later commits follow the last
    /// complete record.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists and is not a directory (`DirectoryConflict`)
    /// - Another instance holds the directory (`DirectoryLocked`)
    /// - I/O errors occur
    pub fn init_with_config(path: impl AsRef<Path>, config: Config) -> RvmResult<Self> {
        let dir = RvmDir::open(path.as_ref(), config.create_if_missing)?;

        match std::fs::remove_file(dir.compact_log_path()) {
            Ok(()) => tracing::warn!(
                path = %dir.compact_log_path().display(),
                "removed stale compaction file"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut log = CommitLog::open(&dir.log_path(), config.sync_on_commit)?;
        log.trim_torn_tail()?;

        let rvm = Self {
            verbose: AtomicBool::new(config.verbose),
            config,
            dir,
            state: Mutex::new(RvmState {
                segments: SegmentDirectory::new(),
                txns: TransactionManager::new(),
                log,
            }),
        };
        trace_op!(rvm, op = "init", path = %rvm.dir.path().display());
        Ok(rvm)
    }

    /// Maps segment `name` with `size` bytes.
    ///
    /// If a backing file exists, the log is checkpointed first and the buffer
    /// is loaded from the file, zero-extended or truncated to `size`. The
    /// backing file is resized to match. Otherwise the buffer is zeroed and a
    /// backing file of `size` bytes is created.
    ///
    /// # Errors
    ///
    /// - `InvalidSegmentName` if `name` cannot name a backing file
    /// - `SegmentAlreadyMapped` if `name` is already mapped
    /// - `LogCorruption` or I/O errors from recovery
    pub fn map(&self, name: &str, size: usize) -> RvmResult<SegmentHandle> {
        validate_segment_name(name)?;
        let mut state = self.state.lock();

        if state.segments.contains(name) {
            return Err(RvmError::SegmentAlreadyMapped {
                name: name.to_string(),
            });
        }

        let path = self.dir.segment_path(name);
        let existed = path.try_exists()?;
        if existed {
            let mut targets: HashSet<String> =
                state.segments.names().map(str::to_string).collect();
            targets.insert(name.to_string());
            checkpoint::truncate_log(
                &self.dir,
                &mut state.log,
                &targets,
                self.config.sync_on_checkpoint,
            )?;
        }

        let mut backing = FileBackend::open(&path)?;
        let file_len = backing.size()?;
        let bytes = if existed {
            let read_len = usize::try_from(file_len).map_or(size, |len| len.min(size));
            backing.read_at(0, read_len)?
        } else {
            Vec::new()
        };
        let size_u64 = size as u64;
        if file_len != size_u64 {
            backing.set_len(size_u64)?;
        }
        backing.sync()?;
        drop(backing);
        if !existed {
            self.dir.sync_directory()?;
        }

        let handle = state.segments.insert(Segment::new(
            name.to_string(),
            SegmentBuffer::from_bytes(bytes, size),
        ))?;

        trace_op!(self, op = "map", segment = name, size, recovered = existed, %handle);
        Ok(handle)
    }

    /// Unmaps a segment, releasing its buffer.
    ///
    /// The backing file is left untouched. Unmapping an unknown or stale
    /// handle is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SegmentBusy` if an active transaction owns the segment.
    pub fn unmap(&self, handle: SegmentHandle) -> RvmResult<()> {
        let mut state = self.state.lock();

        let Some(segment) = state.segments.get(handle) else {
            trace_op!(self, op = "unmap", %handle, mapped = false);
            return Ok(());
        };
        if let Some(owner) = segment.owner() {
            return Err(RvmError::SegmentBusy {
                name: segment.name().to_string(),
                owner,
            });
        }

        if let Some(segment) = state.segments.remove(handle) {
            trace_op!(self, op = "unmap", segment = segment.name(), %handle);
        }
        Ok(())
    }

    /// Deletes the backing file of an unmapped segment.
    ///
    /// Committed records for `name` still in the log are folded into the
    /// backing file before it is removed, so they cannot resurface in a
    /// later segment of the same name. Returns `false` if there was no
    /// backing file.
    ///
    /// # Errors
    ///
    /// - `InvalidSegmentName` if `name` cannot name a backing file
    /// - `SegmentAlreadyMapped` if `name` is mapped
    pub fn destroy(&self, name: &str) -> RvmResult<bool> {
        validate_segment_name(name)?;
        let mut state = self.state.lock();

        if state.segments.contains(name) {
            return Err(RvmError::SegmentAlreadyMapped {
                name: name.to_string(),
            });
        }

        let mut targets: HashSet<String> = state.segments.names().map(str::to_string).collect();
        targets.insert(name.to_string());
        checkpoint::truncate_log(
            &self.dir,
            &mut state.log,
            &targets,
            self.config.sync_on_checkpoint,
        )?;

        let removed = self.dir.remove_segment(name)?;
        trace_op!(self, op = "destroy", segment = name, removed);
        Ok(removed)
    }

    /// Begins a transaction owning every segment in `handles`.
    ///
    /// # Errors
    ///
    /// - `SegmentNotFound` if a handle does not resolve
    /// - `TransactionSegmentConflict` if a segment is owned by another
    ///   transaction; no ownership changes in that case
    pub fn begin_trans(&self, handles: &[SegmentHandle]) -> RvmResult<TransactionId> {
        let mut state = self.state.lock();
        let RvmState { segments, txns, .. } = &mut *state;

        let tid = txns.begin(segments, handles)?;
        trace_op!(self, op = "begin_trans", %tid, segments = handles.len());
        Ok(tid)
    }

    /// Declares that `[offset, offset + len)` of `handle` is about to be
    /// written by `tid`.
    ///
    /// Returns `false` and records nothing if the transaction does not own
    /// the segment or the range exceeds it.
    pub fn about_to_modify(
        &self,
        tid: TransactionId,
        handle: SegmentHandle,
        offset: usize,
        len: usize,
    ) -> bool {
        let mut state = self.state.lock();
        let RvmState { segments, txns, .. } = &mut *state;

        let captured = txns.about_to_modify(segments, tid, handle, offset as u64, len as u64);
        trace_op!(self, op = "about_to_modify", %tid, %handle, offset, len, captured);
        captured
    }

    /// Commits a transaction, appending its declared ranges to the log.
    ///
    /// A transaction with no declared ranges commits as a no-op unless
    /// [`Config::strict_empty_commit`] is set.
    ///
    /// # Errors
    ///
    /// - `TransactionNotFound` if `tid` is not active
    /// - `CommitWithNoChanges` in strict mode
    /// - I/O errors appending to the log; the transaction stays active
    /// - `LogTrimFailed` if a failed append could not be undone; the
    ///   transaction is then treated as committed
    pub fn commit_trans(&self, tid: TransactionId) -> RvmResult<CommitSummary> {
        let mut state = self.state.lock();
        let RvmState {
            segments,
            txns,
            log,
        } = &mut *state;

        let summary = txns.commit(segments, log, tid, self.config.strict_empty_commit)?;
        trace_op!(
            self,
            op = "commit_trans",
            %tid,
            records = summary.records,
            bytes = summary.bytes,
            log_offset = ?summary.log_offset
        );
        Ok(summary)
    }

    /// Aborts a transaction, restoring every segment it owns.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound` if `tid` is not active.
    pub fn abort_trans(&self, tid: TransactionId) -> RvmResult<()> {
        let mut state = self.state.lock();
        let RvmState { segments, txns, .. } = &mut *state;

        let restored = txns.abort(segments, tid)?;
        trace_op!(self, op = "abort_trans", %tid, restored);
        Ok(())
    }

    /// Applies committed records for mapped segments to their backing files
    /// and compacts the log.
    ///
    /// Records for unmapped segments are carried over unchanged.
    ///
    /// # Errors
    ///
    /// Returns `LogCorruption` or I/O errors; the live log is untouched on
    /// error.
    pub fn truncate_log(&self) -> RvmResult<CheckpointStats> {
        let mut state = self.state.lock();
        let targets: HashSet<String> = state.segments.names().map(str::to_string).collect();

        let stats = checkpoint::truncate_log(
            &self.dir,
            &mut state.log,
            &targets,
            self.config.sync_on_checkpoint,
        )?;
        trace_op!(
            self,
            op = "truncate_log",
            applied = stats.applied,
            carried = stats.carried,
            dropped = stats.dropped
        );
        Ok(stats)
    }

    /// Enables or disables per-operation `info` events.
    pub fn set_verbose(&self, enabled: bool) {
        self.verbose.store(enabled, Ordering::Relaxed);
    }

    /// Returns true if per-operation events are enabled.
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    /// Copies the whole segment.
    ///
    /// # Errors
    ///
    /// `SegmentNotFound` if `handle` is stale.
    pub fn read(&self, handle: SegmentHandle) -> RvmResult<Vec<u8>> {
        self.with_segment(handle, <[u8]>::to_vec)
    }

    /// Copies `[offset, offset + len)` of the segment.
    ///
    /// # Errors
    ///
    /// `SegmentNotFound` or `OutOfBounds`.
    pub fn read_range(&self, handle: SegmentHandle, offset: usize, len: usize) -> RvmResult<Vec<u8>> {
        let state = self.state.lock();
        state
            .segments
            .resolve(handle)?
            .buffer()
            .snapshot(offset as u64, len as u64)
    }

    /// Writes `data` into the segment at `offset`.
    ///
    /// The write is only durable if it falls inside a range declared with
    /// [`Rvm::about_to_modify`] by a transaction that later commits.
    ///
    /// # Errors
    ///
    /// `SegmentNotFound` or `OutOfBounds`.
    pub fn write(&self, handle: SegmentHandle, offset: usize, data: &[u8]) -> RvmResult<()> {
        let mut state = self.state.lock();
        state
            .segments
            .resolve_mut(handle)?
            .buffer_mut()
            .restore(offset as u64, data)
    }

    /// Runs `f` over the segment bytes.
    ///
    /// # Errors
    ///
    /// `SegmentNotFound` if `handle` is stale.
    pub fn with_segment<R>(&self, handle: SegmentHandle, f: impl FnOnce(&[u8]) -> R) -> RvmResult<R> {
        let state = self.state.lock();
        Ok(f(state.segments.resolve(handle)?.buffer().as_slice()))
    }

    /// Runs `f` over the segment bytes mutably.
    ///
    /// The instance lock is held for the duration of `f`, so `f` must not
    /// call back into this `Rvm`.
    ///
    /// # Errors
    ///
    /// `SegmentNotFound` if `handle` is stale.
    pub fn with_segment_mut<R>(
        &self,
        handle: SegmentHandle,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> RvmResult<R> {
        let mut state = self.state.lock();
        Ok(f(state.segments.resolve_mut(handle)?.buffer_mut().as_mut_slice()))
    }

    /// Returns the segment size in bytes.
    ///
    /// # Errors
    ///
    /// `SegmentNotFound` if `handle` is stale.
    pub fn segment_len(&self, handle: SegmentHandle) -> RvmResult<usize> {
        Ok(self.state.lock().segments.resolve(handle)?.size())
    }

    /// Returns the segment name.
    ///
    /// # Errors
    ///
    /// `SegmentNotFound` if `handle` is stale.
    pub fn segment_name(&self, handle: SegmentHandle) -> RvmResult<String> {
        Ok(self.state.lock().segments.resolve(handle)?.name().to_string())
    }

    /// Returns the transaction owning the segment, if any.
    ///
    /// # Errors
    ///
    /// `SegmentNotFound` if `handle` is stale.
    pub fn segment_owner(&self, handle: SegmentHandle) -> RvmResult<Option<TransactionId>> {
        Ok(self.state.lock().segments.resolve(handle)?.owner())
    }

    /// Returns the handle of a mapped segment.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<SegmentHandle> {
        self.state.lock().segments.find(name)
    }

    /// Returns the names of mapped segments, sorted.
    #[must_use]
    pub fn mapped_segments(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state.segments.names().map(str::to_string).collect();
        names.sort();
        names
    }

    /// Returns `(name, size)` for every segment with a backing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn backing_segments(&self) -> RvmResult<Vec<(String, u64)>> {
        self.dir.list_segments()
    }

    /// Returns every record currently in the commit log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or holds a corrupted record.
    pub fn log_records(&self) -> RvmResult<Vec<(u64, RangeRecord)>> {
        self.state.lock().log.read_all()
    }

    /// Returns the commit log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn log_size(&self) -> RvmResult<u64> {
        self.state.lock().log.size()
    }

    /// Returns the number of active transactions.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.state.lock().txns.active_count()
    }

    /// Returns the RVM directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Rvm {
    fn drop(&mut self) {
        let active = self.state.get_mut().txns.active_count();
        if active > 0 {
            tracing::debug!(active, "discarding active transactions");
        }
    }
}

impl std::fmt::Debug for Rvm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rvm")
            .field("path", &self.dir.path())
            .field("config", &self.config)
            .field("verbose", &self.is_verbose())
            .finish_non_exhaustive()
    }
}
