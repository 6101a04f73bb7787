//! Test fixtures and RVM helpers.

use rvm_core::{Config, Rvm, SegmentHandle, TransactionId};
use std::path::Path;
use tempfile::TempDir;

/// An RVM instance in a temporary directory.
///
/// [`TestRvm::reopen`] drops the instance without checkpointing, which is
/// what a crash looks like to the next process: every committed transaction
/// is in the log, nothing else is.
pub struct TestRvm {
    rvm: Option<Rvm>,
    config: Config,
    temp_dir: TempDir,
}

impl TestRvm {
    /// Creates an instance with default configuration and no commit fsync.
    pub fn new() -> Self {
        Self::with_config(Config::default().sync_on_commit(false))
    }

    /// Creates an instance with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let rvm = Rvm::init_with_config(temp_dir.path(), config.clone())
            .expect("Failed to init RVM");
        Self {
            rvm: Some(rvm),
            config,
            temp_dir,
        }
    }

    /// Returns the RVM directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Drops the instance and opens a fresh one on the same directory.
    pub fn reopen(&mut self) {
        self.reopen_with(|_| {});
    }

    /// Drops the instance, runs `f` on the directory, then reopens it.
    ///
    /// Use this to damage files while no instance holds the lock.
    pub fn reopen_with<F: FnOnce(&Path)>(&mut self, f: F) {
        self.rvm = None;
        f(self.temp_dir.path());
        self.rvm = Some(
            Rvm::init_with_config(self.temp_dir.path(), self.config.clone())
                .expect("Failed to reopen RVM"),
        );
    }
}

impl Default for TestRvm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestRvm {
    type Target = Rvm;

    fn deref(&self) -> &Self::Target {
        self.rvm.as_ref().expect("RVM instance is open")
    }
}

/// Runs a test with an RVM instance in a temporary directory.
pub fn with_temp_rvm<F, R>(f: F) -> R
where
    F: FnOnce(&Rvm) -> R,
{
    let t = TestRvm::new();
    f(&t)
}

/// Writes `data` at `offset` in a single committed transaction.
pub fn commit_write(rvm: &Rvm, seg: SegmentHandle, offset: usize, data: &[u8]) -> TransactionId {
    let tid = rvm.begin_trans(&[seg]).expect("begin_trans failed");
    assert!(
        rvm.about_to_modify(tid, seg, offset, data.len()),
        "range rejected"
    );
    rvm.write(seg, offset, data).expect("write failed");
    rvm.commit_trans(tid).expect("commit_trans failed");
    tid
}

/// Writes `data` at `offset` in a transaction that is then aborted.
pub fn aborted_write(rvm: &Rvm, seg: SegmentHandle, offset: usize, data: &[u8]) {
    let tid = rvm.begin_trans(&[seg]).expect("begin_trans failed");
    rvm.about_to_modify(tid, seg, offset, data.len());
    rvm.write(seg, offset, data).expect("write failed");
    rvm.abort_trans(tid).expect("abort_trans failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopen_keeps_committed_bytes() {
        let mut t = TestRvm::new();
        let seg = t.map("A", 16).unwrap();
        commit_write(&t, seg, 4, &[1, 2, 3]);

        t.reopen();
        let seg = t.map("A", 16).unwrap();
        assert_eq!(t.read_range(seg, 4, 3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn reopen_discards_uncommitted_bytes() {
        let mut t = TestRvm::new();
        let seg = t.map("A", 4).unwrap();
        t.write(seg, 0, &[9, 9, 9, 9]).unwrap();

        t.reopen();
        let seg = t.map("A", 4).unwrap();
        assert_eq!(t.read(seg).unwrap(), vec![0; 4]);
    }

    #[test]
    fn aborted_write_leaves_nothing() {
        with_temp_rvm(|rvm| {
            let seg = rvm.map("A", 8).unwrap();
            aborted_write(rvm, seg, 0, &[1; 8]);
            assert_eq!(rvm.read(seg).unwrap(), vec![0; 8]);
            assert_eq!(rvm.log_size().unwrap(), 0);
        });
    }
}
