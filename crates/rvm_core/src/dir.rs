//! RVM directory management.
//!
//! This module handles the file system layout for one RVM instance:
//!
//! ```text
//! <rvm_dir>/
//! ├─ LOCK              # Advisory lock, one instance per directory
//! ├─ .rvm.log          # Commit log
//! ├─ .rvm.log.new      # Compaction target, only present mid-truncate
//! └─ .<name>.seg       # Backing file for segment <name>
//! ```

use crate::error::{RvmError, RvmResult};
use crate::types::validate_segment_name;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = ".rvm.log";
const LOG_COMPACT_FILE: &str = ".rvm.log.new";
const SEGMENT_SUFFIX: &str = ".seg";

/// Owns an RVM directory and the exclusive lock on it.
#[derive(Debug)]
pub struct RvmDir {
    path: PathBuf,
    _lock_file: File,
}

impl RvmDir {
    /// Opens or creates an RVM directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists and is not a directory (`DirectoryConflict`)
    /// - The directory is missing and `create_if_missing` is false
    /// - Another instance holds the lock (`DirectoryLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> RvmResult<Self> {
        match fs::metadata(path) {
            Ok(meta) if !meta.is_dir() => {
                return Err(RvmError::DirectoryConflict {
                    path: path.to_path_buf(),
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !create_if_missing {
                    return Err(RvmError::DirectoryMissing {
                        path: path.to_path_buf(),
                    });
                }
                fs::create_dir_all(path)?;
            }
            Err(e) => return Err(e.into()),
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(RvmError::DirectoryLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the RVM directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the commit log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Returns the path the checkpoint writes the compacted log to.
    #[must_use]
    pub fn compact_log_path(&self) -> PathBuf {
        self.path.join(LOG_COMPACT_FILE)
    }

    /// Returns the backing file path for a segment.
    ///
    /// The name must already be validated.
    #[must_use]
    pub fn segment_path(&self, name: &str) -> PathBuf {
        segment_path_in(&self.path, name)
    }

    /// Atomically replaces the commit log with the compacted log.
    pub fn replace_log(&self) -> RvmResult<()> {
        fs::rename(self.compact_log_path(), self.log_path())?;
        self.sync_directory()
    }

    /// Removes a segment's backing file.
    ///
    /// Returns `false` if there was no backing file.
    pub fn remove_segment(&self, name: &str) -> RvmResult<bool> {
        match fs::remove_file(self.segment_path(name)) {
            Ok(()) => {
                self.sync_directory()?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists the segments that have a backing file, sorted by name.
    pub fn list_segments(&self) -> RvmResult<Vec<(String, u64)>> {
        list_segments_in(&self.path)
    }

    /// Syncs the directory so that creates, renames and deletes are durable.
    #[cfg(unix)]
    pub fn sync_directory(&self) -> RvmResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    /// Directory fsync is not available on this platform; metadata
    /// durability is left to the filesystem journal.
    #[cfg(not(unix))]
    pub fn sync_directory(&self) -> RvmResult<()> {
        Ok(())
    }
}

/// Returns the backing file path for `name` inside `dir`.
#[must_use]
pub fn segment_path_in(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!(".{name}{SEGMENT_SUFFIX}"))
}

/// Returns the commit log path inside `dir`.
#[must_use]
pub fn log_path_in(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE)
}

/// Lists `(segment name, backing file length)` pairs found in `dir`.
///
/// Does not take the directory lock; used by read-only tooling.
pub fn list_segments_in(dir: &Path) -> RvmResult<Vec<(String, u64)>> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(name) = file_name
            .strip_prefix('.')
            .and_then(|rest| rest.strip_suffix(SEGMENT_SUFFIX))
        else {
            continue;
        };
        if validate_segment_name(name).is_err() {
            continue;
        }
        let meta = entry.metadata()?;
        if meta.is_file() {
            segments.push((name.to_string(), meta.len()));
        }
    }
    segments.sort();
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");

        let dir = RvmDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert_eq!(dir.path(), path);
    }

    #[test]
    fn open_rejects_regular_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("not_a_dir");
        fs::write(&path, b"x").unwrap();

        let result = RvmDir::open(&path, true);
        assert!(matches!(result, Err(RvmError::DirectoryConflict { .. })));
    }

    #[test]
    fn open_missing_without_create_fails() {
        let temp = tempdir().unwrap();
        let result = RvmDir::open(&temp.path().join("missing"), false);
        assert!(matches!(result, Err(RvmError::DirectoryMissing { .. })));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("locked");

        let _first = RvmDir::open(&path, true).unwrap();
        let result = RvmDir::open(&path, true);
        assert!(matches!(result, Err(RvmError::DirectoryLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("reopen");

        drop(RvmDir::open(&path, true).unwrap());
        assert!(RvmDir::open(&path, true).is_ok());
    }

    #[test]
    fn paths_are_hidden_files() {
        let temp = tempdir().unwrap();
        let dir = RvmDir::open(temp.path(), true).unwrap();

        assert_eq!(dir.log_path(), temp.path().join(".rvm.log"));
        assert_eq!(dir.segment_path("A"), temp.path().join(".A.seg"));
    }

    #[test]
    fn list_and_remove_segments() {
        let temp = tempdir().unwrap();
        let dir = RvmDir::open(temp.path(), true).unwrap();

        fs::write(dir.segment_path("beta"), [0u8; 8]).unwrap();
        fs::write(dir.segment_path("alpha"), [0u8; 3]).unwrap();
        fs::write(dir.log_path(), b"").unwrap();

        assert_eq!(
            dir.list_segments().unwrap(),
            vec![("alpha".to_string(), 3), ("beta".to_string(), 8)]
        );

        assert!(dir.remove_segment("alpha").unwrap());
        assert!(!dir.remove_segment("alpha").unwrap());
        assert_eq!(dir.list_segments().unwrap().len(), 1);
    }
}
