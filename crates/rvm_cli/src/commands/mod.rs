//! CLI command implementations.

pub mod checkpoint;
pub mod destroy;
pub mod dump_log;
pub mod inspect;

use rvm_core::RvmError;
use rvm_storage::StorageError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Output format for reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The path holds no commit log.
    #[error("no RVM directory found at {}", path.display())]
    NotAnRvmDirectory {
        /// The inspected path.
        path: PathBuf,
    },

    /// Core library error.
    #[error(transparent)]
    Rvm(#[from] RvmError),

    /// Storage error while reading the log directly.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Fails unless `path` is a directory holding a commit log.
pub fn require_rvm_dir(path: &Path) -> CliResult<PathBuf> {
    let log_path = rvm_core::log_path_in(path);
    if !path.is_dir() || !log_path.is_file() {
        return Err(CliError::NotAnRvmDirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(log_path)
}
