//! # RVM Core
//!
//! Recoverable virtual memory: named, file-backed memory segments modified
//! under transactions.
//!
//! This crate provides:
//! - Segment directory with generation-checked handles
//! - Transactions with in-memory undo snapshots and declared redo ranges
//! - An append-only, checksummed commit log
//! - Checkpointing, which applies the log to backing files and compacts it
//! - Crash recovery folded into [`Rvm::map`]
//!
//! ```rust,ignore
//! use rvm_core::Rvm;
//!
//! let rvm = Rvm::init("data")?;
//! let seg = rvm.map("counters", 64)?;
//!
//! let tid = rvm.begin_trans(&[seg])?;
//! rvm.about_to_modify(tid, seg, 0, 8);
//! rvm.write(seg, 0, &1u64.to_le_bytes())?;
//! rvm.commit_trans(tid)?;
//!
//! rvm.truncate_log()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod config;
mod dir;
mod error;
pub mod log;
mod rvm;
pub mod segment;
pub mod transaction;
mod types;

pub use checkpoint::{truncate_log, CheckpointStats};
pub use config::Config;
pub use dir::{list_segments_in, log_path_in, segment_path_in, RvmDir};
pub use error::{RvmError, RvmResult};
pub use log::{CommitLog, RangeRecord, RecordKind};
pub use rvm::Rvm;
pub use segment::{Segment, SegmentBuffer, SegmentDirectory};
pub use transaction::{CommitSummary, Transaction, TransactionManager};
pub use types::{validate_segment_name, SegmentHandle, TransactionId, MAX_SEGMENT_NAME_LEN};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
