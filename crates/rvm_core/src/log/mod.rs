//! Commit log for durability and crash recovery.
//!
//! The commit log is the durability boundary of RVM. A transaction's redo
//! records are appended here on commit, before segment ownership is released.
//! Backing files are only brought up to date later, by the checkpoint.
//!
//! ## Record Format
//!
//! ```text
//! | txid (8) | name_len (4) | offset (8) | length (8) | flags (1) | reserved (3) | crc32 (4) |
//! | segment name (name_len) | payload (length) |
//! ```
//!
//! All integers are little-endian. `flags` bit 0 marks a record as BACKED
//! (already applied to its backing file). The CRC covers every field except
//! `flags` and `reserved`, so flipping BACKED in place keeps the record valid.
//!
//! There is no file header and no transaction framing: one commit appends one
//! record per declared range, all in a single write.
//!
//! ## Recovery Policy
//!
//! - **Truncated header or body at end of file**: a torn append from a crash,
//!   treated as a clean end of log and cut off by `Rvm::init`.
//! - **CRC mismatch, zero txid, UNDO flag, non-UTF-8 name**: `LogCorruption`.
//!
//! ## Invariants
//!
//! - Only committed transactions reach the log
//! - Records of one transaction are contiguous and in declaration order
//! - Apart from the BACKED flag, records are never modified after write

mod reader;
mod record;
mod writer;

pub use reader::{LogCursor, LogIterator};
pub use record::{RangeRecord, RecordKind, FLAG_BACKED, FLAG_UNDO, LOG_HEADER_SIZE};
pub use writer::CommitLog;
