//! Segment buffers and the in-memory segment directory.
//!
//! A segment is a named, fixed-size byte buffer mirrored by a hidden backing
//! file. The directory maps names and handles to mapped segments and records
//! which transaction, if any, currently owns each one.

mod buffer;
mod directory;

pub use buffer::SegmentBuffer;
pub use directory::{Segment, SegmentDirectory};
