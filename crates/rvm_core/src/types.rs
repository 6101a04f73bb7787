//! Core type definitions for RVM.

use crate::error::{RvmError, RvmResult};
use std::fmt;
use std::num::NonZeroU64;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused within an
/// instance. The "no transaction" sentinel is `Option::<TransactionId>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(NonZeroU64);

impl TransactionId {
    /// Creates a transaction ID, returning `None` for the reserved value 0.
    #[must_use]
    pub const fn new(id: u64) -> Option<Self> {
        match NonZeroU64::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Opaque handle to a mapped segment.
///
/// Handles are only minted by [`crate::Rvm::map`]. Each one names a slot in
/// the segment directory together with the slot's generation at mapping
/// time; `unmap` bumps the generation, so a handle that outlives its segment
/// resolves to nothing instead of to whatever is mapped into the slot next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentHandle {
    pub(crate) slot: u32,
    pub(crate) generation: u64,
}

impl fmt::Display for SegmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}@{}", self.slot, self.generation)
    }
}

/// Maximum segment name length in bytes.
pub const MAX_SEGMENT_NAME_LEN: usize = 200;

/// Checks that `name` can be embedded in a backing file name.
///
/// # Errors
///
/// Returns [`RvmError::InvalidSegmentName`] for empty or over-long names,
/// `.`/`..`, and names containing path separators or NUL.
pub fn validate_segment_name(name: &str) -> RvmResult<()> {
    let bad = name.is_empty()
        || name.len() > MAX_SEGMENT_NAME_LEN
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(RvmError::invalid_segment_name(name));
    }
    Ok(())
}
