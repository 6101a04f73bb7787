//! Property-based test generators using proptest.
//!
//! Provides strategies for segment names, sizes and modify operations that
//! always fit inside the segment they target.

use proptest::prelude::*;

/// A write of `data` at `offset`, declared with `about_to_modify` first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyOp {
    /// Start of the range.
    pub offset: usize,
    /// Bytes written.
    pub data: Vec<u8>,
}

impl ModifyOp {
    /// Applies the write to a model of the segment.
    pub fn apply_to(&self, model: &mut [u8]) {
        model[self.offset..self.offset + self.data.len()].copy_from_slice(&self.data);
    }
}

/// Strategy for generating valid segment names.
pub fn segment_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating segment sizes.
pub fn segment_size_strategy() -> impl Strategy<Value = usize> {
    1usize..512
}

/// Strategy for one in-bounds modify operation on a segment of `size` bytes.
pub fn modify_op_strategy(size: usize) -> impl Strategy<Value = ModifyOp> {
    (0..size).prop_flat_map(move |offset| {
        prop::collection::vec(any::<u8>(), 0..=(size - offset))
            .prop_map(move |data| ModifyOp { offset, data })
    })
}

/// Strategy for up to `max` modify operations on a segment of `size` bytes.
pub fn modify_ops_strategy(size: usize, max: usize) -> impl Strategy<Value = Vec<ModifyOp>> {
    prop::collection::vec(modify_op_strategy(size), 1..=max)
}

/// Strategy for a segment size together with operations that fit it.
pub fn segment_with_ops_strategy() -> impl Strategy<Value = (usize, Vec<ModifyOp>)> {
    segment_size_strategy().prop_flat_map(|size| (Just(size), modify_ops_strategy(size, 8)))
}
