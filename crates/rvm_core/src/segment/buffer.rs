//! Owned segment memory.

use crate::error::{RvmError, RvmResult};
use std::ops::Range;

/// The exclusively owned bytes of a mapped segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentBuffer {
    bytes: Vec<u8>,
}

impl SegmentBuffer {
    /// Creates a zero-filled buffer of `len` bytes.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    /// Wraps bytes loaded from a backing file, resized to `len`.
    #[must_use]
    pub fn from_bytes(mut bytes: Vec<u8>, len: usize) -> Self {
        bytes.resize(len, 0);
        Self { bytes }
    }

    /// Returns the buffer length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the range `[offset, offset + len)` if it lies inside the buffer.
    #[must_use]
    pub fn checked_range(&self, offset: u64, len: u64) -> Option<Range<usize>> {
        let end = offset.checked_add(len)?;
        if end > self.bytes.len() as u64 {
            return None;
        }
        // Both fit in usize because end <= self.bytes.len().
        Some(offset as usize..end as usize)
    }

    /// Copies the bytes in `[offset, offset + len)`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range exceeds the buffer.
    pub fn snapshot(&self, offset: u64, len: u64) -> RvmResult<Vec<u8>> {
        let range = self.range_or_err(offset, len)?;
        Ok(self.bytes[range].to_vec())
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the write would exceed the buffer.
    pub fn restore(&mut self, offset: u64, data: &[u8]) -> RvmResult<()> {
        let range = self.range_or_err(offset, data.len() as u64)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Returns the whole buffer.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the whole buffer mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn range_or_err(&self, offset: u64, len: u64) -> RvmResult<Range<usize>> {
        self.checked_range(offset, len)
            .ok_or_else(|| RvmError::out_of_bounds(offset, len, self.bytes.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_buffer() {
        let buf = SegmentBuffer::zeroed(16);
        assert_eq!(buf.len(), 16);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn from_bytes_pads_and_truncates() {
        assert_eq!(
            SegmentBuffer::from_bytes(vec![1, 2], 4).as_slice(),
            &[1, 2, 0, 0]
        );
        assert_eq!(SegmentBuffer::from_bytes(vec![1, 2, 3], 1).as_slice(), &[1]);
    }

    #[test]
    fn checked_range_bounds() {
        let buf = SegmentBuffer::zeroed(100);
        assert_eq!(buf.checked_range(10, 4), Some(10..14));
        assert_eq!(buf.checked_range(96, 4), Some(96..100));
        assert_eq!(buf.checked_range(100, 0), Some(100..100));
        assert_eq!(buf.checked_range(97, 4), None);
        assert_eq!(buf.checked_range(u64::MAX, 2), None);
    }

    #[test]
    fn snapshot_and_restore() {
        let mut buf = SegmentBuffer::zeroed(8);
        buf.restore(2, &[1, 2, 3]).unwrap();
        assert_eq!(buf.snapshot(1, 4).unwrap(), vec![0, 1, 2, 3]);
        assert!(matches!(
            buf.restore(7, &[1, 2]),
            Err(RvmError::OutOfBounds { .. })
        ));
    }
}
