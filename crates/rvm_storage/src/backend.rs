//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store.
///
/// The commit log is written through `append` and patched in place through
/// `write_at` when a record is marked as applied. Segment backing files are
/// written through `write_at` during checkpoint and resized with `set_len`
/// when a segment is remapped at a different size.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `write_at` past the current end extends the store, zero-filling any gap
/// - `sync` ensures all written data and the store length are durable
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends
    /// beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Overwrites bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Resizes the storage to exactly `len` bytes.
    ///
    /// Shrinking discards trailing bytes; growing zero-fills.
    ///
    /// # Errors
    ///
    /// Returns an error if the resize fails.
    fn set_len(&mut self, len: u64) -> StorageResult<()>;

    /// Flushes all pending writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// This is a stronger guarantee than `flush`: after it returns, the
    /// contents and the length survive power loss.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}
