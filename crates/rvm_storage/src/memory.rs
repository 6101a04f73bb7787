//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// An in-memory storage backend.
///
/// Holds its bytes in a `Vec<u8>`. Used by unit tests of the commit log
/// codec and by crash-simulation helpers that need a log image they can
/// tear or corrupt without touching the filesystem.
///
/// # Example
///
/// ```rust
/// use rvm_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// backend.set_len(4).unwrap();
/// backend.write_at(2, &[7, 7, 7]).unwrap();
/// assert_eq!(backend.data(), vec![0, 0, 7, 7, 7]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

fn to_index(value: u64) -> StorageResult<usize> {
    usize::try_from(value).map_err(|_| {
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("offset {value} does not fit in memory"),
        ))
    })
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        let start = to_index(offset)?;
        Ok(data[start..start + len].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn write_at(&mut self, offset: u64, new_data: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        let start = to_index(offset)?;
        let end = start.saturating_add(new_data.len());
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(new_data);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> StorageResult<()> {
        let len = to_index(len)?;
        self.data.write().resize(len, 0);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn memory_append_returns_correct_offset() {
        let mut backend = InMemoryBackend::new();

        let offset1 = backend.append(b"hello").unwrap();
        assert_eq!(offset1, 0);

        let offset2 = backend.append(b" world").unwrap();
        assert_eq!(offset2, 5);

        assert_eq!(backend.size().unwrap(), 11);
    }

    #[test]
    fn memory_read_at_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();

        let result = backend.read_at(3, 10);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn memory_write_at_overwrites_in_place() {
        let mut backend = InMemoryBackend::with_data(b"hello world".to_vec());
        backend.write_at(6, b"WORLD").unwrap();
        assert_eq!(backend.data(), b"hello WORLD");
    }

    #[test]
    fn memory_write_at_past_end_zero_fills_gap() {
        let mut backend = InMemoryBackend::with_data(vec![1, 2]);
        backend.write_at(4, &[9]).unwrap();
        assert_eq!(backend.data(), vec![1, 2, 0, 0, 9]);
    }

    #[test]
    fn memory_set_len_grow_and_shrink() {
        let mut backend = InMemoryBackend::with_data(vec![5; 4]);

        backend.set_len(6).unwrap();
        assert_eq!(backend.data(), vec![5, 5, 5, 5, 0, 0]);

        backend.set_len(2).unwrap();
        assert_eq!(backend.data(), vec![5, 5]);
    }

    #[test]
    fn memory_empty_read() {
        let backend = InMemoryBackend::with_data(b"hello".to_vec());
        let data = backend.read_at(2, 0).unwrap();
        assert!(data.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn memory_write_then_read_matches(
            prefix in proptest::collection::vec(proptest::num::u8::ANY, 0..64),
            offset in 0u64..96,
            patch in proptest::collection::vec(proptest::num::u8::ANY, 0..32),
        ) {
            let mut backend = InMemoryBackend::with_data(prefix.clone());
            backend.write_at(offset, &patch).unwrap();

            let size = backend.size().unwrap();
            proptest::prop_assert!(size >= prefix.len() as u64);
            proptest::prop_assert_eq!(backend.read_at(offset, patch.len()).unwrap(), patch);
        }
    }
}
