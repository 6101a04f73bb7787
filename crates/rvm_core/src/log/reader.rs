//! Streaming commit log reader.
//!
//! Records are read one at a time with `read_at`, so memory use is bounded by
//! the largest single record rather than the log size.

use crate::error::{RvmError, RvmResult};
use crate::log::record::{RangeRecord, RecordHeader, LOG_HEADER_SIZE};
use rvm_storage::StorageBackend;

/// A position in the commit log.
///
/// The cursor does not borrow the log, so a caller can patch the record it
/// just read (see [`crate::log::CommitLog::mark_backed`]) before advancing.
#[derive(Debug, Clone)]
pub struct LogCursor {
    offset: u64,
    end: u64,
    finished: bool,
}

impl LogCursor {
    /// Creates a cursor over `[start, end)`.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            offset: start,
            end,
            finished: false,
        }
    }

    /// Returns the offset of the next record.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the record at the cursor and advances past it.
    ///
    /// Returns `Ok(None)` at end of log, including a torn record at the tail.
    ///
    /// # Errors
    ///
    /// Returns `LogCorruption` for a complete record that fails validation,
    /// or a storage error.
    pub fn next_record(
        &mut self,
        backend: &dyn StorageBackend,
    ) -> RvmResult<Option<(u64, RangeRecord)>> {
        if self.finished {
            return Ok(None);
        }

        let at = self.offset;
        let remaining = self.end.saturating_sub(at);
        if remaining == 0 {
            self.finished = true;
            return Ok(None);
        }
        if remaining < LOG_HEADER_SIZE as u64 {
            tracing::warn!(offset = at, remaining, "torn record header at end of commit log");
            self.finished = true;
            return Ok(None);
        }

        let raw = backend.read_at(at, LOG_HEADER_SIZE)?;
        let raw: [u8; LOG_HEADER_SIZE] = raw
            .try_into()
            .map_err(|_| RvmError::log_corruption(at, "short header read"))?;
        let header = RecordHeader::from_bytes(&raw);

        let body_len = header
            .body_len()
            .ok_or_else(|| RvmError::log_corruption(at, "record length overflow"))?;
        if body_len > remaining - LOG_HEADER_SIZE as u64 {
            tracing::warn!(offset = at, body_len, "torn record body at end of commit log");
            self.finished = true;
            return Ok(None);
        }

        let body_start = at + LOG_HEADER_SIZE as u64;
        let body_len = usize::try_from(body_len)
            .map_err(|_| RvmError::log_corruption(at, "record does not fit in memory"))?;
        let body = backend.read_at(body_start, body_len)?;

        let record = match header.decode(&raw, body, at) {
            Ok(record) => record,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };

        self.offset = body_start + body_len as u64;
        Ok(Some((at, record)))
    }
}

/// Iterator adapter over a borrowed backend.
///
/// Yields `(offset, record)` pairs. Stops after the first error.
pub struct LogIterator<'a> {
    backend: &'a dyn StorageBackend,
    cursor: LogCursor,
}

impl<'a> LogIterator<'a> {
    /// Creates an iterator over the whole backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: &'a dyn StorageBackend) -> RvmResult<Self> {
        let end = backend.size()?;
        Ok(Self {
            backend,
            cursor: LogCursor::new(0, end),
        })
    }
}

impl Iterator for LogIterator<'_> {
    type Item = RvmResult<(u64, RangeRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_record(self.backend).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionId;
    use rvm_storage::InMemoryBackend;

    fn record(tid: u64, name: &str, offset: u64, payload: &[u8]) -> RangeRecord {
        RangeRecord::redo(TransactionId::new(tid).unwrap(), name, offset, payload.to_vec())
    }

    fn backend_with(records: &[RangeRecord]) -> InMemoryBackend {
        let mut data = Vec::new();
        for r in records {
            r.encode_into(&mut data).unwrap();
        }
        InMemoryBackend::with_data(data)
    }

    #[test]
    fn reads_records_in_order_with_offsets() {
        let r1 = record(1, "A", 0, &[1, 2]);
        let r2 = record(2, "B", 5, &[3]);
        let backend = backend_with(&[r1.clone(), r2.clone()]);

        let records: Vec<_> = LogIterator::new(&backend)
            .unwrap()
            .collect::<RvmResult<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], (0, r1.clone()));
        assert_eq!(records[1], (r1.encoded_len() as u64, r2));
    }

    #[test]
    fn empty_log() {
        let backend = InMemoryBackend::new();
        assert_eq!(LogIterator::new(&backend).unwrap().count(), 0);
    }

    #[test]
    fn torn_header_is_end_of_log() {
        let r1 = record(1, "A", 0, &[1, 2]);
        let mut backend = backend_with(&[r1.clone()]);
        backend.append(&[0xFF; 10]).unwrap();

        let records: Vec<_> = LogIterator::new(&backend).unwrap().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().1, r1);
    }

    #[test]
    fn torn_body_is_end_of_log() {
        let r1 = record(1, "A", 0, &[1, 2]);
        let r2 = record(2, "A", 0, &[7; 64]);
        let mut data = r1.encode().unwrap();
        let full = r2.encode().unwrap();
        data.extend_from_slice(&full[..full.len() - 10]);
        let backend = InMemoryBackend::with_data(data);

        let records: Vec<_> = LogIterator::new(&backend)
            .unwrap()
            .collect::<RvmResult<_>>()
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn corrupt_record_stops_iteration_with_error() {
        let r1 = record(1, "A", 0, &[1, 2]);
        let r2 = record(2, "A", 0, &[3, 4]);
        let mut data = r1.encode().unwrap();
        data.extend(r2.encode().unwrap());
        let last = data.len() - 1;
        data[last] ^= 0x01;
        let backend = InMemoryBackend::with_data(data);

        let mut iter = LogIterator::new(&backend).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(
            iter.next(),
            Some(Err(RvmError::LogCorruption { .. }))
        ));
        assert!(iter.next().is_none());
    }

    proptest::proptest! {
        #[test]
        fn any_torn_tail_reads_as_end_of_log(
            payload in proptest::collection::vec(proptest::num::u8::ANY, 0..128),
            cut in 1usize..4096,
        ) {
            let complete = record(1, "A", 0, &[1, 2, 3]);
            let torn = record(2, "seg", 17, &payload).encode().unwrap();
            let keep = cut % torn.len();

            let mut data = complete.encode().unwrap();
            data.extend_from_slice(&torn[..keep]);
            let backend = InMemoryBackend::with_data(data);

            let records: Vec<_> = LogIterator::new(&backend)
                .unwrap()
                .collect::<RvmResult<_>>()
                .unwrap();
            proptest::prop_assert_eq!(records, vec![(0, complete)]);
        }
    }
}
