//! Range records and their on-disk encoding.

use crate::error::{RvmError, RvmResult};
use crate::types::TransactionId;
use crc32fast::Hasher;

/// Size of the fixed record header in bytes.
pub const LOG_HEADER_SIZE: usize = 36;

/// Flag bit: record has been applied to its backing file.
pub const FLAG_BACKED: u8 = 0b01;

/// Flag bit: record is an undo snapshot. Never valid on disk.
pub const FLAG_UNDO: u8 = 0b10;

/// Offset of the flags byte within the header.
pub(crate) const FLAGS_OFFSET: u64 = 28;

const CRC_OFFSET: usize = 32;

/// Whether a range record rolls back or rolls forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// In-memory snapshot restored on abort; never persisted.
    Undo,
    /// Final bytes of a declared range; persisted on commit.
    Redo,
}

/// A byte range of one segment tagged with the transaction that touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRecord {
    /// Owning transaction.
    pub tid: TransactionId,
    /// Segment the range belongs to.
    pub segment: String,
    /// Start of the range within the segment.
    pub offset: u64,
    /// Range contents; its length is the range length.
    pub payload: Vec<u8>,
    /// Undo or redo.
    pub kind: RecordKind,
    /// Whether the checkpoint has applied this record. Only meaningful on disk.
    pub backed: bool,
}

impl RangeRecord {
    /// Creates an undo snapshot.
    #[must_use]
    pub fn undo(tid: TransactionId, segment: &str, offset: u64, payload: Vec<u8>) -> Self {
        Self {
            tid,
            segment: segment.to_string(),
            offset,
            payload,
            kind: RecordKind::Undo,
            backed: false,
        }
    }

    /// Creates an unbacked redo record.
    #[must_use]
    pub fn redo(tid: TransactionId, segment: &str, offset: u64, payload: Vec<u8>) -> Self {
        Self {
            tid,
            segment: segment.to_string(),
            offset,
            payload,
            kind: RecordKind::Redo,
            backed: false,
        }
    }

    /// Returns the range length.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Returns true for a zero-length range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns true for undo snapshots.
    #[must_use]
    pub fn is_undo(&self) -> bool {
        self.kind == RecordKind::Undo
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        LOG_HEADER_SIZE + self.segment.len() + self.payload.len()
    }

    /// Appends the on-disk encoding of this record to `buf`.
    ///
    /// # Errors
    ///
    /// Undo records cannot be persisted and fail with `LogCorruption`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> RvmResult<()> {
        if self.is_undo() {
            return Err(RvmError::log_corruption(
                0,
                format!("refusing to persist undo record of {}", self.tid),
            ));
        }
        let name_len = u32::try_from(self.segment.len())
            .map_err(|_| RvmError::invalid_segment_name(self.segment.clone()))?;

        let start = buf.len();
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(&self.tid.as_u64().to_le_bytes());
        buf.extend_from_slice(&name_len.to_le_bytes());
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.len().to_le_bytes());
        buf.push(if self.backed { FLAG_BACKED } else { 0 });
        buf.extend_from_slice(&[0; 3]);

        let crc = record_crc(
            &buf[start..start + FLAGS_OFFSET as usize],
            self.segment.as_bytes(),
            &self.payload,
        );
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(self.segment.as_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Encodes this record into a fresh buffer.
    ///
    /// # Errors
    ///
    /// See [`Self::encode_into`].
    pub fn encode(&self) -> RvmResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }
}

/// The decoded fixed-size header of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub tid: u64,
    pub name_len: u32,
    pub offset: u64,
    pub length: u64,
    pub flags: u8,
    pub crc: u32,
}

impl RecordHeader {
    pub fn from_bytes(bytes: &[u8; LOG_HEADER_SIZE]) -> Self {
        let u64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(raw)
        };
        let u32_at = |at: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[at..at + 4]);
            u32::from_le_bytes(raw)
        };

        Self {
            tid: u64_at(0),
            name_len: u32_at(8),
            offset: u64_at(12),
            length: u64_at(20),
            flags: bytes[FLAGS_OFFSET as usize],
            crc: u32_at(CRC_OFFSET),
        }
    }

    /// Length of name plus payload.
    pub fn body_len(&self) -> Option<u64> {
        u64::from(self.name_len).checked_add(self.length)
    }

    /// Validates and decodes a full record whose body has been read.
    pub fn decode(
        &self,
        raw_header: &[u8; LOG_HEADER_SIZE],
        body: Vec<u8>,
        at: u64,
    ) -> RvmResult<RangeRecord> {
        let name_len = self.name_len as usize;
        let (name, payload) = body.split_at(name_len);

        let actual = record_crc(&raw_header[..FLAGS_OFFSET as usize], name, payload);
        if actual != self.crc {
            return Err(RvmError::log_corruption(
                at,
                format!("checksum mismatch: expected {:08x}, got {actual:08x}", self.crc),
            ));
        }
        if self.flags & FLAG_UNDO != 0 {
            return Err(RvmError::log_corruption(at, "undo record in commit log"));
        }
        let tid = TransactionId::new(self.tid)
            .ok_or_else(|| RvmError::log_corruption(at, "zero transaction id"))?;
        let segment = std::str::from_utf8(name)
            .map_err(|_| RvmError::log_corruption(at, "segment name is not UTF-8"))?
            .to_string();

        Ok(RangeRecord {
            tid,
            segment,
            offset: self.offset,
            payload: payload.to_vec(),
            kind: RecordKind::Redo,
            backed: self.flags & FLAG_BACKED != 0,
        })
    }
}

fn record_crc(fixed: &[u8], name: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(fixed);
    hasher.update(name);
    hasher.update(payload);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(id: u64) -> TransactionId {
        TransactionId::new(id).unwrap()
    }

    fn decode(bytes: &[u8]) -> RvmResult<RangeRecord> {
        let raw: [u8; LOG_HEADER_SIZE] = bytes[..LOG_HEADER_SIZE].try_into().unwrap();
        let header = RecordHeader::from_bytes(&raw);
        header.decode(&raw, bytes[LOG_HEADER_SIZE..].to_vec(), 0)
    }

    #[test]
    fn header_layout() {
        let record = RangeRecord::redo(tid(5), "A", 10, vec![1, 2, 3, 4]);
        let bytes = record.encode().unwrap();

        assert_eq!(bytes.len(), LOG_HEADER_SIZE + 1 + 4);
        assert_eq!(&bytes[0..8], &5u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
        assert_eq!(&bytes[12..20], &10u64.to_le_bytes());
        assert_eq!(&bytes[20..28], &4u64.to_le_bytes());
        assert_eq!(bytes[28], 0);
        assert_eq!(&bytes[36..37], b"A");
        assert_eq!(&bytes[37..], &[1, 2, 3, 4]);
    }

    #[test]
    fn decode_matches_encoded_record() {
        let record = RangeRecord::redo(tid(9), "accounts", 4096, vec![0xAB; 16]);
        assert_eq!(decode(&record.encode().unwrap()).unwrap(), record);
    }

    #[test]
    fn backed_flag_flip_keeps_checksum_valid() {
        let record = RangeRecord::redo(tid(1), "A", 0, vec![9; 8]);
        let mut bytes = record.encode().unwrap();
        bytes[FLAGS_OFFSET as usize] |= FLAG_BACKED;

        let decoded = decode(&bytes).unwrap();
        assert!(decoded.backed);
        assert_eq!(decoded.payload, vec![9; 8]);
    }

    #[test]
    fn payload_bit_flip_is_corruption() {
        let mut bytes = RangeRecord::redo(tid(1), "A", 0, vec![1, 2, 3])
            .encode()
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        assert!(matches!(decode(&bytes), Err(RvmError::LogCorruption { .. })));
    }

    #[test]
    fn undo_records_are_not_persisted() {
        let record = RangeRecord::undo(tid(1), "A", 0, vec![0; 4]);
        assert!(record.encode().is_err());
    }

    #[test]
    fn zero_length_range() {
        let record = RangeRecord::redo(tid(2), "B", 7, Vec::new());
        let bytes = record.encode().unwrap();
        assert_eq!(bytes.len(), LOG_HEADER_SIZE + 1);
        assert!(decode(&bytes).unwrap().is_empty());
    }
}
