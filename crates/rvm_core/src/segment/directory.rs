//! Name- and handle-indexed table of mapped segments.

use crate::error::{RvmError, RvmResult};
use crate::segment::SegmentBuffer;
use crate::types::{SegmentHandle, TransactionId};
use std::collections::HashMap;

/// A mapped segment.
#[derive(Debug)]
pub struct Segment {
    name: String,
    buffer: SegmentBuffer,
    owner: Option<TransactionId>,
}

impl Segment {
    /// Creates an unowned segment.
    #[must_use]
    pub fn new(name: String, buffer: SegmentBuffer) -> Self {
        Self {
            name,
            buffer,
            owner: None,
        }
    }

    /// Returns the segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the segment size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the transaction holding exclusive write access.
    #[must_use]
    pub fn owner(&self) -> Option<TransactionId> {
        self.owner
    }

    /// Returns the segment memory.
    #[must_use]
    pub fn buffer(&self) -> &SegmentBuffer {
        &self.buffer
    }

    /// Returns the segment memory mutably.
    pub fn buffer_mut(&mut self) -> &mut SegmentBuffer {
        &mut self.buffer
    }

    pub(crate) fn set_owner(&mut self, owner: Option<TransactionId>) {
        self.owner = owner;
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    segment: Option<Segment>,
}

/// Table of mapped segments.
///
/// Slots are reused after `remove`, but every removal bumps the slot's
/// generation so handles to the removed segment stop resolving.
#[derive(Debug, Default)]
pub struct SegmentDirectory {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_name: HashMap<String, u32>,
}

impl SegmentDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a segment and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns `SegmentAlreadyMapped` if a segment with the same name exists.
    pub fn insert(&mut self, segment: Segment) -> RvmResult<SegmentHandle> {
        if self.by_name.contains_key(segment.name()) {
            return Err(RvmError::SegmentAlreadyMapped {
                name: segment.name().to_string(),
            });
        }

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                let slot = u32::try_from(self.slots.len()).map_err(|_| {
                    RvmError::Io(std::io::Error::new(
                        std::io::ErrorKind::OutOfMemory,
                        "segment directory full",
                    ))
                })?;
                self.slots.push(Slot::default());
                slot
            }
        };

        self.by_name.insert(segment.name().to_string(), slot);
        let entry = &mut self.slots[slot as usize];
        entry.segment = Some(segment);

        Ok(SegmentHandle {
            slot,
            generation: entry.generation,
        })
    }

    /// Removes the segment behind `handle`, returning it.
    pub fn remove(&mut self, handle: SegmentHandle) -> Option<Segment> {
        let entry = self.slot_mut(handle)?;
        let segment = entry.segment.take()?;
        entry.generation += 1;
        self.by_name.remove(segment.name());
        self.free.push(handle.slot);
        Some(segment)
    }

    /// Resolves a handle.
    #[must_use]
    pub fn get(&self, handle: SegmentHandle) -> Option<&Segment> {
        self.slots
            .get(handle.slot as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.segment.as_ref())
    }

    /// Resolves a handle mutably.
    pub fn get_mut(&mut self, handle: SegmentHandle) -> Option<&mut Segment> {
        self.slot_mut(handle)?.segment.as_mut()
    }

    /// Resolves a handle or fails with `SegmentNotFound`.
    pub fn resolve(&self, handle: SegmentHandle) -> RvmResult<&Segment> {
        self.get(handle).ok_or(RvmError::SegmentNotFound)
    }

    /// Resolves a handle mutably or fails with `SegmentNotFound`.
    pub fn resolve_mut(&mut self, handle: SegmentHandle) -> RvmResult<&mut Segment> {
        self.get_mut(handle).ok_or(RvmError::SegmentNotFound)
    }

    /// Looks up a mapped segment by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<SegmentHandle> {
        let slot = *self.by_name.get(name)?;
        Some(SegmentHandle {
            slot,
            generation: self.slots[slot as usize].generation,
        })
    }

    /// Returns true if `name` is mapped.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the names of all mapped segments.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Returns the number of mapped segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns true if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Clears ownership on every segment owned by `tid`.
    ///
    /// Returns how many segments were released.
    pub fn release_owner(&mut self, tid: TransactionId) -> usize {
        let mut released = 0;
        for segment in self.slots.iter_mut().filter_map(|s| s.segment.as_mut()) {
            if segment.owner == Some(tid) {
                segment.owner = None;
                released += 1;
            }
        }
        released
    }

    fn slot_mut(&mut self, handle: SegmentHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|entry| entry.generation == handle.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str, size: usize) -> Segment {
        Segment::new(name.to_string(), SegmentBuffer::zeroed(size))
    }

    fn tid(id: u64) -> TransactionId {
        TransactionId::new(id).unwrap()
    }

    #[test]
    fn insert_and_resolve() {
        let mut dir = SegmentDirectory::new();
        let handle = dir.insert(segment("A", 100)).unwrap();

        let seg = dir.get(handle).unwrap();
        assert_eq!(seg.name(), "A");
        assert_eq!(seg.size(), 100);
        assert_eq!(seg.owner(), None);
        assert_eq!(dir.find("A"), Some(handle));
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut dir = SegmentDirectory::new();
        dir.insert(segment("A", 10)).unwrap();

        let result = dir.insert(segment("A", 20));
        assert!(matches!(result, Err(RvmError::SegmentAlreadyMapped { .. })));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn stale_handle_does_not_resolve_after_slot_reuse() {
        let mut dir = SegmentDirectory::new();
        let old = dir.insert(segment("A", 10)).unwrap();
        assert!(dir.remove(old).is_some());

        let new = dir.insert(segment("B", 10)).unwrap();
        assert_eq!(new.slot, old.slot);
        assert_ne!(new, old);

        assert!(dir.get(old).is_none());
        assert!(dir.remove(old).is_none());
        assert_eq!(dir.get(new).unwrap().name(), "B");
        assert!(!dir.contains("A"));
    }

    #[test]
    fn release_owner_only_touches_matching_segments() {
        let mut dir = SegmentDirectory::new();
        let a = dir.insert(segment("A", 1)).unwrap();
        let b = dir.insert(segment("B", 1)).unwrap();

        dir.get_mut(a).unwrap().set_owner(Some(tid(1)));
        dir.get_mut(b).unwrap().set_owner(Some(tid(2)));

        assert_eq!(dir.release_owner(tid(1)), 1);
        assert_eq!(dir.get(a).unwrap().owner(), None);
        assert_eq!(dir.get(b).unwrap().owner(), Some(tid(2)));
    }

    #[test]
    fn resolve_unknown_handle() {
        let dir = SegmentDirectory::new();
        let bogus = SegmentHandle {
            slot: 3,
            generation: 0,
        };
        assert!(matches!(dir.resolve(bogus), Err(RvmError::SegmentNotFound)));
    }
}
