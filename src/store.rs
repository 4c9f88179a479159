//! In-memory object store for one mirror session.
//!
//! The store owns every decoded payload for the lifetime of the run; the
//! tree walker borrows slices out of it. Entries keep their insertion
//! order (the resolver's deterministic pass order) and are indexed two
//! ways: by content hash for ref-delta bases and tree lookups, and by pack
//! offset for ofs-delta bases.
//!
//! Delta entries are a distinct variant, so later stages that accept only
//! [`Object`] cannot be handed an unresolved delta by construction. The
//! resolver rewrites `Delta` entries to `Object` in place; afterwards no
//! delta remains addressable.

use std::fmt;

use ahash::AHashMap;

use crate::object_id::{ObjectId, ObjectKind};

/// A concrete decoded object.
#[derive(Clone, Debug)]
pub struct Object {
    pub kind: ObjectKind,
    pub id: ObjectId,
    pub payload: Vec<u8>,
    /// Offset of the entry's first header byte in the pack, when the
    /// object came from one.
    pub pack_offset: Option<u64>,
}

/// Base reference of an unresolved delta entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaBase {
    /// Backward distance in pack bytes from the delta's own offset.
    Ofs(u64),
    /// Content hash of the base object.
    Ref(ObjectId),
}

/// An unresolved delta pack entry.
#[derive(Clone, Debug)]
pub struct DeltaEntry {
    pub pack_offset: u64,
    pub base: DeltaBase,
    /// Inflated delta instruction stream.
    pub payload: Vec<u8>,
}

/// One slot of the store.
#[derive(Clone, Debug)]
pub enum StoreEntry {
    Object(Object),
    Delta(DeltaEntry),
}

/// Errors from store insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// Two pack entries claimed the same offset.
    DuplicatePackOffset(u64),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicatePackOffset(off) => {
                write!(f, "duplicate pack offset {off}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Insertion-ordered object store with hash and offset indexes.
#[derive(Debug, Default)]
pub struct ObjectStore {
    entries: Vec<StoreEntry>,
    by_id: AHashMap<ObjectId, usize>,
    by_offset: AHashMap<u64, usize>,
}

impl ObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, resolved or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts a concrete object.
    ///
    /// Re-inserting an already-present hash is a no-op that returns the
    /// existing slot.
    ///
    /// # Errors
    /// `DuplicatePackOffset` if another entry already claimed the offset.
    pub fn insert_object(&mut self, object: Object) -> Result<usize, StoreError> {
        if let Some(&index) = self.by_id.get(&object.id) {
            return Ok(index);
        }
        let index = self.entries.len();
        if let Some(offset) = object.pack_offset {
            self.claim_offset(offset, index)?;
        }
        self.by_id.insert(object.id, index);
        self.entries.push(StoreEntry::Object(object));
        Ok(index)
    }

    /// Inserts an unresolved delta entry.
    ///
    /// # Errors
    /// `DuplicatePackOffset` if another entry already claimed the offset.
    pub fn insert_delta(&mut self, delta: DeltaEntry) -> Result<usize, StoreError> {
        let index = self.entries.len();
        self.claim_offset(delta.pack_offset, index)?;
        self.entries.push(StoreEntry::Delta(delta));
        Ok(index)
    }

    fn claim_offset(&mut self, offset: u64, index: usize) -> Result<(), StoreError> {
        if self.by_offset.insert(offset, index).is_some() {
            return Err(StoreError::DuplicatePackOffset(offset));
        }
        Ok(())
    }

    /// Looks up a concrete object by content hash.
    #[must_use]
    pub fn by_id(&self, id: &ObjectId) -> Option<&Object> {
        let &index = self.by_id.get(id)?;
        match &self.entries[index] {
            StoreEntry::Object(obj) => Some(obj),
            StoreEntry::Delta(_) => None,
        }
    }

    /// Looks up any entry by pack offset.
    #[must_use]
    pub fn by_offset(&self, offset: u64) -> Option<&StoreEntry> {
        let &index = self.by_offset.get(&offset)?;
        Some(&self.entries[index])
    }

    /// Slot index of the entry at `offset`, if any.
    #[must_use]
    pub fn index_at_offset(&self, offset: u64) -> Option<usize> {
        self.by_offset.get(&offset).copied()
    }

    /// Entry at a slot index.
    #[must_use]
    pub fn entry(&self, index: usize) -> &StoreEntry {
        &self.entries[index]
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StoreEntry> {
        self.entries.iter()
    }

    /// Slot indexes of all unresolved deltas, in insertion order.
    #[must_use]
    pub fn delta_indexes(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| matches!(e, StoreEntry::Delta(_)).then_some(i))
            .collect()
    }

    /// Replaces a delta slot with its materialized object, indexing the
    /// new hash. Used only by the resolver.
    ///
    /// # Panics
    /// Panics if the slot does not hold a delta; the resolver visits each
    /// delta exactly once.
    pub fn resolve_slot(&mut self, index: usize, object: Object) {
        match &self.entries[index] {
            StoreEntry::Delta(_) => {
                self.by_id.entry(object.id).or_insert(index);
                self.entries[index] = StoreEntry::Object(object);
            }
            StoreEntry::Object(_) => panic!("slot {index} already resolved"),
        }
    }
}
