//! Pack container parsing.
//!
//! A pack begins with `PACK` ‖ version ‖ object count (both big-endian
//! 32-bit), carries that many entries, and ends with a 20-byte SHA-1 of
//! everything preceding it. Each entry is a variable-length header (type
//! code, uncompressed size, and for deltas a base reference) followed by a
//! raw zlib stream.
//!
//! The reader verifies the container checksum up front, decodes every
//! entry, and inserts the result into the session store. Identity is not
//! computed for delta entries; the resolver owns that after
//! materialization.

use std::fmt;

use crate::inflate::{inflate_entry, InflateError};
use crate::limits::Limits;
use crate::object_id::{hash_object, hash_raw, ObjectId, ObjectKind, ID_LEN};
use crate::store::{DeltaBase, DeltaEntry, Object, ObjectStore, StoreError};

/// Fixed header size: magic(4) + version(4) + count(4).
const HEADER_SIZE: usize = 12;

/// Maximum bytes of an ofs-delta distance encoding.
const MAX_OFS_BYTES: usize = 10;

/// Errors from pack parsing.
#[derive(Debug)]
#[non_exhaustive]
pub enum PackError {
    /// Shorter than header plus trailing checksum.
    TooSmall,
    /// The first four bytes are not `PACK`.
    BadMagic,
    /// Pack version other than 2.
    UnsupportedVersion(u32),
    /// Trailing SHA-1 does not cover the preceding bytes.
    ChecksumMismatch {
        declared: ObjectId,
        actual: ObjectId,
    },
    /// Reserved or unknown entry type code.
    InvalidObjectType(u8),
    /// Entry header or payload ran past the end of the pack.
    Truncated,
    /// Entry header exceeded the safety bound.
    HeaderTooLong,
    /// Declared entry size exceeds the configured cap.
    ObjectTooLarge { size: u64, max: usize },
    /// Entries ended before the declared count was read.
    MissingEntries { declared: u32, decoded: u32 },
    /// Zlib failure while inflating an entry payload.
    Inflate(InflateError),
    /// Store rejected an entry.
    Store(StoreError),
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall => write!(f, "pack too small"),
            Self::BadMagic => write!(f, "bad pack magic"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported pack version {v}"),
            Self::ChecksumMismatch { declared, actual } => {
                write!(f, "pack checksum mismatch: trailer {declared}, computed {actual}")
            }
            Self::InvalidObjectType(code) => write!(f, "invalid pack entry type {code}"),
            Self::Truncated => write!(f, "truncated pack"),
            Self::HeaderTooLong => write!(f, "pack entry header exceeded safety bound"),
            Self::ObjectTooLarge { size, max } => {
                write!(f, "pack entry of {size} bytes exceeds cap {max}")
            }
            Self::MissingEntries { declared, decoded } => {
                write!(f, "pack declared {declared} entries, found {decoded}")
            }
            Self::Inflate(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inflate(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InflateError> for PackError {
    fn from(err: InflateError) -> Self {
        Self::Inflate(err)
    }
}

impl From<StoreError> for PackError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Per-kind tally of decoded entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackStats {
    pub commits: u32,
    pub trees: u32,
    pub blobs: u32,
    pub tags: u32,
    pub ofs_deltas: u32,
    pub ref_deltas: u32,
}

impl PackStats {
    /// Total decoded entries.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.commits + self.trees + self.blobs + self.tags + self.ofs_deltas + self.ref_deltas
    }
}

/// Decodes a complete pack into the store.
///
/// Verifies magic, version, and the trailing checksum, then inflates each
/// entry. Concrete entries are hashed and inserted as objects; delta
/// entries are inserted unresolved for the resolver.
///
/// # Errors
/// `PackError` on any structural, checksum, size-cap, inflate, or store
/// failure.
pub fn unpack(pack: &[u8], store: &mut ObjectStore, limits: &Limits) -> Result<PackStats, PackError> {
    if pack.len() < HEADER_SIZE + ID_LEN {
        return Err(PackError::TooSmall);
    }
    if &pack[..4] != b"PACK" {
        return Err(PackError::BadMagic);
    }
    let version = u32::from_be_bytes([pack[4], pack[5], pack[6], pack[7]]);
    if version != 2 {
        return Err(PackError::UnsupportedVersion(version));
    }
    let declared = u32::from_be_bytes([pack[8], pack[9], pack[10], pack[11]]);

    let data_end = pack.len() - ID_LEN;
    let trailer = ObjectId::try_from_slice(&pack[data_end..]).ok_or(PackError::TooSmall)?;
    let actual = hash_raw(&pack[..data_end]);
    if trailer != actual {
        return Err(PackError::ChecksumMismatch {
            declared: trailer,
            actual,
        });
    }

    let mut stats = PackStats::default();
    let mut pos = HEADER_SIZE;
    let mut payload = Vec::new();

    for decoded in 0..declared {
        if pos >= data_end {
            return Err(PackError::MissingEntries { declared, decoded });
        }
        let entry_offset = pos as u64;
        let header = read_entry_header(&pack[..data_end], &mut pos, limits)?;

        let cap = match header.kind {
            EntryType::Delta(_) => limits.max_delta_bytes,
            EntryType::Concrete(_) => limits.max_object_bytes,
        };
        if header.size > cap as u64 {
            return Err(PackError::ObjectTooLarge {
                size: header.size,
                max: cap,
            });
        }

        let consumed = inflate_entry(&pack[pos..data_end], &mut payload, header.size as usize)?;
        pos += consumed;

        match header.kind {
            EntryType::Concrete(kind) => {
                match kind {
                    ObjectKind::Commit => stats.commits += 1,
                    ObjectKind::Tree => stats.trees += 1,
                    ObjectKind::Blob => stats.blobs += 1,
                    ObjectKind::Tag => stats.tags += 1,
                }
                store.insert_object(Object {
                    kind,
                    id: hash_object(kind, &payload),
                    payload: std::mem::take(&mut payload),
                    pack_offset: Some(entry_offset),
                })?;
            }
            EntryType::Delta(base) => {
                match base {
                    DeltaBase::Ofs(_) => stats.ofs_deltas += 1,
                    DeltaBase::Ref(_) => stats.ref_deltas += 1,
                }
                store.insert_delta(DeltaEntry {
                    pack_offset: entry_offset,
                    base,
                    payload: std::mem::take(&mut payload),
                })?;
            }
        }
    }

    Ok(stats)
}

enum EntryType {
    Concrete(ObjectKind),
    Delta(DeltaBase),
}

struct EntryHeader {
    kind: EntryType,
    /// Uncompressed payload size; for deltas, the instruction stream size.
    size: u64,
}

/// Decodes one entry header, advancing `pos` to the zlib stream.
fn read_entry_header(
    pack: &[u8],
    pos: &mut usize,
    limits: &Limits,
) -> Result<EntryHeader, PackError> {
    let start = *pos;
    let first = byte_at(pack, *pos)?;
    *pos += 1;

    let type_code = (first >> 4) & 0x07;
    let mut size = (first & 0x0f) as u64;
    let mut shift = 4u32;
    let mut byte = first;
    while byte & 0x80 != 0 {
        if *pos - start >= limits.max_header_bytes {
            return Err(PackError::HeaderTooLong);
        }
        byte = byte_at(pack, *pos)?;
        *pos += 1;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
        if shift > 63 {
            return Err(PackError::HeaderTooLong);
        }
    }

    let kind = match type_code {
        1 => EntryType::Concrete(ObjectKind::Commit),
        2 => EntryType::Concrete(ObjectKind::Tree),
        3 => EntryType::Concrete(ObjectKind::Blob),
        4 => EntryType::Concrete(ObjectKind::Tag),
        6 => EntryType::Delta(DeltaBase::Ofs(read_ofs_distance(pack, pos)?)),
        7 => {
            let end = *pos + ID_LEN;
            if end > pack.len() {
                return Err(PackError::Truncated);
            }
            let base = ObjectId::try_from_slice(&pack[*pos..end]).ok_or(PackError::Truncated)?;
            *pos = end;
            EntryType::Delta(DeltaBase::Ref(base))
        }
        code => return Err(PackError::InvalidObjectType(code)),
    };

    Ok(EntryHeader { kind, size })
}

/// Decodes the ofs-delta backward distance.
///
/// Per continuation byte the accumulator steps `value = ((value + 1) << 7)
/// | (byte & 0x7f)`, which biases multi-byte encodings so that no distance
/// has two renderings.
fn read_ofs_distance(pack: &[u8], pos: &mut usize) -> Result<u64, PackError> {
    let mut byte = byte_at(pack, *pos)?;
    *pos += 1;
    let mut value = (byte & 0x7f) as u64;
    let mut read = 1usize;

    while byte & 0x80 != 0 {
        if read >= MAX_OFS_BYTES {
            return Err(PackError::HeaderTooLong);
        }
        byte = byte_at(pack, *pos)?;
        *pos += 1;
        read += 1;
        value = ((value + 1) << 7) | (byte & 0x7f) as u64;
    }
    Ok(value)
}

fn byte_at(pack: &[u8], pos: usize) -> Result<u8, PackError> {
    pack.get(pos).copied().ok_or(PackError::Truncated)
}
