//! Content-address identity for mirrored objects.
//!
//! Objects are addressed by the SHA-1 of `"<kind> <len>\0"` followed by the
//! payload bytes. Identifiers are fixed-size, zero-heap values with two
//! encodings: raw 20-byte binary for intra-process compare and 40-character
//! lowercase hex for transport and the manifest.
//!
//! # Ordering Semantics
//! `ObjectId` compares lexicographically on its raw bytes, which is the same
//! total order as comparing the lowercase hex renderings.

use std::fmt;

use sha1::{Digest, Sha1};

/// Raw identifier length in bytes.
pub const ID_LEN: usize = 20;
/// Hex identifier length in characters.
pub const HEX_LEN: usize = 40;

/// Concrete object kinds that carry a content address.
///
/// Delta pack entries are transient and deliberately not represented here;
/// they live in [`crate::store::DeltaEntry`] until resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    /// Returns the ASCII tag used in the object header.
    #[inline]
    #[must_use]
    pub const fn header_tag(self) -> &'static [u8] {
        match self {
            Self::Commit => b"commit",
            Self::Tree => b"tree",
            Self::Blob => b"blob",
            Self::Tag => b"tag",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // header_tag is always valid ASCII
        f.write_str(std::str::from_utf8(self.header_tag()).unwrap_or("?"))
    }
}

/// Errors from hex identifier decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MalformedHash {
    /// Input length is not 40 characters.
    BadLength(usize),
    /// Input contains a non-hex byte.
    BadDigit(u8),
}

impl fmt::Display for MalformedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength(n) => write!(f, "hex hash has length {n}, expected {HEX_LEN}"),
            Self::BadDigit(b) => write!(f, "invalid hex byte 0x{b:02x} in hash"),
        }
    }
}

impl std::error::Error for MalformedHash {}

/// Fixed-size 20-byte content identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; ID_LEN]);

impl ObjectId {
    /// Wraps raw identifier bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates an identifier from a slice, `None` if the length is wrong.
    #[must_use]
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        let arr = <[u8; ID_LEN]>::try_from(bytes).ok()?;
        Some(Self(arr))
    }

    /// Decodes a 40-character hex rendering. Uppercase digits are accepted.
    ///
    /// # Errors
    /// `MalformedHash` on wrong length or non-hex bytes.
    pub fn from_hex(hex: &[u8]) -> Result<Self, MalformedHash> {
        if hex.len() != HEX_LEN {
            return Err(MalformedHash::BadLength(hex.len()));
        }
        let mut bytes = [0u8; ID_LEN];
        for (i, pair) in hex.chunks_exact(2).enumerate() {
            let hi = hex_value(pair[0]).ok_or(MalformedHash::BadDigit(pair[0]))?;
            let lo = hex_value(pair[1]).ok_or(MalformedHash::BadDigit(pair[1]))?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }

    /// Returns the raw identifier bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Renders the identifier as 40 lowercase hex characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let mut out = String::with_capacity(HEX_LEN);
        for &b in &self.0 {
            out.push(DIGITS[(b >> 4) as usize] as char);
            out.push(DIGITS[(b & 0x0f) as usize] as char);
        }
        out
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

#[inline]
const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Hashes an object payload under its kind header.
///
/// The digest covers `"<kind> <decimal-len>\0"` followed by the payload,
/// matching the on-wire identity of every concrete object.
#[must_use]
pub fn hash_object(kind: ObjectKind, payload: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(kind.header_tag());
    hasher.update(b" ");
    hasher.update(payload.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(payload);
    ObjectId::from_bytes(hasher.finalize().into())
}

/// Hashes raw bytes with no header, for pack trailer verification.
#[must_use]
pub fn hash_raw(bytes: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    ObjectId::from_bytes(hasher.finalize().into())
}
