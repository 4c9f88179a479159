//! Commit payload parsing.
//!
//! Only the leading `tree <40-hex>\n` header is consumed; parents, author,
//! and message are irrelevant to a depth-1 mirror.

use std::fmt;

use crate::object_id::{ObjectId, HEX_LEN};

/// Errors from commit parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MalformedCommit {
    pub detail: &'static str,
}

impl fmt::Display for MalformedCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed commit: {}", self.detail)
    }
}

impl std::error::Error for MalformedCommit {}

/// Extracts the root tree hash from a commit payload.
///
/// # Errors
/// `MalformedCommit` unless the payload opens with `tree <40-hex>\n`.
pub fn root_tree(payload: &[u8]) -> Result<ObjectId, MalformedCommit> {
    const PREFIX: &[u8] = b"tree ";

    let rest = payload.strip_prefix(PREFIX).ok_or(MalformedCommit {
        detail: "missing tree header",
    })?;
    if rest.len() < HEX_LEN + 1 || rest[HEX_LEN] != b'\n' {
        return Err(MalformedCommit {
            detail: "tree header not newline-terminated",
        });
    }
    ObjectId::from_hex(&rest[..HEX_LEN]).map_err(|_| MalformedCommit {
        detail: "tree hash is not hex",
    })
}
