//! Shallow mirror client for smart-HTTP v2 content-addressed repositories.
//!
//! Given a repository path and a branch, the crate materializes a depth-1
//! worktree of the branch tip on local disk and keeps it current across
//! invocations via a tool-private manifest. No repository metadata is
//! written next to the worktree; the mirror refuses to coexist with
//! another client's `.git`.
//!
//! Pipeline overview (one strictly sequential session):
//! 1. `scan` hashes the existing worktree and guards against foreign
//!    metadata.
//! 2. `protocol` discovers the branch tip and requests a pack stream.
//! 3. `chunked` and `pkt_line` strip the transport framing down to raw
//!    pack bytes.
//! 4. `pack` verifies the container and inflates every entry into `store`.
//! 5. `resolve` materializes delta entries against their bases (thin-pack
//!    bases recovered from local files).
//! 6. `worktree` walks the tip commit's tree and writes files, symlinks,
//!    and directories, comparing against the scan.
//! 7. `manifest` records the produced state and is renamed live last.
//!
//! # Invariants
//! - Every concrete object satisfies `id == sha1("<kind> <len>\0" ++ payload)`.
//! - After resolution the store holds no delta entries.
//! - The manifest flips atomically; an interrupted run leaves the previous
//!   one authoritative.
//! - All decode stages are bounded by explicit [`limits::Limits`].

pub mod chunked;
pub mod commit;
pub mod delta;
pub mod errors;
pub mod inflate;
pub mod limits;
pub mod manifest;
pub mod object_id;
pub mod options;
pub mod pack;
pub mod pkt_line;
pub mod protocol;
pub mod resolve;
pub mod scan;
pub mod session;
pub mod store;
pub mod transport;
pub mod tree;
pub mod varint;
pub mod worktree;

pub use errors::{MirrorError, VerifyError};
pub use limits::Limits;
pub use object_id::{hash_object, ObjectId, ObjectKind};
pub use options::{Command, Options};
pub use session::{Outcome, Session, SessionReport};
pub use store::{Object, ObjectStore};
pub use transport::{TcpTransport, Transport, TransportError};
