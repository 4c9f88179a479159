//! Top-level error aggregate.
//!
//! Each pipeline stage owns its error enum next to its implementation;
//! this module folds them into the one type the session and the binary
//! handle. The session never retries; the single recoverable condition
//! (a thin-pack ref base satisfiable from local files) is handled inside
//! the session before an error escapes.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::chunked::FramingError;
use crate::manifest::ManifestError;
use crate::pack::PackError;
use crate::pkt_line::PktLineError;
use crate::protocol::DiscoveryError;
use crate::resolve::ResolveError;
use crate::scan::ScanError;
use crate::transport::TransportError;
use crate::worktree::WorktreeError;

/// Worktree guards raised in verify mode.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerifyError {
    /// No manifest: nothing to verify against.
    NoManifest { path: PathBuf },
    /// A tracked path is absent on disk.
    MissingLocalFile { path: String },
    /// A tracked path diverges from its recorded hash or mode.
    ModifiedLocalFile { path: String },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoManifest { path } => {
                write!(f, "no manifest at {}", path.display())
            }
            Self::MissingLocalFile { path } => write!(f, "missing local file: {path}"),
            Self::ModifiedLocalFile { path } => write!(f, "modified local file: {path}"),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Any failure a mirror session can surface.
#[derive(Debug)]
#[non_exhaustive]
pub enum MirrorError {
    Transport(TransportError),
    Framing(FramingError),
    PktLine(PktLineError),
    Discovery(DiscoveryError),
    Pack(PackError),
    Resolve(ResolveError),
    Worktree(WorktreeError),
    Scan(ScanError),
    Manifest(ManifestError),
    Verify(VerifyError),
    Io(io::Error),
}

impl fmt::Display for MirrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "{err}"),
            Self::Framing(err) => write!(f, "{err}"),
            Self::PktLine(err) => write!(f, "{err}"),
            Self::Discovery(err) => write!(f, "{err}"),
            Self::Pack(err) => write!(f, "{err}"),
            Self::Resolve(err) => write!(f, "{err}"),
            Self::Worktree(err) => write!(f, "{err}"),
            Self::Scan(err) => write!(f, "{err}"),
            Self::Manifest(err) => write!(f, "{err}"),
            Self::Verify(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for MirrorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Framing(err) => Some(err),
            Self::PktLine(err) => Some(err),
            Self::Discovery(err) => Some(err),
            Self::Pack(err) => Some(err),
            Self::Resolve(err) => Some(err),
            Self::Worktree(err) => Some(err),
            Self::Scan(err) => Some(err),
            Self::Manifest(err) => Some(err),
            Self::Verify(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

macro_rules! from_stage {
    ($variant:ident, $err:ty) => {
        impl From<$err> for MirrorError {
            fn from(err: $err) -> Self {
                Self::$variant(err)
            }
        }
    };
}

from_stage!(Transport, TransportError);
from_stage!(Framing, FramingError);
from_stage!(PktLine, PktLineError);
from_stage!(Discovery, DiscoveryError);
from_stage!(Pack, PackError);
from_stage!(Resolve, ResolveError);
from_stage!(Worktree, WorktreeError);
from_stage!(Scan, ScanError);
from_stage!(Manifest, ManifestError);
from_stage!(Verify, VerifyError);
from_stage!(Io, io::Error);
