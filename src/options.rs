//! Typed session options.
//!
//! Configuration-file parsing happens outside this crate; callers hand a
//! filled record to [`crate::session::Session`]. The `label` names this
//! mirror's manifest and pack-cache files inside the work directory.

use std::path::{Path, PathBuf};

use crate::object_id::ObjectId;

/// Requested session verb.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Full fetch regardless of any manifest.
    Clone,
    /// Incremental update; degrades to a clone without a manifest.
    Pull,
    /// Offline comparison of the worktree against the manifest.
    Verify,
}

/// Session configuration.
#[derive(Clone, Debug)]
pub struct Options {
    /// Remote endpoint.
    pub host: String,
    pub port: u16,
    /// Repository URL path prefix (leading slash, no trailing slash).
    pub repository_path: String,
    /// Branch under `refs/heads/` to track.
    pub branch: String,
    /// Root of the materialized worktree.
    pub target_directory: PathBuf,
    /// Directory for the manifest and optional pack cache.
    pub work_directory: PathBuf,
    /// Filename stem for the manifest and pack cache.
    pub label: String,
    /// Manual discovery override: treat this as the remote tip.
    pub want: Option<ObjectId>,
    /// Manual override for the locally held tip.
    pub have: Option<ObjectId>,
    /// Force a full fetch even when a manifest exists.
    pub clone: bool,
    /// Persist the fetched pack bit-exact in the work directory.
    pub keep_pack: bool,
    /// Replay the cached pack instead of fetching.
    pub use_pack: bool,
    /// 0 quiet, 1 path changes, 2+ diagnostic traces.
    pub verbosity: u8,
}

impl Options {
    /// Live manifest path: `<work_dir>/<label>`.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.work_directory.join(&self.label)
    }

    /// Pack cache path: `<work_dir>/<label>.pack`.
    #[must_use]
    pub fn pack_path(&self) -> PathBuf {
        self.work_directory.join(format!("{}.pack", self.label))
    }

    /// Target worktree root.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target_directory
    }
}
