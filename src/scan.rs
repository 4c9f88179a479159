//! Local worktree scan.
//!
//! Before any network activity the target directory is walked and every
//! regular file is hashed as a blob, so the session can skip unchanged
//! paths, detect divergence from the manifest, and satisfy thin-pack base
//! references from local content. Symlinks are recorded by mode with the
//! link target hashed as their blob payload.
//!
//! A `.git` component anywhere under the target aborts the run: the
//! mirror refuses to coexist with another client's metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use ahash::AHashMap;

use crate::object_id::{hash_object, ObjectId, ObjectKind};

/// Errors from the local scan.
#[derive(Debug)]
#[non_exhaustive]
pub enum ScanError {
    /// Another client's metadata directory is present.
    DotGitPresent { path: PathBuf },
    /// A scanned path is not valid UTF-8.
    NonUtf8Path { path: PathBuf },
    Io(io::Error),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DotGitPresent { path } => {
                write!(f, "refusing to run: {} exists", path.display())
            }
            Self::NonUtf8Path { path } => {
                write!(f, "path is not valid UTF-8: {}", path.display())
            }
            Self::Io(err) => write!(f, "scan I/O error: {err}"),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ScanError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// One scanned path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScannedFile {
    /// Octal tree mode (100644, 100755, or 120000).
    pub mode: u32,
    /// Blob hash of the contents (link target for symlinks).
    pub id: ObjectId,
}

/// Result of walking the target directory.
#[derive(Debug, Default)]
pub struct LocalState {
    root: PathBuf,
    files: BTreeMap<String, ScannedFile>,
    by_id: AHashMap<ObjectId, String>,
}

impl LocalState {
    /// Scanned record for a relative path.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&ScannedFile> {
        self.files.get(path)
    }

    /// A relative path whose contents hash to `id`, if any was scanned.
    #[must_use]
    pub fn path_with_id(&self, id: &ObjectId) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    /// Number of scanned paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when the walk found nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates scanned paths in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScannedFile)> {
        self.files.iter()
    }

    /// Re-reads a scanned file into a blob object payload.
    ///
    /// Serves thin-pack base recovery: the resolver names a missing base
    /// hash, the session fetches the matching local file's bytes.
    ///
    /// # Errors
    /// `ScanError::Io` if the file vanished or cannot be read.
    pub fn blob_payload(&self, path: &str) -> Result<Vec<u8>, ScanError> {
        Ok(fs::read(self.root.join(path))?)
    }

    fn record(
        &mut self,
        root: &Path,
        path: &Path,
        mode: u32,
        id: ObjectId,
    ) -> Result<(), ScanError> {
        let relative = path
            .strip_prefix(root)
            .expect("walked path is under root")
            .to_str()
            .ok_or_else(|| ScanError::NonUtf8Path {
                path: path.to_path_buf(),
            })?
            .to_string();
        self.by_id.entry(id).or_insert_with(|| relative.clone());
        self.files.insert(relative, ScannedFile { mode, id });
        Ok(())
    }
}

/// Walks `root` and hashes every regular file and symlink.
///
/// A missing root yields an empty state (first clone into a fresh
/// directory).
///
/// # Errors
/// `DotGitPresent` on foreign metadata, `NonUtf8Path`, or `Io`.
pub fn scan_worktree(root: &Path) -> Result<LocalState, ScanError> {
    let mut state = LocalState {
        root: root.to_path_buf(),
        ..LocalState::default()
    };
    if !root.exists() {
        return Ok(state);
    }
    walk(root, root, &mut state)?;
    Ok(state)
}

fn walk(root: &Path, dir: &Path, state: &mut LocalState) -> Result<(), ScanError> {
    let mut entries: Vec<_> =
        fs::read_dir(dir)?.collect::<Result<Vec<_>, io::Error>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        if name.as_bytes() == b".git" {
            return Err(ScanError::DotGitPresent { path });
        }

        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            state.record(
                root,
                &path,
                0o120000,
                hash_object(ObjectKind::Blob, target.as_os_str().as_bytes()),
            )?;
        } else if file_type.is_dir() {
            walk(root, &path, state)?;
        } else if file_type.is_file() {
            let contents = fs::read(&path)?;
            let mode = if entry.metadata()?.permissions().mode() & 0o111 != 0 {
                0o100755
            } else {
                0o100644
            };
            state.record(root, &path, mode, hash_object(ObjectKind::Blob, &contents))?;
        }
        // Sockets, FIFOs, and devices are not mirrored content; ignore.
    }
    Ok(())
}
