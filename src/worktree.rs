//! Tree walker and worktree writer.
//!
//! From the tip commit the walker descends the root tree and materializes
//! files, symlinks, and directories under the target path, comparing each
//! blob against the pre-run scan so unchanged files are left untouched.
//! Every emitted path lands in the new manifest; the manifest rename
//! happens later in the session, after all writes succeeded.
//!
//! Files are created with mode 0600 and chmod'd to their target mode once
//! written, so partially written content is never group/world readable.
//! Symlinks are replaced unconditionally.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{symlink, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::commit::{root_tree, MalformedCommit};
use crate::limits::Limits;
use crate::manifest::Manifest;
use crate::object_id::{ObjectId, ObjectKind};
use crate::scan::LocalState;
use crate::store::ObjectStore;
use crate::tree::{EntryKind, MalformedTree, TreeEntries};

/// Errors from worktree materialization.
#[derive(Debug)]
#[non_exhaustive]
pub enum WorktreeError {
    /// The store lacks an object the tree references.
    MissingObject { id: ObjectId },
    /// An entry's hash resolves to an object of the wrong kind.
    KindMismatch {
        id: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },
    /// Tree nesting exceeded the configured cap.
    DepthExceeded { max: usize },
    /// A tree entry name is not valid UTF-8.
    NonUtf8Name { in_dir: PathBuf },
    Commit(MalformedCommit),
    Tree(MalformedTree),
    Io(io::Error),
}

impl fmt::Display for WorktreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingObject { id } => write!(f, "object {id} not present after unpack"),
            Self::KindMismatch {
                id,
                expected,
                actual,
            } => write!(f, "object {id} is a {actual}, expected {expected}"),
            Self::DepthExceeded { max } => write!(f, "tree nesting deeper than {max}"),
            Self::NonUtf8Name { in_dir } => {
                write!(f, "non-UTF-8 entry name under {}", in_dir.display())
            }
            Self::Commit(err) => write!(f, "{err}"),
            Self::Tree(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "worktree I/O error: {err}"),
        }
    }
}

impl std::error::Error for WorktreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Commit(err) => Some(err),
            Self::Tree(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MalformedCommit> for WorktreeError {
    fn from(err: MalformedCommit) -> Self {
        Self::Commit(err)
    }
}

impl From<MalformedTree> for WorktreeError {
    fn from(err: MalformedTree) -> Self {
        Self::Tree(err)
    }
}

impl From<io::Error> for WorktreeError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Outcome tally of one materialization.
#[derive(Clone, Debug, Default)]
pub struct WriteStats {
    pub files_written: u32,
    pub files_skipped: u32,
    pub symlinks_written: u32,
    pub dirs_created: u32,
    pub gitlinks_skipped: u32,
    /// Relative paths created or rewritten, in walk order.
    pub changed_paths: Vec<String>,
}

/// Materializes the tip commit's tree under `target`.
///
/// Rows for every emitted file and symlink accumulate in `manifest` as
/// the walk proceeds, so on failure the caller holds the partial record
/// it staged before aborting. The caller renames the manifest live only
/// after this returns successfully.
///
/// # Errors
/// `WorktreeError` on missing objects, malformed payloads, or I/O.
pub fn materialize(
    store: &ObjectStore,
    tip: &ObjectId,
    target: &Path,
    scanned: &LocalState,
    limits: &Limits,
    manifest: &mut Manifest,
) -> Result<WriteStats, WorktreeError> {
    let commit = store
        .by_id(tip)
        .ok_or(WorktreeError::MissingObject { id: *tip })?;
    if commit.kind != ObjectKind::Commit {
        return Err(WorktreeError::KindMismatch {
            id: *tip,
            expected: ObjectKind::Commit,
            actual: commit.kind,
        });
    }
    let root = root_tree(&commit.payload)?;

    let mut stats = WriteStats::default();
    if !target.exists() {
        fs::create_dir_all(target)?;
        stats.dirs_created += 1;
    }

    let mut walker = Walker {
        store,
        scanned,
        target,
        limits,
        manifest,
        stats: &mut stats,
    };
    walker.descend(&root, &PathBuf::new(), 0)?;
    Ok(stats)
}

struct Walker<'a> {
    store: &'a ObjectStore,
    scanned: &'a LocalState,
    target: &'a Path,
    limits: &'a Limits,
    manifest: &'a mut Manifest,
    stats: &'a mut WriteStats,
}

impl Walker<'_> {
    fn descend(
        &mut self,
        tree_id: &ObjectId,
        prefix: &Path,
        depth: usize,
    ) -> Result<(), WorktreeError> {
        if depth >= self.limits.max_tree_depth {
            return Err(WorktreeError::DepthExceeded {
                max: self.limits.max_tree_depth,
            });
        }
        let tree = lookup(self.store, tree_id, ObjectKind::Tree)?;

        for entry in TreeEntries::new(&tree.payload) {
            let entry = entry?;
            let name = std::str::from_utf8(entry.name)
                .map_err(|_| WorktreeError::NonUtf8Name {
                    in_dir: prefix.to_path_buf(),
                })?
                .to_string();
            let relative = prefix.join(&name);
            let relative_str = relative
                .to_str()
                .expect("UTF-8 components join to UTF-8")
                .to_string();

            match entry.kind {
                EntryKind::Subtree => {
                    let absolute = self.target.join(&relative);
                    if !absolute.is_dir() {
                        fs::create_dir(&absolute)?;
                        fs::set_permissions(&absolute, fs::Permissions::from_mode(0o755))?;
                        self.stats.dirs_created += 1;
                    }
                    self.descend(&entry.id, &relative, depth + 1)?;
                }
                EntryKind::File | EntryKind::ExecutableFile => {
                    self.emit_file(&entry.id, entry.mode, &relative, &relative_str)?;
                }
                EntryKind::Symlink => {
                    self.emit_symlink(&entry.id, &relative, &relative_str)?;
                }
                EntryKind::Gitlink => {
                    self.stats.gitlinks_skipped += 1;
                }
            }
        }
        Ok(())
    }

    fn emit_file(
        &mut self,
        id: &ObjectId,
        mode: u32,
        relative: &Path,
        relative_str: &str,
    ) -> Result<(), WorktreeError> {
        self.manifest.insert(relative_str.to_string(), mode, *id);

        // Unchanged on disk: same content hash and same mode bits.
        if let Some(existing) = self.scanned.file(relative_str) {
            if existing.id == *id && existing.mode == mode {
                self.stats.files_skipped += 1;
                return Ok(());
            }
        }

        let blob = lookup(self.store, id, ObjectKind::Blob)?;
        let absolute = self.target.join(relative);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&absolute)?;
        file.write_all(&blob.payload)?;
        drop(file);

        let unix_mode = if mode & 0o111 != 0 { 0o755 } else { 0o644 };
        fs::set_permissions(&absolute, fs::Permissions::from_mode(unix_mode))?;

        self.stats.files_written += 1;
        self.stats.changed_paths.push(relative_str.to_string());
        Ok(())
    }

    fn emit_symlink(
        &mut self,
        id: &ObjectId,
        relative: &Path,
        relative_str: &str,
    ) -> Result<(), WorktreeError> {
        self.manifest.insert(relative_str.to_string(), 0o120000, *id);

        let blob = lookup(self.store, id, ObjectKind::Blob)?;
        let absolute = self.target.join(relative);
        match fs::symlink_metadata(&absolute) {
            Ok(_) => fs::remove_file(&absolute)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        symlink(std::ffi::OsStr::from_bytes(&blob.payload), &absolute)?;

        self.stats.symlinks_written += 1;
        self.stats.changed_paths.push(relative_str.to_string());
        Ok(())
    }
}

/// Store lookup insisting on an object kind.
fn lookup<'s>(
    store: &'s ObjectStore,
    id: &ObjectId,
    expected: ObjectKind,
) -> Result<&'s crate::store::Object, WorktreeError> {
    let object = store
        .by_id(id)
        .ok_or(WorktreeError::MissingObject { id: *id })?;
    if object.kind != expected {
        return Err(WorktreeError::KindMismatch {
            id: *id,
            expected,
            actual: object.kind,
        });
    }
    Ok(object)
}
