//! The tool-private manifest: last synchronized tip plus one row per
//! tracked path.
//!
//! Format: line 1 is the tip commit hex; each following line is
//! `<octal-mode>\t<40-hex>\t<relative-path>\n`, serialized sorted by path.
//! The live file is `<work_dir>/<label>`; writes stage to `<label>.new`
//! and rename over the live name, so an interrupted run leaves the old
//! manifest intact. A missing manifest means the next run clones.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::object_id::ObjectId;

/// Errors from manifest load and persist.
#[derive(Debug)]
#[non_exhaustive]
pub enum ManifestError {
    Io(io::Error),
    /// A line does not parse; `line` is 1-based.
    Malformed { line: usize, detail: &'static str },
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "manifest I/O error: {err}"),
            Self::Malformed { line, detail } => {
                write!(f, "malformed manifest line {line}: {detail}")
            }
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Malformed { .. } => None,
        }
    }
}

impl From<io::Error> for ManifestError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// One tracked path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManifestRow {
    /// Octal tree mode (100644, 100755, or 120000).
    pub mode: u32,
    pub id: ObjectId,
}

/// Parsed or under-construction manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    /// Tip commit this manifest corresponds to.
    pub tip: ObjectId,
    rows: BTreeMap<String, ManifestRow>,
}

impl Manifest {
    /// Creates an empty manifest for `tip`.
    #[must_use]
    pub fn new(tip: ObjectId) -> Self {
        Self {
            tip,
            rows: BTreeMap::new(),
        }
    }

    /// Records a path; a later insert for the same path wins.
    pub fn insert(&mut self, path: String, mode: u32, id: ObjectId) {
        self.rows.insert(path, ManifestRow { mode, id });
    }

    /// Row for a path, if tracked.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ManifestRow> {
        self.rows.get(path)
    }

    /// Number of tracked paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no paths are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates rows in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestRow)> {
        self.rows.iter()
    }

    /// Loads the manifest at `path`, `None` if the file does not exist.
    ///
    /// # Errors
    /// `ManifestError` on I/O failure or an unparseable line.
    pub fn load(path: &Path) -> Result<Option<Self>, ManifestError> {
        let text = match fs::read(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut lines = text.split(|&b| b == b'\n');
        let tip_line = lines.next().ok_or(ManifestError::Malformed {
            line: 1,
            detail: "empty manifest",
        })?;
        let tip = ObjectId::from_hex(tip_line).map_err(|_| ManifestError::Malformed {
            line: 1,
            detail: "tip is not a hex hash",
        })?;

        let mut manifest = Self::new(tip);
        for (index, line) in lines.enumerate() {
            if line.is_empty() {
                continue;
            }
            let line_no = index + 2;
            let mut fields = line.splitn(3, |&b| b == b'\t');
            let mode_field = fields.next().ok_or(ManifestError::Malformed {
                line: line_no,
                detail: "missing mode",
            })?;
            let hex_field = fields.next().ok_or(ManifestError::Malformed {
                line: line_no,
                detail: "missing hash",
            })?;
            let path_field = fields.next().ok_or(ManifestError::Malformed {
                line: line_no,
                detail: "missing path",
            })?;

            let mode = parse_octal(mode_field).ok_or(ManifestError::Malformed {
                line: line_no,
                detail: "mode is not octal",
            })?;
            let id = ObjectId::from_hex(hex_field).map_err(|_| ManifestError::Malformed {
                line: line_no,
                detail: "hash is not hex",
            })?;
            let path = std::str::from_utf8(path_field)
                .map_err(|_| ManifestError::Malformed {
                    line: line_no,
                    detail: "path is not UTF-8",
                })?
                .to_string();
            if path.is_empty() {
                return Err(ManifestError::Malformed {
                    line: line_no,
                    detail: "empty path",
                });
            }
            manifest.rows.insert(path, ManifestRow { mode, id });
        }
        Ok(Some(manifest))
    }

    /// Serializes rows sorted by path.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.rows.len() * 64);
        out.extend_from_slice(self.tip.to_hex().as_bytes());
        out.push(b'\n');
        for (path, row) in &self.rows {
            out.extend_from_slice(format!("{:o}\t{}\t{path}\n", row.mode, row.id).as_bytes());
        }
        out
    }

    /// Writes the staging file `<live>.new` without renaming it.
    ///
    /// Used on the failure path so a partial run leaves evidence while
    /// the live manifest stays authoritative.
    ///
    /// # Errors
    /// `ManifestError::Io` on write failure.
    pub fn stage(&self, live: &Path) -> Result<(), ManifestError> {
        let staging = staging_path(live);
        let mut file = fs::File::create(&staging)?;
        file.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Stages and atomically renames over the live manifest.
    ///
    /// # Errors
    /// `ManifestError::Io` on write or rename failure.
    pub fn commit(&self, live: &Path) -> Result<(), ManifestError> {
        self.stage(live)?;
        fs::rename(staging_path(live), live)?;
        Ok(())
    }
}

fn staging_path(live: &Path) -> std::path::PathBuf {
    let mut name = live.as_os_str().to_os_string();
    name.push(".new");
    name.into()
}

fn parse_octal(field: &[u8]) -> Option<u32> {
    if field.is_empty() || field.len() > 7 {
        return None;
    }
    let mut mode = 0u32;
    for &b in field {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        mode = (mode << 3) | (b - b'0') as u32;
    }
    Some(mode)
}
