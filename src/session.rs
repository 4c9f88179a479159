//! Session orchestration: clone, pull, verify.
//!
//! One session drives the whole wire-to-worktree pipeline strictly in
//! sequence: local scan, tip discovery, pack fetch, unpack, delta
//! resolution, worktree materialization, manifest commit. Every stage
//! fully consumes its predecessor's output; there is no concurrency.
//!
//! Failure policy: no retries. The one recoverable condition is a
//! thin-pack ref-delta base missing from the pack: the session supplies
//! the blob from the matching locally-scanned file and re-drives the
//! resolver, bounded by `max_resolve_passes`. On any other error the new
//! manifest is staged (never renamed) and the error escapes.

use std::fs;

use crate::chunked::decode_response;
use crate::errors::{MirrorError, VerifyError};
use crate::limits::Limits;
use crate::manifest::Manifest;
use crate::object_id::{hash_object, ObjectId, ObjectKind};
use crate::options::{Command, Options};
use crate::pack::{unpack, PackError, PackStats};
use crate::pkt_line::demux_sideband;
use crate::protocol::{discovery_request, fetch_request, parse_advertisement, FetchSpec};
use crate::resolve::{resolve_deltas, ResolveError, ResolveStats};
use crate::scan::{scan_worktree, LocalState};
use crate::store::{Object, ObjectStore};
use crate::transport::Transport;
use crate::worktree::{materialize, WriteStats};

/// Stats and notes from one completed fetch session.
#[derive(Clone, Debug)]
pub struct SessionReport {
    /// Tip commit the worktree now mirrors.
    pub tip: ObjectId,
    pub pack: PackStats,
    pub resolve: ResolveStats,
    pub writes: WriteStats,
    /// Thin-pack bases materialized from local files.
    pub recovered_bases: u32,
    /// Divergence noticed between the prior manifest and the disk scan.
    pub warnings: Vec<String>,
}

/// Outcome of a session run.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Full fetch materialized a fresh worktree.
    Cloned(SessionReport),
    /// Incremental fetch brought the worktree up to date.
    Updated(SessionReport),
    /// The remote tip matches the manifest; nothing fetched or written.
    UpToDate { tip: ObjectId },
    /// Verify walked the manifest without finding divergence.
    Verified { checked: u32 },
}

/// One mirror invocation over a transport.
pub struct Session<T> {
    options: Options,
    transport: T,
    limits: Limits,
}

impl<T: Transport> Session<T> {
    /// Creates a session with default limits.
    #[must_use]
    pub fn new(options: Options, transport: T) -> Self {
        Self::with_limits(options, transport, Limits::DEFAULT)
    }

    /// Creates a session with explicit limits.
    ///
    /// # Panics
    /// Panics if `limits` fails validation.
    #[must_use]
    pub fn with_limits(options: Options, transport: T, limits: Limits) -> Self {
        limits.validate();
        Self {
            options,
            transport,
            limits,
        }
    }

    /// Runs one session shape to completion.
    ///
    /// # Errors
    /// `MirrorError` on any stage failure; see the crate error taxonomy.
    pub fn run(&mut self, command: Command) -> Result<Outcome, MirrorError> {
        match command {
            Command::Verify => self.verify(),
            Command::Clone => self.sync(true),
            Command::Pull => {
                let force = self.options.clone;
                self.sync(force)
            }
        }
    }

    /// Offline scan-versus-manifest comparison.
    fn verify(&self) -> Result<Outcome, MirrorError> {
        let manifest_path = self.options.manifest_path();
        let manifest = Manifest::load(&manifest_path)?.ok_or_else(|| {
            VerifyError::NoManifest {
                path: manifest_path.clone(),
            }
        })?;
        let scanned = scan_worktree(self.options.target())?;

        let mut checked = 0u32;
        for (path, row) in manifest.iter() {
            match scanned.file(path) {
                None => {
                    return Err(VerifyError::MissingLocalFile { path: path.clone() }.into());
                }
                Some(on_disk) => {
                    if on_disk.id != row.id || on_disk.mode != row.mode {
                        return Err(
                            VerifyError::ModifiedLocalFile { path: path.clone() }.into()
                        );
                    }
                }
            }
            checked += 1;
        }
        Ok(Outcome::Verified { checked })
    }

    /// Clone or pull, depending on manifest presence and `force_clone`.
    fn sync(&mut self, force_clone: bool) -> Result<Outcome, MirrorError> {
        fs::create_dir_all(&self.options.work_directory).map_err(MirrorError::Io)?;

        // Scan before any network activity; this also enforces the
        // foreign-metadata guard.
        let scanned = scan_worktree(self.options.target())?;

        let manifest_path = self.options.manifest_path();
        let prior = if force_clone {
            None
        } else {
            Manifest::load(&manifest_path)?
        };

        let (tip, agent) = self.discover()?;

        if let Some(prior) = &prior {
            if prior.tip == tip {
                return Ok(Outcome::UpToDate { tip });
            }
        }

        let warnings = prior
            .as_ref()
            .map(|prior| divergence_warnings(prior, &scanned))
            .unwrap_or_default();

        let spec = match &prior {
            None => FetchSpec {
                wants: vec![tip],
                haves: Vec::new(),
                shallows: vec![tip],
                deepen: None,
                thin_pack: false,
                no_progress: true,
                agent,
            },
            Some(prior) => {
                let old_tip = self.options.have.unwrap_or(prior.tip);
                FetchSpec {
                    wants: vec![tip],
                    haves: vec![old_tip],
                    shallows: vec![old_tip, tip],
                    deepen: Some(1),
                    thin_pack: true,
                    no_progress: false,
                    agent,
                }
            }
        };

        let pack_bytes = self.obtain_pack(&spec)?;

        let mut store = ObjectStore::new();
        let pack_stats = unpack(&pack_bytes, &mut store, &self.limits)?;
        let (resolve_stats, recovered_bases) =
            self.resolve_with_recovery(&mut store, &scanned)?;

        let mut manifest = Manifest::new(tip);
        let writes = if store.is_empty() {
            // An empty pack mirrors an empty branch: nothing to walk,
            // the manifest records only the tip.
            fs::create_dir_all(self.options.target()).map_err(MirrorError::Io)?;
            WriteStats::default()
        } else {
            match materialize(
                &store,
                &tip,
                self.options.target(),
                &scanned,
                &self.limits,
                &mut manifest,
            ) {
                Ok(writes) => writes,
                Err(err) => {
                    // Leave the staged partial record for inspection; the
                    // live manifest stays authoritative.
                    let _ = manifest.stage(&manifest_path);
                    return Err(err.into());
                }
            }
        };
        manifest.commit(&manifest_path)?;

        let report = SessionReport {
            tip,
            pack: pack_stats,
            resolve: resolve_stats,
            writes,
            recovered_bases,
            warnings,
        };
        Ok(if prior.is_none() {
            Outcome::Cloned(report)
        } else {
            Outcome::Updated(report)
        })
    }

    /// Resolves the remote tip, honoring the manual override.
    fn discover(&mut self) -> Result<(ObjectId, Option<String>), MirrorError> {
        if let Some(want) = self.options.want {
            return Ok((want, None));
        }
        let request = discovery_request(&self.options.host, &self.options.repository_path);
        let response = self.transport.exchange(&request)?;
        let body = decode_response(&response)?;
        let advertisement = parse_advertisement(&body, &self.options.branch)?;
        Ok((advertisement.tip, advertisement.agent))
    }

    /// Fetches pack bytes from the network or the local cache.
    fn obtain_pack(&mut self, spec: &FetchSpec) -> Result<Vec<u8>, MirrorError> {
        if self.options.use_pack {
            return fs::read(self.options.pack_path()).map_err(MirrorError::Io);
        }

        let request = fetch_request(&self.options.host, &self.options.repository_path, spec);
        let response = self.transport.exchange(&request)?;
        let body = decode_response(&response)?;
        let demuxed = demux_sideband(&body)?;

        if self.options.keep_pack {
            fs::write(self.options.pack_path(), &demuxed.pack).map_err(MirrorError::Io)?;
        }
        Ok(demuxed.pack)
    }

    /// Drives the resolver, feeding missing thin-pack bases from disk.
    fn resolve_with_recovery(
        &self,
        store: &mut ObjectStore,
        scanned: &LocalState,
    ) -> Result<(ResolveStats, u32), MirrorError> {
        let pending = store.delta_indexes().len() as u32;
        let mut recovered = 0u32;

        for _ in 0..self.limits.max_resolve_passes {
            match resolve_deltas(store, &self.limits) {
                Ok(stats) => {
                    return Ok((
                        ResolveStats {
                            resolved: pending,
                            longest_chain: stats.longest_chain,
                        },
                        recovered,
                    ));
                }
                Err(ResolveError::MissingRefBase { base }) => {
                    let path = scanned
                        .path_with_id(&base)
                        .ok_or(ResolveError::MissingRefBase { base })?;
                    let payload = scanned.blob_payload(path)?;
                    // The file may have changed since the scan; identity
                    // must still hold.
                    if hash_object(ObjectKind::Blob, &payload) != base {
                        return Err(ResolveError::MissingRefBase { base }.into());
                    }
                    store
                        .insert_object(Object {
                            kind: ObjectKind::Blob,
                            id: base,
                            payload,
                            pack_offset: None,
                        })
                        .map_err(PackError::from)?;
                    recovered += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ResolveError::TooManyPasses {
            max: self.limits.max_resolve_passes,
        }
        .into())
    }
}

/// Compares the prior manifest against the disk scan.
fn divergence_warnings(prior: &Manifest, scanned: &LocalState) -> Vec<String> {
    let mut warnings = Vec::new();
    for (path, row) in prior.iter() {
        match scanned.file(path) {
            None => warnings.push(format!("missing locally: {path}")),
            Some(on_disk) if on_disk.id != row.id || on_disk.mode != row.mode => {
                warnings.push(format!("modified locally: {path}"));
            }
            Some(_) => {}
        }
    }
    warnings
}
