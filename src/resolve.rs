//! Delta resolution: materialize every delta entry against its base.
//!
//! Resolution runs in insertion order and follows each delta's base edge
//! with an explicit work stack, so arbitrarily long chains never recurse
//! on the call stack. Ofs-delta bases are located by backward pack offset,
//! ref-delta bases by content hash; a ref base can also be satisfied by an
//! object inserted from outside the pack (the thin-pack recovery path).
//!
//! A reconstructed object inherits its base's kind, is hashed, and
//! replaces the delta slot in the store. After a successful pass the store
//! holds no delta entries.
//!
//! # Invariants
//! - Chains are acyclic by construction (ofs edges point strictly
//!   backward); a visited guard still aborts with `Cycle` on a back-edge.
//! - A `MissingRefBase` failure names the base hash so the session can
//!   supply the object and re-drive.

use std::fmt;

use ahash::AHashSet;

use crate::delta::{apply_delta, DeltaError};
use crate::limits::Limits;
use crate::object_id::{hash_object, ObjectId};
use crate::store::{DeltaBase, Object, ObjectStore, StoreEntry};

/// Errors from delta resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResolveError {
    /// Ofs-delta distance does not land on an entry.
    MissingOfsBase { delta_offset: u64, distance: u64 },
    /// Ref-delta base hash is not in the store.
    ///
    /// The sole recoverable failure: the session may insert the named
    /// object and resolve again.
    MissingRefBase { base: ObjectId },
    /// A base edge loops back into the chain being resolved.
    Cycle { pack_offset: u64 },
    /// Recovery re-drives exceeded the configured cap.
    ///
    /// Raised by the session's recovery loop, not by a single pass.
    TooManyPasses { max: usize },
    /// Instruction replay failed.
    Delta(DeltaError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOfsBase {
                delta_offset,
                distance,
            } => write!(
                f,
                "no base entry {distance} bytes before pack offset {delta_offset}"
            ),
            Self::MissingRefBase { base } => write!(f, "missing delta base {base}"),
            Self::Cycle { pack_offset } => {
                write!(f, "delta cycle through pack offset {pack_offset}")
            }
            Self::TooManyPasses { max } => {
                write!(f, "delta resolution did not converge in {max} passes")
            }
            Self::Delta(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Delta(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeltaError> for ResolveError {
    fn from(err: DeltaError) -> Self {
        Self::Delta(err)
    }
}

/// Outcome tally of one resolution pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Delta entries materialized this pass.
    pub resolved: u32,
    /// Longest base chain walked.
    pub longest_chain: u32,
}

/// Materializes every delta entry in the store.
///
/// # Errors
/// `ResolveError` on a missing base, a cycle, or instruction replay
/// failure. On error the store keeps all progress made so far; a
/// `MissingRefBase` caller can insert the base and call again.
pub fn resolve_deltas(store: &mut ObjectStore, limits: &Limits) -> Result<ResolveStats, ResolveError> {
    let mut stats = ResolveStats::default();

    for start in store.delta_indexes() {
        let mut stack = vec![start];
        let mut on_stack: AHashSet<usize> = AHashSet::from_iter([start]);
        stats.longest_chain = stats.longest_chain.max(1);

        while let Some(&top) = stack.last() {
            let delta = match store.entry(top) {
                StoreEntry::Object(_) => {
                    stack.pop();
                    on_stack.remove(&top);
                    continue;
                }
                StoreEntry::Delta(delta) => delta,
            };

            // Locate the base slot, or fail with the precise miss.
            let base_index = match delta.base {
                DeltaBase::Ofs(distance) => {
                    let delta_offset = delta.pack_offset;
                    if distance == 0 || distance > delta_offset {
                        return Err(ResolveError::MissingOfsBase {
                            delta_offset,
                            distance,
                        });
                    }
                    store
                        .index_at_offset(delta_offset - distance)
                        .ok_or(ResolveError::MissingOfsBase {
                            delta_offset,
                            distance,
                        })?
                }
                DeltaBase::Ref(base) => match store.by_id(&base) {
                    Some(_) => usize::MAX, // marker: base already concrete
                    None => return Err(ResolveError::MissingRefBase { base }),
                },
            };

            // Base itself unresolved: walk down the chain first.
            if base_index != usize::MAX {
                if let StoreEntry::Delta(_) = store.entry(base_index) {
                    if !on_stack.insert(base_index) {
                        return Err(ResolveError::Cycle {
                            pack_offset: delta.pack_offset,
                        });
                    }
                    stack.push(base_index);
                    stats.longest_chain = stats.longest_chain.max(stack.len() as u32);
                    continue;
                }
            }

            let (kind, payload) = {
                let base = match delta.base {
                    DeltaBase::Ref(id) => {
                        store.by_id(&id).ok_or(ResolveError::MissingRefBase { base: id })?
                    }
                    DeltaBase::Ofs(_) => match store.entry(base_index) {
                        StoreEntry::Object(obj) => obj,
                        StoreEntry::Delta(_) => unreachable!("base resolved above"),
                    },
                };
                let payload =
                    apply_delta(&base.payload, &delta.payload, limits.max_object_bytes)?;
                (base.kind, payload)
            };

            let pack_offset = delta.pack_offset;
            store.resolve_slot(
                top,
                Object {
                    kind,
                    id: hash_object(kind, &payload),
                    payload,
                    pack_offset: Some(pack_offset),
                },
            );
            stats.resolved += 1;
            stack.pop();
            on_stack.remove(&top);
        }
    }

    Ok(stats)
}
