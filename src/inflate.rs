//! Bounded zlib inflation for pack entry payloads.
//!
//! Pack entries embed raw zlib streams back to back; the inflater must
//! report how many compressed bytes it consumed so the pack cursor can
//! advance to the next entry. Output is capped by the declared uncompressed
//! size, so a corrupt stream cannot allocate unboundedly.
//!
//! A per-thread `Decompress` and staging buffer are reused across calls to
//! avoid repeated allocator and zlib setup costs. The helpers are not
//! re-entrant on one thread.

use std::cell::RefCell;
use std::fmt;

use flate2::{Decompress, FlushDecompress, Status};

const STAGE_BUF_SIZE: usize = 64 * 1024;

thread_local! {
    static SCRATCH: RefCell<(Decompress, Box<[u8; STAGE_BUF_SIZE]>)> =
        RefCell::new((Decompress::new(true), Box::new([0u8; STAGE_BUF_SIZE])));
}

/// Errors from zlib inflation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InflateError {
    /// The zlib backend rejected the stream.
    Failure,
    /// The stream ended with a different byte count than declared.
    SizeMismatch { produced: usize, declared: usize },
    /// The input ended before the stream did.
    Truncated,
    /// The decompressor made no progress with input remaining.
    Stalled,
}

impl fmt::Display for InflateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure => write!(f, "zlib stream error"),
            Self::SizeMismatch { produced, declared } => {
                write!(f, "inflated {produced} bytes, entry declared {declared}")
            }
            Self::Truncated => write!(f, "zlib stream truncated"),
            Self::Stalled => write!(f, "zlib stream stalled"),
        }
    }
}

impl std::error::Error for InflateError {}

/// Inflates one zlib stream from the front of `input`, expecting exactly
/// `declared` output bytes.
///
/// Returns the number of compressed input bytes consumed. The output buffer
/// is cleared first; on error it may hold a partial prefix that callers
/// should discard.
///
/// # Errors
/// - `SizeMismatch` if the stream ends early or would overrun `declared`.
/// - `Truncated` / `Stalled` / `Failure` for malformed input.
pub fn inflate_entry(
    input: &[u8],
    out: &mut Vec<u8>,
    declared: usize,
) -> Result<usize, InflateError> {
    out.clear();
    out.reserve(declared);

    SCRATCH.with(|cell| {
        let (de, stage) = &mut *cell.borrow_mut();
        de.reset(true);

        let mut consumed_total = 0usize;
        loop {
            let before_in = de.total_in() as usize;
            let before_out = de.total_out() as usize;

            let status = de
                .decompress(&input[consumed_total..], &mut stage[..], FlushDecompress::None)
                .map_err(|_| InflateError::Failure)?;

            let consumed = de.total_in() as usize - before_in;
            let produced = de.total_out() as usize - before_out;
            consumed_total += consumed;

            if produced != 0 {
                if out.len() + produced > declared {
                    return Err(InflateError::SizeMismatch {
                        produced: out.len() + produced,
                        declared,
                    });
                }
                out.extend_from_slice(&stage[..produced]);
            }

            match status {
                Status::StreamEnd => {
                    if out.len() != declared {
                        return Err(InflateError::SizeMismatch {
                            produced: out.len(),
                            declared,
                        });
                    }
                    return Ok(consumed_total);
                }
                Status::Ok => {
                    if consumed == 0 && produced == 0 {
                        if consumed_total >= input.len() {
                            return Err(InflateError::Truncated);
                        }
                        return Err(InflateError::Stalled);
                    }
                }
                Status::BufError => {
                    if consumed_total >= input.len() {
                        return Err(InflateError::Truncated);
                    }
                }
            }
        }
    })
}
