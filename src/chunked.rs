//! HTTP/1.1 response splitting and chunked transfer decoding.
//!
//! The transport hands back a complete response byte buffer; this module
//! checks the status line, locates the header/body boundary, and undoes
//! chunked transfer framing into one contiguous payload. Chunk boundaries
//! may split protocol frames arbitrarily (including the pack magic), which
//! is harmless because all later stages operate on the concatenation.
//!
//! Bodies without `Transfer-Encoding: chunked` pass through unchanged.

use std::fmt;

use memchr::memmem;

/// Errors from response framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FramingError {
    /// No `\r\n\r\n` header/body boundary in the response.
    MissingHeaderBoundary,
    /// The status line is not `HTTP/1.x <code> ...`.
    MalformedStatusLine,
    /// The server answered with a non-success status.
    HttpStatus(u16),
    /// A chunk-size line is not valid hex.
    BadChunkSize,
    /// The body ended inside a chunk or before the zero terminator.
    TruncatedChunk,
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHeaderBoundary => write!(f, "response has no header/body boundary"),
            Self::MalformedStatusLine => write!(f, "malformed HTTP status line"),
            Self::HttpStatus(code) => write!(f, "HTTP status {code}"),
            Self::BadChunkSize => write!(f, "malformed chunk-size line"),
            Self::TruncatedChunk => write!(f, "chunked body truncated"),
        }
    }
}

impl std::error::Error for FramingError {}

/// Splits a raw response and returns the de-framed body payload.
///
/// # Errors
/// `FramingError` on a missing boundary, a non-2xx status, or malformed
/// chunk framing.
pub fn decode_response(raw: &[u8]) -> Result<Vec<u8>, FramingError> {
    let boundary =
        memmem::find(raw, b"\r\n\r\n").ok_or(FramingError::MissingHeaderBoundary)?;
    let head = &raw[..boundary];
    let body = &raw[boundary + 4..];

    let status = parse_status(head)?;
    if !(200..300).contains(&status) {
        return Err(FramingError::HttpStatus(status));
    }

    if header_declares_chunked(head) {
        decode_chunked(body)
    } else {
        Ok(body.to_vec())
    }
}

/// Parses the status code out of the first response line.
fn parse_status(head: &[u8]) -> Result<u16, FramingError> {
    let line_end = memmem::find(head, b"\r\n").unwrap_or(head.len());
    let line = &head[..line_end];
    if !line.starts_with(b"HTTP/1.") {
        return Err(FramingError::MalformedStatusLine);
    }
    let mut fields = line.split(|&b| b == b' ').filter(|f| !f.is_empty());
    let _version = fields.next();
    let code = fields.next().ok_or(FramingError::MalformedStatusLine)?;
    std::str::from_utf8(code)
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or(FramingError::MalformedStatusLine)
}

/// Case-insensitive scan for `Transfer-Encoding: chunked`.
fn header_declares_chunked(head: &[u8]) -> bool {
    let lower: Vec<u8> = head.iter().map(|b| b.to_ascii_lowercase()).collect();
    if let Some(pos) = memmem::find(&lower, b"transfer-encoding:") {
        let rest = &lower[pos + b"transfer-encoding:".len()..];
        let line_end = memmem::find(rest, b"\r\n").unwrap_or(rest.len());
        return memmem::find(&rest[..line_end], b"chunked").is_some();
    }
    false
}

/// Concatenates chunk bodies until the zero-size terminator.
///
/// Chunk extensions (`;` onwards on the size line) are tolerated and
/// ignored, as are any trailers after the terminal chunk.
fn decode_chunked(body: &[u8]) -> Result<Vec<u8>, FramingError> {
    let mut out = Vec::with_capacity(body.len());
    let mut pos = 0usize;

    loop {
        let rest = &body[pos..];
        let line_end = memmem::find(rest, b"\r\n").ok_or(FramingError::TruncatedChunk)?;
        let size_field = rest[..line_end]
            .split(|&b| b == b';')
            .next()
            .unwrap_or(&rest[..line_end]);
        let size = parse_hex_size(size_field)?;
        pos += line_end + 2;

        if size == 0 {
            return Ok(out);
        }
        let data_end = pos.checked_add(size).ok_or(FramingError::BadChunkSize)?;
        if data_end + 2 > body.len() {
            return Err(FramingError::TruncatedChunk);
        }
        out.extend_from_slice(&body[pos..data_end]);
        if &body[data_end..data_end + 2] != b"\r\n" {
            return Err(FramingError::TruncatedChunk);
        }
        pos = data_end + 2;
    }
}

fn parse_hex_size(field: &[u8]) -> Result<usize, FramingError> {
    if field.is_empty() || field.len() > 8 {
        return Err(FramingError::BadChunkSize);
    }
    let mut size = 0usize;
    for &b in field {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(FramingError::BadChunkSize),
        };
        size = (size << 4) | digit as usize;
    }
    Ok(size)
}
