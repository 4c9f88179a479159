//! Smart-protocol request construction and ref advertisement parsing.
//!
//! Two requests are spoken: the `info/refs` discovery GET, whose body
//! advertises branch tips and server capabilities, and the
//! `git-upload-pack` fetch POST, whose protocol-v2 pkt-line body names the
//! wanted and held tips. Responses are decoded elsewhere
//! ([`crate::chunked`], [`crate::pkt_line`]); this module only scans the
//! advertisement text.

use std::fmt;

use memchr::memmem;

use crate::object_id::{ObjectId, HEX_LEN};
use crate::pkt_line::{put_data_line, put_delim, put_flush};

/// Client identity offered in request headers.
pub const USER_AGENT: &str = "git/2.41.0";

/// Errors from tip discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The advertisement lacks the requested branch.
    BranchNotFound { branch: String },
    /// The advertised tip is not a hex hash.
    MalformedAdvertisement,
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BranchNotFound { branch } => {
                write!(f, "branch {branch} not advertised by remote")
            }
            Self::MalformedAdvertisement => write!(f, "malformed ref advertisement"),
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// Parsed discovery result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advertisement {
    /// Tip commit of the requested branch.
    pub tip: ObjectId,
    /// Server-advertised agent string, if present.
    pub agent: Option<String>,
}

/// Builds the discovery GET request.
#[must_use]
pub fn discovery_request(host: &str, repository_path: &str) -> Vec<u8> {
    format!(
        "GET {repository_path}/info/refs?service=git-upload-pack HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: {USER_AGENT}\r\n\
         Connection: close\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Fetch request parameters.
#[derive(Clone, Debug, Default)]
pub struct FetchSpec {
    /// Tips to request.
    pub wants: Vec<ObjectId>,
    /// Tips already held locally.
    pub haves: Vec<ObjectId>,
    /// Shallow boundary commits.
    pub shallows: Vec<ObjectId>,
    /// Depth to deepen to; incremental fetches ask for 1.
    pub deepen: Option<u32>,
    /// Permit bases outside the returned pack.
    pub thin_pack: bool,
    /// Suppress progress side-band chatter.
    pub no_progress: bool,
    /// Agent echoed back from discovery.
    pub agent: Option<String>,
}

/// Builds the fetch POST request with a protocol-v2 pkt-line body.
#[must_use]
pub fn fetch_request(host: &str, repository_path: &str, spec: &FetchSpec) -> Vec<u8> {
    let mut body = Vec::new();
    put_data_line(&mut body, b"command=fetch\n");
    if let Some(agent) = &spec.agent {
        put_data_line(&mut body, format!("agent={agent}\n").as_bytes());
    }
    put_delim(&mut body);
    if spec.no_progress {
        put_data_line(&mut body, b"no-progress\n");
    }
    put_data_line(&mut body, b"ofs-delta\n");
    if spec.thin_pack {
        put_data_line(&mut body, b"thin-pack\n");
    }
    for shallow in &spec.shallows {
        put_data_line(&mut body, format!("shallow {shallow}\n").as_bytes());
    }
    if let Some(depth) = spec.deepen {
        put_data_line(&mut body, format!("deepen {depth}\n").as_bytes());
    }
    for want in &spec.wants {
        put_data_line(&mut body, format!("want {want}\n").as_bytes());
    }
    for have in &spec.haves {
        put_data_line(&mut body, format!("have {have}\n").as_bytes());
    }
    put_data_line(&mut body, b"done\n");
    put_flush(&mut body);

    let mut request = format!(
        "POST {repository_path}/git-upload-pack HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: {USER_AGENT}\r\n\
         Accept: application/x-git-upload-pack-result\r\n\
         Content-Type: application/x-git-upload-pack-request\r\n\
         Content-Length: {}\r\n\
         Git-Protocol: version=2\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(&body);
    request
}

/// Scans a ref advertisement for the branch tip and the server agent.
///
/// NULs are normalized to newlines first so the capability list glued to
/// the first ref line does not hide a match. The tip is the 40 hex
/// characters immediately preceding ` refs/heads/<branch>\n`.
///
/// # Errors
/// `BranchNotFound` when the needle is absent, `MalformedAdvertisement`
/// when the preceding bytes are not a hash.
pub fn parse_advertisement(body: &[u8], branch: &str) -> Result<Advertisement, DiscoveryError> {
    let mut text: Vec<u8> = body
        .iter()
        .map(|&b| if b == 0 { b'\n' } else { b })
        .collect();
    if text.last() != Some(&b'\n') {
        text.push(b'\n');
    }

    let needle = format!(" refs/heads/{branch}\n");
    let pos = memmem::find(&text, needle.as_bytes()).ok_or_else(|| {
        DiscoveryError::BranchNotFound {
            branch: branch.to_string(),
        }
    })?;
    if pos < HEX_LEN {
        return Err(DiscoveryError::MalformedAdvertisement);
    }
    let tip = ObjectId::from_hex(&text[pos - HEX_LEN..pos])
        .map_err(|_| DiscoveryError::MalformedAdvertisement)?;

    Ok(Advertisement {
        tip,
        agent: scan_agent(&text),
    })
}

/// Extracts `agent=<string>` from the advertisement, if present.
fn scan_agent(text: &[u8]) -> Option<String> {
    let pos = memmem::find(text, b"agent=")?;
    let rest = &text[pos + b"agent=".len()..];
    let end = rest
        .iter()
        .position(|&b| b == b'\n' || b == b' ' || b == b'\0')
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&rest[..end]).into_owned())
}
