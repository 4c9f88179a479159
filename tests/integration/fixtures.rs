//! Deterministic wire fixtures: hand-built packs, chunked HTTP responses,
//! and an in-memory recording transport.

use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use mirror_rs::object_id::{hash_object, hash_raw, ObjectId, ObjectKind};
use mirror_rs::options::Options;
use mirror_rs::transport::{Transport, TransportError};

pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

pub fn size_varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return out;
        }
    }
}

/// Entry header: 3-bit type code plus the size in 4+7-bit groups.
fn entry_header(type_code: u8, mut size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut byte = (type_code << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size > 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    out.push(byte);
    out
}

/// Ofs-delta distance, big-endian-style continuation encoding.
fn ofs_distance(value: u64) -> Vec<u8> {
    let mut tail = (value & 0x7f) as u8;
    let mut rest = value >> 7;
    let mut out = vec![tail];
    while rest > 0 {
        rest -= 1;
        tail = 0x80 | (rest & 0x7f) as u8;
        out.insert(0, tail);
        rest >>= 7;
    }
    out
}

/// Incremental pack assembler tracking entry offsets.
pub struct PackBuilder {
    body: Vec<u8>,
    count: u32,
}

impl PackBuilder {
    pub fn new() -> Self {
        Self {
            body: Vec::new(),
            count: 0,
        }
    }

    /// Offset the next pushed entry will land on.
    pub fn next_offset(&self) -> u64 {
        12 + self.body.len() as u64
    }

    pub fn push_object(&mut self, kind: ObjectKind, payload: &[u8]) -> u64 {
        let type_code = match kind {
            ObjectKind::Commit => 1,
            ObjectKind::Tree => 2,
            ObjectKind::Blob => 3,
            ObjectKind::Tag => 4,
        };
        let offset = self.next_offset();
        self.body.extend_from_slice(&entry_header(type_code, payload.len()));
        self.body.extend_from_slice(&deflate(payload));
        self.count += 1;
        offset
    }

    pub fn push_ofs_delta(&mut self, base_offset: u64, delta: &[u8]) -> u64 {
        let offset = self.next_offset();
        self.body.extend_from_slice(&entry_header(6, delta.len()));
        self.body.extend_from_slice(&ofs_distance(offset - base_offset));
        self.body.extend_from_slice(&deflate(delta));
        self.count += 1;
        offset
    }

    pub fn push_ref_delta(&mut self, base: &ObjectId, delta: &[u8]) -> u64 {
        let offset = self.next_offset();
        self.body.extend_from_slice(&entry_header(7, delta.len()));
        self.body.extend_from_slice(base.as_bytes());
        self.body.extend_from_slice(&deflate(delta));
        self.count += 1;
        offset
    }

    pub fn seal(self) -> Vec<u8> {
        let mut pack = Vec::new();
        pack.extend_from_slice(b"PACK");
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&self.count.to_be_bytes());
        pack.extend_from_slice(&self.body);
        let digest = hash_raw(&pack);
        pack.extend_from_slice(digest.as_bytes());
        pack
    }
}

/// Tree payload from (mode, name, id) triples, in the given order.
pub fn tree_payload(entries: &[(&str, &str, ObjectId)]) -> Vec<u8> {
    let mut payload = Vec::new();
    for (mode, name, id) in entries {
        payload.extend_from_slice(mode.as_bytes());
        payload.push(b' ');
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        payload.extend_from_slice(id.as_bytes());
    }
    payload
}

/// Minimal commit payload pointing at `tree`.
pub fn commit_payload(tree: &ObjectId) -> Vec<u8> {
    format!(
        "tree {tree}\n\
         author Mirror <mirror@example.org> 1700000000 +0000\n\
         committer Mirror <mirror@example.org> 1700000000 +0000\n\
         \n\
         fixture commit\n"
    )
    .into_bytes()
}

/// Delta that rewrites the base's first byte and copies the rest.
pub fn first_byte_delta(base: &[u8], first: u8) -> Vec<u8> {
    let mut delta = size_varint(base.len() as u64);
    delta.extend_from_slice(&size_varint(base.len() as u64));
    delta.push(0x01);
    delta.push(first);
    delta.push(0x91);
    delta.push(0x01);
    delta.push((base.len() - 1) as u8);
    delta
}

/// Wraps a body in a chunked 200 response, splitting every `chunk` bytes.
pub fn chunked_response(body: &[u8], chunk: usize) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");
    for piece in body.chunks(chunk.max(1)) {
        raw.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
        raw.extend_from_slice(piece);
        raw.extend_from_slice(b"\r\n");
    }
    raw.extend_from_slice(b"0\r\n\r\n");
    raw
}

/// Smart discovery advertisement naming one branch.
pub fn advertisement(branch: &str, tip: &ObjectId) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"001e# service=git-upload-pack\n0000");
    body.extend_from_slice(
        format!("0052{tip} HEAD\0side-band-64k agent=git/fixture-1.0\n").as_bytes(),
    );
    let line = format!("{tip} refs/heads/{branch}\n");
    body.extend_from_slice(format!("{:04x}{line}", line.len() + 4).as_bytes());
    body.extend_from_slice(b"0000");
    body
}

/// Protocol-v2 fetch response carrying `pack` over side-band-64k.
pub fn fetch_response(pack: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    put_line(&mut body, b"packfile\n");
    for piece in pack.chunks(900) {
        let mut frame = Vec::with_capacity(piece.len() + 1);
        frame.push(1u8);
        frame.extend_from_slice(piece);
        put_line(&mut body, &frame);
    }
    body.extend_from_slice(b"0000");
    body
}

fn put_line(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(format!("{:04x}", payload.len() + 4).as_bytes());
    out.extend_from_slice(payload);
}

/// In-memory transport: canned responses out, request log in.
pub struct ScriptedTransport {
    responses: Vec<Vec<u8>>,
    requests: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl ScriptedTransport {
    pub fn new(mut responses: Vec<Vec<u8>>) -> Self {
        responses.reverse();
        Self {
            responses,
            requests: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Shared handle to the request log, usable after the session takes
    /// ownership of the transport.
    pub fn request_log(&self) -> Rc<RefCell<Vec<Vec<u8>>>> {
        Rc::clone(&self.requests)
    }
}

impl Transport for ScriptedTransport {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.requests.borrow_mut().push(request.to_vec());
        self.responses
            .pop()
            .ok_or_else(|| TransportError::Io(std::io::Error::other("no scripted response left")))
    }
}

/// Options rooted in a scratch directory.
pub fn options_for(root: &Path) -> Options {
    Options {
        host: "mirror.example.org".to_string(),
        port: 80,
        repository_path: "/acme/widgets".to_string(),
        branch: "main".to_string(),
        target_directory: root.join("worktree"),
        work_directory: root.join("work"),
        label: "widgets".to_string(),
        want: None,
        have: None,
        clone: false,
        keep_pack: false,
        use_pack: false,
        verbosity: 0,
    }
}

/// Builds the canonical single-file repository fixture.
///
/// Returns (pack bytes, tip id, blob id).
pub fn single_blob_repo(contents: &[u8], name: &str) -> (Vec<u8>, ObjectId, ObjectId) {
    let blob_id = hash_object(ObjectKind::Blob, contents);
    let tree = tree_payload(&[("100644", name, blob_id)]);
    let tree_id = hash_object(ObjectKind::Tree, &tree);
    let commit = commit_payload(&tree_id);
    let tip = hash_object(ObjectKind::Commit, &commit);

    let mut builder = PackBuilder::new();
    builder.push_object(ObjectKind::Commit, &commit);
    builder.push_object(ObjectKind::Tree, &tree);
    builder.push_object(ObjectKind::Blob, contents);
    (builder.seal(), tip, blob_id)
}
