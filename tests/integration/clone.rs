//! End-to-end clone sessions over the scripted transport.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use mirror_rs::manifest::Manifest;
use mirror_rs::object_id::{hash_object, ObjectKind};
use mirror_rs::{Command, Outcome, Session};

use crate::fixtures::{
    advertisement, chunked_response, commit_payload, fetch_response, first_byte_delta,
    options_for, single_blob_repo, tree_payload, PackBuilder, ScriptedTransport,
};

#[test]
fn empty_repo_clone_writes_tip_only_manifest() {
    let scratch = tempfile::tempdir().unwrap();
    let options = options_for(scratch.path());

    let pack = PackBuilder::new().seal();
    let tip = hash_object(ObjectKind::Commit, b"unreachable tip");
    let transport = ScriptedTransport::new(vec![
        chunked_response(&advertisement("main", &tip), 64),
        chunked_response(&fetch_response(&pack), 64),
    ]);

    let manifest_path = options.manifest_path();
    let target = options.target_directory.clone();
    let mut session = Session::new(options, transport);
    let outcome = session.run(Command::Clone).unwrap();

    assert!(matches!(outcome, Outcome::Cloned(_)));
    assert!(target.is_dir());
    assert_eq!(fs::read_dir(&target).unwrap().count(), 0);

    let manifest = Manifest::load(&manifest_path).unwrap().unwrap();
    assert_eq!(manifest.tip, tip);
    assert!(manifest.is_empty());
}

#[test]
fn single_blob_clone_materializes_file_and_manifest() {
    let scratch = tempfile::tempdir().unwrap();
    let options = options_for(scratch.path());

    let (pack, tip, blob_id) = single_blob_repo(b"Hello\n", "hello.txt");
    let transport = ScriptedTransport::new(vec![
        chunked_response(&advertisement("main", &tip), 48),
        chunked_response(&fetch_response(&pack), 48),
    ]);

    let manifest_path = options.manifest_path();
    let target = options.target_directory.clone();
    let mut session = Session::new(options, transport);
    let outcome = session.run(Command::Clone).unwrap();

    let report = match outcome {
        Outcome::Cloned(report) => report,
        other => panic!("expected clone, got {other:?}"),
    };
    assert_eq!(report.tip, tip);
    assert_eq!(report.writes.files_written, 1);

    let path = target.join("hello.txt");
    assert_eq!(fs::read(&path).unwrap(), b"Hello\n");
    assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o644);

    let manifest = Manifest::load(&manifest_path).unwrap().unwrap();
    assert_eq!(manifest.tip, tip);
    assert_eq!(manifest.len(), 1);
    let row = manifest.get("hello.txt").unwrap();
    assert_eq!(row.mode, 0o100644);
    assert_eq!(row.id, blob_id);
}

#[test]
fn symlink_entry_materializes_as_symlink() {
    let scratch = tempfile::tempdir().unwrap();
    let options = options_for(scratch.path());

    let file_blob = hash_object(ObjectKind::Blob, b"Hello\n");
    let link_blob = hash_object(ObjectKind::Blob, b"hello.txt");
    let tree = tree_payload(&[
        ("100644", "hello.txt", file_blob),
        ("120000", "link", link_blob),
    ]);
    let tree_id = hash_object(ObjectKind::Tree, &tree);
    let commit = commit_payload(&tree_id);
    let tip = hash_object(ObjectKind::Commit, &commit);

    let mut builder = PackBuilder::new();
    builder.push_object(ObjectKind::Commit, &commit);
    builder.push_object(ObjectKind::Tree, &tree);
    builder.push_object(ObjectKind::Blob, b"Hello\n");
    builder.push_object(ObjectKind::Blob, b"hello.txt");
    let pack = builder.seal();

    let transport = ScriptedTransport::new(vec![
        chunked_response(&advertisement("main", &tip), 64),
        chunked_response(&fetch_response(&pack), 64),
    ]);

    let target = options.target_directory.clone();
    let mut session = Session::new(options, transport);
    session.run(Command::Clone).unwrap();

    let link = target.join("link");
    assert_eq!(fs::read_link(&link).unwrap().as_os_str(), "hello.txt");
    assert_eq!(fs::read(&link).unwrap(), b"Hello\n");
}

#[test]
fn ofs_delta_chain_materializes_both_blobs() {
    let scratch = tempfile::tempdir().unwrap();
    let options = options_for(scratch.path());

    let base_blob = hash_object(ObjectKind::Blob, b"AAAA");
    let derived_blob = hash_object(ObjectKind::Blob, b"BAAA");
    let tree = tree_payload(&[
        ("100644", "base.txt", base_blob),
        ("100644", "derived.txt", derived_blob),
    ]);
    let tree_id = hash_object(ObjectKind::Tree, &tree);
    let commit = commit_payload(&tree_id);
    let tip = hash_object(ObjectKind::Commit, &commit);

    let mut builder = PackBuilder::new();
    builder.push_object(ObjectKind::Commit, &commit);
    builder.push_object(ObjectKind::Tree, &tree);
    let base_offset = builder.push_object(ObjectKind::Blob, b"AAAA");
    builder.push_ofs_delta(base_offset, &first_byte_delta(b"AAAA", b'B'));
    let pack = builder.seal();

    let transport = ScriptedTransport::new(vec![
        chunked_response(&advertisement("main", &tip), 32),
        chunked_response(&fetch_response(&pack), 32),
    ]);

    let target = options.target_directory.clone();
    let mut session = Session::new(options, transport);
    let outcome = session.run(Command::Clone).unwrap();

    assert_eq!(fs::read(target.join("base.txt")).unwrap(), b"AAAA");
    assert_eq!(fs::read(target.join("derived.txt")).unwrap(), b"BAAA");
    match outcome {
        Outcome::Cloned(report) => assert_eq!(report.resolve.resolved, 1),
        other => panic!("expected clone, got {other:?}"),
    }
}

#[test]
fn kept_pack_replays_without_network() {
    let scratch = tempfile::tempdir().unwrap();
    let mut options = options_for(scratch.path());
    options.keep_pack = true;

    let (pack, tip, _) = single_blob_repo(b"Hello\n", "hello.txt");
    let transport = ScriptedTransport::new(vec![
        chunked_response(&advertisement("main", &tip), 64),
        chunked_response(&fetch_response(&pack), 64),
    ]);

    let pack_path = options.pack_path();
    let target = options.target_directory.clone();
    let mut session = Session::new(options.clone(), transport);
    session.run(Command::Clone).unwrap();

    // The cached pack is bit-exact.
    assert_eq!(fs::read(&pack_path).unwrap(), pack);

    // Second run replays the cache; the manual want override skips
    // discovery, so no request reaches the transport at all.
    fs::remove_dir_all(&target).unwrap();
    options.keep_pack = false;
    options.use_pack = true;
    options.want = Some(tip);

    let replay = ScriptedTransport::new(Vec::new());
    let log = replay.request_log();
    let mut session = Session::new(options, replay);
    session.run(Command::Clone).unwrap();

    assert!(log.borrow().is_empty());
    assert_eq!(fs::read(target.join("hello.txt")).unwrap(), b"Hello\n");
}

#[test]
fn executable_mode_is_applied() {
    let scratch = tempfile::tempdir().unwrap();
    let options = options_for(scratch.path());

    let script_blob = hash_object(ObjectKind::Blob, b"#!/bin/sh\nexit 0\n");
    let tree = tree_payload(&[("100755", "run.sh", script_blob)]);
    let tree_id = hash_object(ObjectKind::Tree, &tree);
    let commit = commit_payload(&tree_id);
    let tip = hash_object(ObjectKind::Commit, &commit);

    let mut builder = PackBuilder::new();
    builder.push_object(ObjectKind::Commit, &commit);
    builder.push_object(ObjectKind::Tree, &tree);
    builder.push_object(ObjectKind::Blob, b"#!/bin/sh\nexit 0\n");
    let pack = builder.seal();

    let transport = ScriptedTransport::new(vec![
        chunked_response(&advertisement("main", &tip), 64),
        chunked_response(&fetch_response(&pack), 64),
    ]);

    let target = options.target_directory.clone();
    let mut session = Session::new(options, transport);
    session.run(Command::Clone).unwrap();

    let mode = fs::metadata(target.join("run.sh")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}
