//! Offline verify sessions.

use std::fs;

use mirror_rs::{Command, MirrorError, Outcome, Session, VerifyError};

use crate::fixtures::{
    advertisement, chunked_response, fetch_response, options_for, single_blob_repo,
    ScriptedTransport,
};

fn cloned_worktree(scratch: &std::path::Path) -> mirror_rs::Options {
    let options = options_for(scratch);
    let (pack, tip, _) = single_blob_repo(b"Hello\n", "hello.txt");
    let transport = ScriptedTransport::new(vec![
        chunked_response(&advertisement("main", &tip), 64),
        chunked_response(&fetch_response(&pack), 64),
    ]);
    let mut session = Session::new(options.clone(), transport);
    session.run(Command::Clone).unwrap();
    options
}

#[test]
fn intact_worktree_verifies_without_network() {
    let scratch = tempfile::tempdir().unwrap();
    let options = cloned_worktree(scratch.path());

    let transport = ScriptedTransport::new(Vec::new());
    let log = transport.request_log();
    let mut session = Session::new(options, transport);
    let outcome = session.run(Command::Verify).unwrap();

    assert!(matches!(outcome, Outcome::Verified { checked: 1 }));
    assert!(log.borrow().is_empty());
}

#[test]
fn modified_file_fails_verify() {
    let scratch = tempfile::tempdir().unwrap();
    let options = cloned_worktree(scratch.path());
    fs::write(options.target_directory.join("hello.txt"), b"tampered\n").unwrap();

    let mut session = Session::new(options, ScriptedTransport::new(Vec::new()));
    let err = session.run(Command::Verify).unwrap_err();
    assert!(matches!(
        err,
        MirrorError::Verify(VerifyError::ModifiedLocalFile { path }) if path == "hello.txt"
    ));
}

#[test]
fn missing_file_fails_verify() {
    let scratch = tempfile::tempdir().unwrap();
    let options = cloned_worktree(scratch.path());
    fs::remove_file(options.target_directory.join("hello.txt")).unwrap();

    let mut session = Session::new(options, ScriptedTransport::new(Vec::new()));
    let err = session.run(Command::Verify).unwrap_err();
    assert!(matches!(
        err,
        MirrorError::Verify(VerifyError::MissingLocalFile { path }) if path == "hello.txt"
    ));
}

#[test]
fn verify_without_manifest_is_an_error() {
    let scratch = tempfile::tempdir().unwrap();
    let options = options_for(scratch.path());

    let mut session = Session::new(options, ScriptedTransport::new(Vec::new()));
    let err = session.run(Command::Verify).unwrap_err();
    assert!(matches!(
        err,
        MirrorError::Verify(VerifyError::NoManifest { .. })
    ));
}
