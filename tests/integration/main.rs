//! End-to-end mirror sessions over deterministic wire fixtures.
//!
//! Run with: `cargo test --test integration`

mod fixtures;

mod clone;
mod verify;
