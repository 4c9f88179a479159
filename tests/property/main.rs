//! Property suites for the wire codecs and delta application.
//!
//! Run with: `cargo test --test property`

mod codec;
mod delta;
