#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (sandbox temp dirs), archive.rs (zip builder), assert.rs (tree snapshots).

pub mod archive;
pub mod assert;
pub mod fixtures;

pub use archive::write_zip;
pub use assert::{TreeEntry, snapshot_tree};
pub use fixtures::SandboxFixture;
