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
#![allow(clippy::redundant_pub_crate)]

//! Local administration CLI for an Arbor storage root.
//!
//! Layout:
//! - `cli.rs`: argument parsing and command dispatch
//! - `commands/`: command handlers grouped by concern
//! - `context.rs`: errors, configuration loading and engine construction
//! - `output.rs`: table and JSON renderers
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod commands;
pub(crate) mod context;
pub(crate) mod output;

pub use cli::{execute, run};
