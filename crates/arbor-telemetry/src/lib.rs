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

//! Telemetry primitives shared across the Arbor workspace.
//!
//! This crate centralises logging setup and the metrics registry so the engine
//! and the CLI report through the same channels.

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
