//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Labels stay low-cardinality: operation names and outcomes, never paths.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared by the engine and its hosts.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    operations_total: IntCounterVec,
    items_total: IntCounterVec,
    events_published_total: IntCounterVec,
    trash_purged_total: IntCounter,
    items_succeeded: IntCounter,
    items_failed: IntCounter,
}

/// Snapshot of selected counters for health reporting.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Batch items that succeeded, across all operations.
    pub items_succeeded: u64,
    /// Batch items that failed, across all operations.
    pub items_failed: u64,
    /// Trash records permanently purged.
    pub trash_purged: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let operations_total = counter_vec(
            "arbor_fsops_operations_total",
            "Filesystem mutation calls by operation and status",
            &["operation", "status"],
        )?;
        let items_total = counter_vec(
            "arbor_fsops_items_total",
            "Batch items processed by operation and outcome",
            &["operation", "outcome"],
        )?;
        let events_published_total = counter_vec(
            "arbor_events_published_total",
            "Domain events published by kind",
            &["kind"],
        )?;
        let trash_purged_total = IntCounter::with_opts(Opts::new(
            "arbor_trash_purged_total",
            "Trash records permanently removed",
        ))
        .map_err(|source| TelemetryError::Collector {
            name: "arbor_trash_purged_total",
            source,
        })?;

        // Aggregates backing the snapshot; the labelled vec is what gets exported.
        let items_succeeded = unregistered("arbor_items_succeeded")?;
        let items_failed = unregistered("arbor_items_failed")?;

        register(&registry, "arbor_fsops_operations_total", &operations_total)?;
        register(&registry, "arbor_fsops_items_total", &items_total)?;
        register(
            &registry,
            "arbor_events_published_total",
            &events_published_total,
        )?;
        register(&registry, "arbor_trash_purged_total", &trash_purged_total)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                operations_total,
                items_total,
                events_published_total,
                trash_purged_total,
                items_succeeded,
                items_failed,
            }),
        })
    }

    /// Increment the per-call counter for an operation.
    pub fn inc_operation(&self, operation: &str, status: &str) {
        self.inner
            .operations_total
            .with_label_values(&[operation, status])
            .inc();
    }

    /// Increment the per-item counter for a batch operation.
    pub fn inc_item(&self, operation: &str, outcome: &str) {
        self.inner
            .items_total
            .with_label_values(&[operation, outcome])
            .inc();
        match outcome {
            "success" => self.inner.items_succeeded.inc(),
            "failure" => self.inner.items_failed.inc(),
            _ => {}
        }
    }

    /// Increment the published event counter for the specific event kind.
    pub fn inc_event(&self, kind: &str) {
        self.inner
            .events_published_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record purged trash records.
    pub fn add_trash_purged(&self, count: u64) {
        self.inner.trash_purged_total.inc_by(count);
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Render { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::RenderUtf8 { source })
    }

    /// Take a point-in-time snapshot of the item and purge counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_succeeded: self.inner.items_succeeded.get(),
            items_failed: self.inner.items_failed.get(),
            trash_purged: self.inner.trash_purged_total.get(),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::Collector { name, source })
}

fn unregistered(name: &'static str) -> Result<IntCounter> {
    IntCounter::new(name, name).map_err(|source| TelemetryError::Collector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::Register { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn snapshot_reflects_item_outcomes() -> std::result::Result<(), Box<dyn Error>> {
        let metrics = Metrics::new()?;
        metrics.inc_operation("move", "completed");
        metrics.inc_item("move", "success");
        metrics.inc_item("move", "success");
        metrics.inc_item("copy", "failure");
        metrics.inc_event("file.moved");
        metrics.add_trash_purged(3);

        let snapshot = metrics.snapshot();
        assert_eq!(
            snapshot,
            MetricsSnapshot {
                items_succeeded: 2,
                items_failed: 1,
                trash_purged: 3,
            }
        );

        let rendered = metrics.render()?;
        assert!(rendered.contains("arbor_fsops_operations_total"));
        assert!(rendered.contains("arbor_events_published_total"));
        assert!(rendered.contains("arbor_trash_purged_total 3"));
        Ok(())
    }

    #[test]
    fn registries_are_independent() -> std::result::Result<(), Box<dyn Error>> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_item("delete", "success");
        assert_eq!(second.snapshot().items_succeeded, 0);
        Ok(())
    }
}
