//! Error types for logging and metrics setup.

use std::string::FromUtf8Error;

use prometheus::Error as PrometheusError;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Failures while installing logging or recording metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed, or installing one failed.
    #[error("failed to install tracing subscriber")]
    Subscriber {
        /// Underlying tracing subscriber error.
        #[source]
        source: TryInitError,
    },
    /// `LOG_FORMAT` named neither `pretty` nor `json`.
    #[error("unknown log format `{value}`")]
    UnknownLogFormat {
        /// Value that failed to parse.
        value: String,
    },
    /// A counter could not be constructed.
    #[error("invalid metric `{name}`")]
    Collector {
        /// Metric name.
        name: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// A counter clashed with one already in the registry.
    #[error("metric `{name}` could not be registered")]
    Register {
        /// Metric name.
        name: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The text exposition could not be produced.
    #[error("failed to render metrics")]
    Render {
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The text exposition was not UTF-8.
    #[error("rendered metrics were not utf-8")]
    RenderUtf8 {
        /// Underlying conversion error.
        #[source]
        source: FromUtf8Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    type TestResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

    #[test]
    fn metric_errors_name_the_metric_and_keep_the_cause() {
        let err = TelemetryError::Register {
            name: "arbor_fsops_events_total",
            source: PrometheusError::AlreadyReg,
        };
        assert_eq!(
            err.to_string(),
            "metric `arbor_fsops_events_total` could not be registered"
        );
        assert!(err.source().is_some());

        let err = TelemetryError::Collector {
            name: "bad name",
            source: PrometheusError::Msg("invalid metric name".to_string()),
        };
        assert_eq!(err.to_string(), "invalid metric `bad name`");
    }

    #[test]
    fn render_failures_chain_their_source() -> TestResult<()> {
        let utf8 = String::from_utf8(vec![0xff])
            .err()
            .ok_or("expected invalid utf-8")?;
        let err = TelemetryError::RenderUtf8 { source: utf8 };
        assert_eq!(err.to_string(), "rendered metrics were not utf-8");
        assert!(err.source().is_some());

        let err = TelemetryError::UnknownLogFormat {
            value: "xml".to_string(),
        };
        assert_eq!(err.to_string(), "unknown log format `xml`");
        assert!(err.source().is_none());
        Ok(())
    }
}
