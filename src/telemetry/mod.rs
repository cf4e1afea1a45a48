//! Process-local counters and gauges shared by the ingest components.

mod error;
mod registry;

pub use error::TelemetryError;
pub use registry::{MetricKind, MetricsSnapshot, SharedMetricsRegistry};

use log::warn;

/// Metric updates never fail the caller; errors are logged and dropped.
pub(crate) fn log_metric_error<T>(context: &str, result: Result<T, TelemetryError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                "event=telemetry_metric_error context={} error={}",
                context, err
            );
            None
        }
    }
}
