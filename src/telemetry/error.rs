use super::registry::MetricKind;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("metric name must not be empty")]
    EmptyName,
    #[error("metric {name} is already registered as a {registered}")]
    KindMismatch {
        name: String,
        registered: MetricKind,
    },
}
