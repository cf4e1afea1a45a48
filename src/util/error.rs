use crate::config::ConfigError;
use crate::executor::{ExecutorConfigError, ExecutorError};
use crate::telemetry::TelemetryError;
use crate::xsite::{AlreadyActive, ApplyError, PipelineError, TransactionError};
use thiserror::Error;

/// Any failure surfaced by the crate, for callers that do not need to tell
/// the layers apart.
#[derive(Debug, Error)]
pub enum XsiteError {
    #[error(transparent)]
    Session(#[from] AlreadyActive),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

impl From<ExecutorConfigError> for XsiteError {
    fn from(err: ExecutorConfigError) -> Self {
        XsiteError::Executor(ExecutorError::from(err))
    }
}

impl XsiteError {
    /// True when the same request may succeed if resubmitted later.
    pub fn is_retryable(&self) -> bool {
        match self {
            XsiteError::Executor(err) => err.is_retryable(),
            _ => false,
        }
    }
}
