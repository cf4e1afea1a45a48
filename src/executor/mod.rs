//! Bounded worker pools and the admission decision taken when one is full.

mod admission;
mod capability;
mod metrics;
mod pool;

pub use admission::{
    AdmissionDecision, AdmissionPolicy, BlockingRejectionPolicy, ExecutorLifecycle, Task, TaskId,
};
pub use capability::{spawn_with_capability, ThreadCapability};
pub use metrics::{
    ExecutorMetrics, InMemoryExecutorMetrics, InMemoryExecutorSnapshot, NoopExecutorMetrics,
    TelemetryExecutorMetrics,
};
pub use pool::{BoundedExecutor, ExecutorConfig, ExecutorConfigError, ExecutorError};
