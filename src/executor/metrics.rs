use crate::telemetry::{log_metric_error, SharedMetricsRegistry};
use log::warn;
use std::sync::{Arc, Mutex, MutexGuard};

pub trait ExecutorMetrics: Send + Sync {
    fn record_submitted(&self);
    fn record_inline_run(&self);
    fn record_backpressure_rejection(&self);
    fn record_lifecycle_rejection(&self);
    fn record_task_panicked(&self);
    fn record_queue_depth(&self, depth: usize);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutorMetrics;

impl ExecutorMetrics for NoopExecutorMetrics {
    fn record_submitted(&self) {}
    fn record_inline_run(&self) {}
    fn record_backpressure_rejection(&self) {}
    fn record_lifecycle_rejection(&self) {}
    fn record_task_panicked(&self) {}
    fn record_queue_depth(&self, _depth: usize) {}
}

#[derive(Default, Clone)]
pub struct InMemoryExecutorMetrics {
    inner: Arc<Mutex<InMemoryExecutorSnapshot>>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InMemoryExecutorSnapshot {
    pub tasks_submitted: u64,
    pub inline_runs: u64,
    pub backpressure_rejections: u64,
    pub lifecycle_rejections: u64,
    pub task_panics: u64,
    pub queue_depth: u64,
    pub max_queue_depth: u64,
}

impl InMemoryExecutorMetrics {
    pub fn snapshot(&self) -> InMemoryExecutorSnapshot {
        self.lock_inner().clone()
    }

    fn lock_inner(&self) -> MutexGuard<'_, InMemoryExecutorSnapshot> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("event=in_memory_executor_metrics_poisoned; recovering state");
                poisoned.into_inner()
            }
        }
    }
}

impl ExecutorMetrics for InMemoryExecutorMetrics {
    fn record_submitted(&self) {
        self.lock_inner().tasks_submitted += 1;
    }

    fn record_inline_run(&self) {
        self.lock_inner().inline_runs += 1;
    }

    fn record_backpressure_rejection(&self) {
        self.lock_inner().backpressure_rejections += 1;
    }

    fn record_lifecycle_rejection(&self) {
        self.lock_inner().lifecycle_rejections += 1;
    }

    fn record_task_panicked(&self) {
        self.lock_inner().task_panics += 1;
    }

    fn record_queue_depth(&self, depth: usize) {
        let mut guard = self.lock_inner();
        guard.queue_depth = depth as u64;
        guard.max_queue_depth = guard.max_queue_depth.max(depth as u64);
    }
}

/// Publishes executor counters under `executor.<name>.*`.
#[derive(Clone)]
pub struct TelemetryExecutorMetrics {
    registry: SharedMetricsRegistry,
    prefix: String,
}

impl TelemetryExecutorMetrics {
    pub fn new(registry: SharedMetricsRegistry, executor_name: &str) -> Self {
        Self {
            registry,
            prefix: format!("executor.{executor_name}"),
        }
    }

    fn inc(&self, suffix: &str) {
        let name = format!("{}.{}", self.prefix, suffix);
        log_metric_error(&name, self.registry.inc_counter(&name, 1));
    }
}

impl ExecutorMetrics for TelemetryExecutorMetrics {
    fn record_submitted(&self) {
        self.inc("tasks_submitted_total");
    }

    fn record_inline_run(&self) {
        self.inc("inline_runs_total");
    }

    fn record_backpressure_rejection(&self) {
        self.inc("backpressure_rejections_total");
    }

    fn record_lifecycle_rejection(&self) {
        self.inc("lifecycle_rejections_total");
    }

    fn record_task_panicked(&self) {
        self.inc("task_panics_total");
    }

    fn record_queue_depth(&self, depth: usize) {
        let name = format!("{}.queue_depth", self.prefix);
        log_metric_error(&name, self.registry.set_gauge(&name, depth as u64));
    }
}
