use crate::telemetry::{log_metric_error, SharedMetricsRegistry};
use log::warn;
use std::sync::{Arc, Mutex, MutexGuard};

pub trait StateTransferMetrics: Send + Sync {
    fn record_session_started(&self);
    fn record_session_conflict(&self);
    fn record_session_ended(&self);
    fn record_chunk_applied(&self, keys: usize);
    fn record_chunk_failed(&self, keys_applied: usize);
    fn record_rollback(&self, succeeded: bool);
}

/// Discards everything. Default for consumers built without telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStateTransferMetrics;

impl StateTransferMetrics for NoopStateTransferMetrics {
    fn record_session_started(&self) {}
    fn record_session_conflict(&self) {}
    fn record_session_ended(&self) {}
    fn record_chunk_applied(&self, _keys: usize) {}
    fn record_chunk_failed(&self, _keys_applied: usize) {}
    fn record_rollback(&self, _succeeded: bool) {}
}

#[derive(Default, Clone)]
pub struct InMemoryStateTransferMetrics {
    inner: Arc<Mutex<InMemoryStateTransferSnapshot>>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InMemoryStateTransferSnapshot {
    pub sessions_started: u64,
    pub session_conflicts: u64,
    pub sessions_ended: u64,
    pub chunks_applied: u64,
    pub keys_applied: u64,
    pub chunks_failed: u64,
    pub keys_applied_before_failure: u64,
    pub rollbacks: u64,
    pub rollback_failures: u64,
}

impl InMemoryStateTransferMetrics {
    pub fn snapshot(&self) -> InMemoryStateTransferSnapshot {
        self.lock_inner().clone()
    }

    fn lock_inner(&self) -> MutexGuard<'_, InMemoryStateTransferSnapshot> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("event=in_memory_state_transfer_metrics_poisoned; recovering state");
                poisoned.into_inner()
            }
        }
    }
}

impl StateTransferMetrics for InMemoryStateTransferMetrics {
    fn record_session_started(&self) {
        self.lock_inner().sessions_started += 1;
    }

    fn record_session_conflict(&self) {
        self.lock_inner().session_conflicts += 1;
    }

    fn record_session_ended(&self) {
        self.lock_inner().sessions_ended += 1;
    }

    fn record_chunk_applied(&self, keys: usize) {
        let mut guard = self.lock_inner();
        guard.chunks_applied += 1;
        guard.keys_applied += keys as u64;
    }

    fn record_chunk_failed(&self, keys_applied: usize) {
        let mut guard = self.lock_inner();
        guard.chunks_failed += 1;
        guard.keys_applied_before_failure += keys_applied as u64;
    }

    fn record_rollback(&self, succeeded: bool) {
        let mut guard = self.lock_inner();
        guard.rollbacks += 1;
        if !succeeded {
            guard.rollback_failures += 1;
        }
    }
}

#[derive(Clone)]
pub struct TelemetryStateTransferMetrics {
    registry: SharedMetricsRegistry,
}

impl TelemetryStateTransferMetrics {
    pub fn new(registry: SharedMetricsRegistry) -> Self {
        Self { registry }
    }

    fn inc(&self, name: &str, delta: u64) {
        log_metric_error(name, self.registry.inc_counter(name, delta));
    }
}

impl StateTransferMetrics for TelemetryStateTransferMetrics {
    fn record_session_started(&self) {
        self.inc("xsite.session_started_total", 1);
        log_metric_error(
            "xsite.session_active",
            self.registry.set_gauge("xsite.session_active", 1),
        );
    }

    fn record_session_conflict(&self) {
        self.inc("xsite.session_conflict_total", 1);
    }

    fn record_session_ended(&self) {
        self.inc("xsite.session_ended_total", 1);
        log_metric_error(
            "xsite.session_active",
            self.registry.set_gauge("xsite.session_active", 0),
        );
    }

    fn record_chunk_applied(&self, keys: usize) {
        self.inc("xsite.chunks_applied_total", 1);
        self.inc("xsite.keys_applied_total", keys as u64);
    }

    fn record_chunk_failed(&self, keys_applied: usize) {
        self.inc("xsite.chunks_failed_total", 1);
        if keys_applied > 0 {
            self.inc("xsite.keys_applied_before_failure_total", keys_applied as u64);
        }
    }

    fn record_rollback(&self, succeeded: bool) {
        self.inc("xsite.rollbacks_total", 1);
        if !succeeded {
            self.inc("xsite.rollback_failures_total", 1);
        }
    }
}
