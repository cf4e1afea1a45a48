use super::collaborators::CommitTracker;
use super::flags::WriteFlag;
use super::metrics::{NoopStateTransferMetrics, StateTransferMetrics};
use arc_swap::ArcSwapOption;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("already receiving state from {current_site}")]
pub struct AlreadyActive {
    pub current_site: String,
}

/// Tracks which remote site, if any, is pushing state into one cache.
///
/// The sender slot moves from empty to occupied only through a
/// compare-and-set, so among racing `start` calls on an idle session exactly
/// one wins. The slot itself is never locked; only the follow-up signal to
/// the commit tracker is serialized, so tracking always ends up matching the
/// slot once concurrent transitions settle.
pub struct TransferSession {
    cache_name: String,
    sending_site: ArcSwapOption<String>,
    commit_tracker: Arc<dyn CommitTracker>,
    tracking_gate: Mutex<()>,
    metrics: Arc<dyn StateTransferMetrics>,
}

impl TransferSession {
    pub fn new(cache_name: impl Into<String>, commit_tracker: Arc<dyn CommitTracker>) -> Self {
        Self::with_metrics(cache_name, commit_tracker, Arc::new(NoopStateTransferMetrics))
    }

    pub fn with_metrics(
        cache_name: impl Into<String>,
        commit_tracker: Arc<dyn CommitTracker>,
        metrics: Arc<dyn StateTransferMetrics>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            sending_site: ArcSwapOption::empty(),
            commit_tracker,
            tracking_gate: Mutex::new(()),
            metrics,
        }
    }

    pub fn start(&self, sending_site: &str) -> Result<(), AlreadyActive> {
        let candidate = Arc::new(sending_site.to_owned());
        let previous = self
            .sending_site
            .compare_and_swap(&None::<Arc<String>>, Some(candidate));
        match &*previous {
            None => {
                self.reconcile_tracking();
                self.metrics.record_session_started();
                info!(
                    "event=xsite_state_transfer_start cache={} sending_site={}",
                    self.cache_name, sending_site
                );
                Ok(())
            }
            Some(current) => {
                self.metrics.record_session_conflict();
                warn!(
                    "event=xsite_state_transfer_already_active cache={} requested_site={} current_site={}",
                    self.cache_name, sending_site, current
                );
                Err(AlreadyActive {
                    current_site: current.as_str().to_owned(),
                })
            }
        }
    }

    /// Closes the session when `sending_site` is `None` or names the active
    /// sender. Any other call leaves the session untouched.
    pub fn end(&self, sending_site: Option<&str>) {
        loop {
            let current = self.sending_site.load();
            let active = match &*current {
                Some(active) => active,
                None => {
                    debug!(
                        "event=xsite_state_transfer_end_ignored cache={} requested_site={:?} reason=idle",
                        self.cache_name, sending_site
                    );
                    return;
                }
            };
            if let Some(requested) = sending_site {
                if requested != active.as_str() {
                    debug!(
                        "event=xsite_state_transfer_end_ignored cache={} requested_site={} current_site={} reason=not_sender",
                        self.cache_name, requested, active
                    );
                    return;
                }
            }
            let previous = self
                .sending_site
                .compare_and_swap(&*current, None::<Arc<String>>);
            let swapped = match (&*previous, &*current) {
                (Some(seen), Some(expected)) => Arc::ptr_eq(seen, expected),
                _ => false,
            };
            if swapped {
                self.reconcile_tracking();
                self.metrics.record_session_ended();
                info!(
                    "event=xsite_state_transfer_end cache={} sending_site={}",
                    self.cache_name, active
                );
                return;
            }
            // Lost a race with a concurrent end/start; re-evaluate.
        }
    }

    /// Brings the commit tracker in line with the slot as it is now. Whoever
    /// reconciles last observes every transition that preceded it.
    fn reconcile_tracking(&self) {
        let _gate = self.tracking_gate.lock();
        let active = self.sending_site.load().is_some();
        let tracking = self.commit_tracker.is_tracking(WriteFlag::TransferOrigin);
        match (active, tracking) {
            (true, false) => self.commit_tracker.start_tracking(WriteFlag::TransferOrigin),
            (false, true) => self.commit_tracker.stop_tracking(WriteFlag::TransferOrigin),
            _ => {}
        }
    }

    pub fn current(&self) -> Option<String> {
        self.sending_site
            .load_full()
            .map(|site| site.as_str().to_owned())
    }

    pub fn is_active(&self) -> bool {
        self.sending_site.load().is_some()
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }
}

impl std::fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferSession")
            .field("cache_name", &self.cache_name)
            .field("sending_site", &self.current())
            .finish()
    }
}
