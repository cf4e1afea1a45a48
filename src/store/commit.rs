use crate::xsite::{CommitTracker, Key, WriteFlag, WriteFlags};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Conflict resolution between client writes and replayed remote state.
///
/// While [`WriteFlag::TransferOrigin`] is tracked, a client write to a key
/// wins over any transfer write to the same key that commits after it.
#[derive(Debug, Default)]
pub struct TrackingCommitManager {
    state: Mutex<TrackingState>,
}

#[derive(Debug, Default)]
struct TrackingState {
    tracking: WriteFlags,
    client_committed: HashSet<Key>,
    transfer_committed: HashSet<Key>,
}

impl TrackingState {
    fn clear_keys(&mut self) {
        self.client_committed.clear();
        self.transfer_committed.clear();
    }
}

impl TrackingCommitManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether a write tagged with `flags` may commit to `key`.
    pub fn admit(&self, key: &[u8], flags: WriteFlags) -> bool {
        let mut state = self.state.lock();
        if !state.tracking.contains(WriteFlag::TransferOrigin) {
            return true;
        }
        if flags.contains(WriteFlag::TransferOrigin) {
            if state.client_committed.contains(key) {
                debug!(
                    "event=xsite_transfer_write_discarded key={} reason=client_write_newer",
                    String::from_utf8_lossy(key)
                );
                return false;
            }
            state.transfer_committed.insert(key.to_vec());
        } else {
            state.client_committed.insert(key.to_vec());
        }
        true
    }

    pub fn transfer_committed_keys(&self) -> usize {
        self.state.lock().transfer_committed.len()
    }

    pub fn client_committed_keys(&self) -> usize {
        self.state.lock().client_committed.len()
    }
}

impl CommitTracker for TrackingCommitManager {
    fn start_tracking(&self, flag: WriteFlag) {
        let mut state = self.state.lock();
        state.tracking.insert(flag);
        state.clear_keys();
    }

    fn stop_tracking(&self, flag: WriteFlag) {
        let mut state = self.state.lock();
        state.tracking.remove(flag);
        if state.tracking.is_empty() {
            state.clear_keys();
        }
    }

    fn is_tracking(&self, flag: WriteFlag) -> bool {
        self.state.lock().tracking.contains(flag)
    }
}
