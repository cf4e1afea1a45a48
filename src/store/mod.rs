//! In-memory data container that plays the write pipeline and transaction
//! manager roles for a single cache.

mod commit;
mod mirror;

pub use commit::TrackingCommitManager;
pub use mirror::{LocalMirror, WriteListener};

use crate::xsite::{
    CommandIdGenerator, EntryMetadata, InternalMetadata, Key, PartitionLookup, PipelineError,
    PutCommand, SegmentId, SingleKeyWriteContext, TransactionError, TransactionId,
    TransactionManager, Value, WriteContext, WriteFlags, WritePipeline,
};
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub value: Value,
    pub segment: SegmentId,
    pub metadata: EntryMetadata,
    pub internal_metadata: InternalMetadata,
    pub flags: WriteFlags,
}

impl StoredEntry {
    fn from_put(put: PutCommand) -> (Key, Self) {
        (
            put.key,
            Self {
                value: put.value,
                segment: put.segment,
                metadata: put.metadata,
                internal_metadata: put.internal_metadata,
                flags: put.flags,
            },
        )
    }
}

#[derive(Debug)]
struct PendingTransaction {
    id: TransactionId,
    writes: Vec<PutCommand>,
}

/// Thread-bound transactions stage their writes until commit; single-key
/// writes land immediately. Every commit passes through the
/// [`TrackingCommitManager`] before it becomes visible.
pub struct InMemoryStore {
    name: String,
    data: RwLock<HashMap<Key, StoredEntry>>,
    transactions: Mutex<HashMap<ThreadId, PendingTransaction>>,
    next_transaction: AtomicU64,
    client_commands: CommandIdGenerator,
    commit_manager: Arc<TrackingCommitManager>,
    listeners: RwLock<Vec<Arc<dyn WriteListener>>>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>, commit_manager: Arc<TrackingCommitManager>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            next_transaction: AtomicU64::new(1),
            client_commands: CommandIdGenerator::new(),
            commit_manager,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commit_manager(&self) -> &Arc<TrackingCommitManager> {
        &self.commit_manager
    }

    pub fn subscribe(&self, listener: Arc<dyn WriteListener>) {
        self.listeners.write().push(listener);
    }

    /// Ordinary client write, outside any transaction.
    pub fn put(
        &self,
        partitioner: &dyn PartitionLookup,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<(), PipelineError> {
        let key = key.into();
        let put = PutCommand {
            id: self.client_commands.next_id(),
            segment: partitioner.segment_of(&key),
            key,
            value: value.into(),
            metadata: EntryMetadata::default(),
            internal_metadata: InternalMetadata::default(),
            flags: WriteFlags::empty(),
        };
        let mut ctx = WriteContext::SingleKey(SingleKeyWriteContext::new());
        ctx.prepare_for(&put);
        self.apply(&mut ctx, put)
    }

    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.data.read().get(key).map(|entry| entry.value.clone())
    }

    pub fn entry(&self, key: &[u8]) -> Option<StoredEntry> {
        self.data.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.data.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.data.read().keys().cloned().collect()
    }

    pub fn pending_transactions(&self) -> usize {
        self.transactions.lock().len()
    }

    fn commit_write(&self, put: PutCommand) {
        let (key, entry) = {
            // Admission and the insert happen under one data lock so a
            // discarded-or-admitted decision cannot be reordered with the
            // write that caused it.
            let mut data = self.data.write();
            if !self.commit_manager.admit(&put.key, put.flags) {
                return;
            }
            let (key, entry) = StoredEntry::from_put(put);
            trace!(
                "event=store_write cache={} key={} segment={}",
                self.name,
                String::from_utf8_lossy(&key),
                entry.segment
            );
            data.insert(key.clone(), entry.clone());
            (key, entry)
        };
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_write(&key, &entry);
        }
    }
}

impl WritePipeline for InMemoryStore {
    fn apply(&self, ctx: &mut WriteContext, put: PutCommand) -> Result<(), PipelineError> {
        match ctx {
            WriteContext::Transactional(tx) => {
                let mut transactions = self.transactions.lock();
                let pending = transactions
                    .get_mut(&thread::current().id())
                    .filter(|pending| pending.id == tx.transaction())
                    .ok_or(PipelineError::UnknownTransaction(tx.transaction()))?;
                pending.writes.push(put);
                Ok(())
            }
            WriteContext::SingleKey(single) => {
                if single.lock_owner() != Some(put.key_lock_owner())
                    || single.key() != Some(put.key.as_slice())
                {
                    return Err(PipelineError::Rejected {
                        key: String::from_utf8_lossy(&put.key).into_owned(),
                        reason: "write context is not bound to this command".into(),
                    });
                }
                self.commit_write(put);
                Ok(())
            }
        }
    }
}

impl TransactionManager for InMemoryStore {
    fn begin(&self) -> Result<(), TransactionError> {
        let mut transactions = self.transactions.lock();
        let thread_id = thread::current().id();
        if let Some(existing) = transactions.get(&thread_id) {
            return Err(TransactionError::AlreadyAssociated(existing.id));
        }
        let id = TransactionId(self.next_transaction.fetch_add(1, Ordering::Relaxed));
        transactions.insert(
            thread_id,
            PendingTransaction {
                id,
                writes: Vec::new(),
            },
        );
        debug!("event=store_tx_begin cache={} transaction={}", self.name, id);
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        let pending = self
            .transactions
            .lock()
            .remove(&thread::current().id())
            .ok_or(TransactionError::NoTransaction)?;
        let writes = pending.writes.len();
        for put in pending.writes {
            self.commit_write(put);
        }
        debug!(
            "event=store_tx_commit cache={} transaction={} writes={}",
            self.name, pending.id, writes
        );
        Ok(())
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        let pending = self
            .transactions
            .lock()
            .remove(&thread::current().id())
            .ok_or(TransactionError::NoTransaction)?;
        debug!(
            "event=store_tx_rollback cache={} transaction={} discarded_writes={}",
            self.name,
            pending.id,
            pending.writes.len()
        );
        Ok(())
    }

    fn current_transaction(&self) -> Option<TransactionId> {
        self.transactions
            .lock()
            .get(&thread::current().id())
            .map(|pending| pending.id)
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("name", &self.name)
            .field("entries", &self.len())
            .finish()
    }
}
