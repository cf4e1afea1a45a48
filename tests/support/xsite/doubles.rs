#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use xsite_ingest::{
    CommandId, HashPartitioner, InMemoryStateTransferMetrics, InMemoryStore, InternalMetadata,
    PipelineError, PutCommand, SegmentId, StateChunk, StateConsumer, StateEntry,
    TrackingCommitManager, TransactionError, TransactionId, TransactionManager, WriteContext,
    WriteFlag, WriteFlags, WritePipeline,
};

/// What a pipeline saw for one put, including the shape of the context it
/// arrived with.
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub command: CommandId,
    pub key: Vec<u8>,
    pub segment: SegmentId,
    pub flags: WriteFlags,
    pub internal_metadata: InternalMetadata,
    pub transaction: Option<TransactionId>,
    pub state_transfer_flag: Option<WriteFlag>,
    pub lock_owner: Option<CommandId>,
    pub thread: ThreadId,
}

/// Records every put and optionally forwards it to a real pipeline. A key
/// registered with [`RecordingPipeline::fail_on_key`] is rejected without
/// being forwarded.
pub struct RecordingPipeline {
    inner: Option<Arc<dyn WritePipeline>>,
    fail_on: Mutex<Option<Vec<u8>>>,
    writes: Mutex<Vec<RecordedWrite>>,
}

impl RecordingPipeline {
    pub fn new() -> Self {
        Self {
            inner: None,
            fail_on: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn forwarding(inner: Arc<dyn WritePipeline>) -> Self {
        Self {
            inner: Some(inner),
            ..Self::new()
        }
    }

    pub fn fail_on_key(&self, key: &str) {
        *self.fail_on.lock().unwrap() = Some(key.as_bytes().to_vec());
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn attempted_keys(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .map(|write| String::from_utf8(write.key).unwrap())
            .collect()
    }
}

impl WritePipeline for RecordingPipeline {
    fn apply(&self, ctx: &mut WriteContext, put: PutCommand) -> Result<(), PipelineError> {
        let (state_transfer_flag, lock_owner) = match ctx {
            WriteContext::Transactional(tx) => (tx.state_transfer_flag(), None),
            WriteContext::SingleKey(single) => (None, single.lock_owner()),
        };
        self.writes.lock().unwrap().push(RecordedWrite {
            command: put.id,
            key: put.key.clone(),
            segment: put.segment,
            flags: put.flags,
            internal_metadata: put.internal_metadata.clone(),
            transaction: ctx.transaction(),
            state_transfer_flag,
            lock_owner,
            thread: thread::current().id(),
        });
        if self.fail_on.lock().unwrap().as_deref() == Some(put.key.as_slice()) {
            return Err(PipelineError::Rejected {
                key: String::from_utf8_lossy(&put.key).into_owned(),
                reason: "injected failure".into(),
            });
        }
        match &self.inner {
            Some(inner) => inner.apply(ctx, put),
            None => Ok(()),
        }
    }
}

/// Wraps a real transaction manager and injects commit / rollback failures.
pub struct FlakyTransactionManager {
    inner: Arc<dyn TransactionManager>,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl FlakyTransactionManager {
    pub fn new(inner: Arc<dyn TransactionManager>) -> Self {
        Self {
            inner,
            fail_commit: AtomicBool::new(false),
            fail_rollback: AtomicBool::new(false),
            begins: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
        }
    }

    pub fn fail_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_rollback(&self) {
        self.fail_rollback.store(true, Ordering::SeqCst);
    }
}

impl TransactionManager for FlakyTransactionManager {
    fn begin(&self) -> Result<(), TransactionError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.inner.begin()
    }

    fn commit(&self) -> Result<(), TransactionError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit.load(Ordering::SeqCst) {
            let transaction = self
                .inner
                .current_transaction()
                .ok_or(TransactionError::NoTransaction)?;
            return Err(TransactionError::CommitFailed {
                transaction,
                reason: "injected commit failure".into(),
            });
        }
        self.inner.commit()
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        let transaction = self.inner.current_transaction();
        self.inner.rollback()?;
        match transaction {
            Some(transaction) if self.fail_rollback.load(Ordering::SeqCst) => {
                Err(TransactionError::RollbackFailed {
                    transaction,
                    reason: "injected rollback failure".into(),
                })
            }
            _ => Ok(()),
        }
    }

    fn current_transaction(&self) -> Option<TransactionId> {
        self.inner.current_transaction()
    }
}

/// A store plus the consumer wired to it.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub tracker: Arc<TrackingCommitManager>,
    pub partitioner: Arc<HashPartitioner>,
    pub pipeline: Arc<RecordingPipeline>,
    pub metrics: InMemoryStateTransferMetrics,
    pub consumer: StateConsumer,
}

impl Harness {
    pub fn transactional(cache: &str) -> Self {
        Self::build(cache, |store| Some(store as Arc<dyn TransactionManager>))
    }

    pub fn non_transactional(cache: &str) -> Self {
        Self::build(cache, |_| None)
    }

    pub fn with_transaction_manager(
        cache: &str,
        manager: impl FnOnce(Arc<InMemoryStore>) -> Arc<dyn TransactionManager>,
    ) -> Self {
        Self::build(cache, |store| Some(manager(store)))
    }

    fn build(
        cache: &str,
        manager: impl FnOnce(Arc<InMemoryStore>) -> Option<Arc<dyn TransactionManager>>,
    ) -> Self {
        let tracker = Arc::new(TrackingCommitManager::new());
        let store = Arc::new(InMemoryStore::new(cache, tracker.clone()));
        let partitioner = Arc::new(HashPartitioner::new(16));
        let pipeline = Arc::new(RecordingPipeline::forwarding(store.clone()));
        let metrics = InMemoryStateTransferMetrics::default();
        let mut builder = StateConsumer::builder(
            cache,
            partitioner.clone(),
            pipeline.clone(),
            tracker.clone(),
        )
        .metrics(Arc::new(metrics.clone()));
        if let Some(manager) = manager(store.clone()) {
            builder = builder.transaction_manager(manager);
        }
        Self {
            store,
            tracker,
            partitioner,
            pipeline,
            metrics,
            consumer: builder.build(),
        }
    }
}

pub fn chunk(pairs: &[(&str, &str)]) -> StateChunk {
    pairs
        .iter()
        .map(|(key, value)| {
            StateEntry::new(key.as_bytes().to_vec(), value.as_bytes().to_vec())
                .with_internal_metadata(InternalMetadata::from_site("dc2", 1))
        })
        .collect()
}

pub fn value_of(store: &InMemoryStore, key: &str) -> Option<String> {
    store
        .get(key.as_bytes())
        .map(|value| String::from_utf8(value).unwrap())
}
