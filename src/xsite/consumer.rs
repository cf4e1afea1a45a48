use super::collaborators::{
    CommitTracker, PartitionLookup, PipelineError, TransactionError, TransactionManager,
    WritePipeline,
};
use super::command::{
    CommandIdGenerator, PutCommand, SingleKeyWriteContext, TxWriteContext, WriteContext,
};
use super::flags::{WriteFlag, STATE_TRANSFER_PUT_FLAGS};
use super::metrics::{NoopStateTransferMetrics, StateTransferMetrics};
use super::session::{AlreadyActive, TransferSession};
use super::state::{StateChunk, StateEntry};
use log::{debug, log_enabled, trace, warn, Level};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyMode {
    Transactional,
    NonTransactional,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("failed to apply state entry {entry_index}: {source}")]
    Pipeline {
        entry_index: usize,
        #[source]
        source: PipelineError,
    },
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Receiving side of cross-site state transfer for one cache.
///
/// Chunks are replayed through the local write pipeline with a fixed set of
/// [`WriteFlag`]s. With a transaction manager each chunk commits or rolls
/// back as a unit; without one, entries are applied one by one and a failure
/// leaves the entries before it in place.
pub struct StateConsumer {
    session: TransferSession,
    partitioner: Arc<dyn PartitionLookup>,
    pipeline: Arc<dyn WritePipeline>,
    transaction_manager: Option<Arc<dyn TransactionManager>>,
    command_ids: CommandIdGenerator,
    metrics: Arc<dyn StateTransferMetrics>,
}

pub struct StateConsumerBuilder {
    cache_name: String,
    partitioner: Arc<dyn PartitionLookup>,
    pipeline: Arc<dyn WritePipeline>,
    commit_tracker: Arc<dyn CommitTracker>,
    transaction_manager: Option<Arc<dyn TransactionManager>>,
    metrics: Arc<dyn StateTransferMetrics>,
}

impl StateConsumerBuilder {
    pub fn transaction_manager(mut self, manager: Arc<dyn TransactionManager>) -> Self {
        self.transaction_manager = Some(manager);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn StateTransferMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> StateConsumer {
        let session = TransferSession::with_metrics(
            self.cache_name,
            self.commit_tracker,
            self.metrics.clone(),
        );
        StateConsumer {
            session,
            partitioner: self.partitioner,
            pipeline: self.pipeline,
            transaction_manager: self.transaction_manager,
            command_ids: CommandIdGenerator::new(),
            metrics: self.metrics,
        }
    }
}

impl StateConsumer {
    pub fn builder(
        cache_name: impl Into<String>,
        partitioner: Arc<dyn PartitionLookup>,
        pipeline: Arc<dyn WritePipeline>,
        commit_tracker: Arc<dyn CommitTracker>,
    ) -> StateConsumerBuilder {
        StateConsumerBuilder {
            cache_name: cache_name.into(),
            partitioner,
            pipeline,
            commit_tracker,
            transaction_manager: None,
            metrics: Arc::new(NoopStateTransferMetrics),
        }
    }

    pub fn start_state_transfer(&self, sending_site: &str) -> Result<(), AlreadyActive> {
        debug!(
            "event=xsite_state_transfer_starting cache={} sending_site={}",
            self.session.cache_name(),
            sending_site
        );
        self.session.start(sending_site)
    }

    pub fn end_state_transfer(&self, sending_site: Option<&str>) {
        self.session.end(sending_site)
    }

    pub fn sending_site_name(&self) -> Option<String> {
        self.session.current()
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    pub fn mode(&self) -> ApplyMode {
        if self.transaction_manager.is_some() {
            ApplyMode::Transactional
        } else {
            ApplyMode::NonTransactional
        }
    }

    /// Applies `chunk` on the calling thread, which must be allowed to block.
    /// Does not consult or change the transfer session.
    pub fn apply_state(&self, chunk: StateChunk) -> Result<(), ApplyError> {
        debug!(
            "event=xsite_state_received cache={} keys={}",
            self.session.cache_name(),
            chunk.len()
        );
        match &self.transaction_manager {
            Some(manager) => self.apply_in_transaction(manager.as_ref(), chunk),
            None => self.apply_non_transactional(chunk),
        }
    }

    fn apply_in_transaction(
        &self,
        manager: &dyn TransactionManager,
        chunk: StateChunk,
    ) -> Result<(), ApplyError> {
        let keys = chunk.len();
        let mut began = false;
        match self.try_apply_in_transaction(manager, chunk, &mut began) {
            Ok(()) => {
                self.metrics.record_chunk_applied(keys);
                debug!(
                    "event=xsite_state_applied cache={} mode=transactional keys={}",
                    self.session.cache_name(),
                    keys
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=xsite_state_apply_failed cache={} mode=transactional keys={} error={}",
                    self.session.cache_name(),
                    keys,
                    err
                );
                if began {
                    self.safe_rollback(manager);
                }
                self.metrics.record_chunk_failed(0);
                Err(err)
            }
        }
    }

    fn try_apply_in_transaction(
        &self,
        manager: &dyn TransactionManager,
        chunk: StateChunk,
        began: &mut bool,
    ) -> Result<(), ApplyError> {
        manager.begin()?;
        *began = true;
        let transaction = manager
            .current_transaction()
            .ok_or(TransactionError::NoTransaction)?;
        let mut tx_ctx = TxWriteContext::new(transaction);
        tx_ctx.set_state_transfer_flag(WriteFlag::TransferInternalState);
        let mut ctx = WriteContext::Transactional(tx_ctx);
        for (entry_index, entry) in chunk.into_iter().enumerate() {
            let put = self.create_put(entry);
            trace!(
                "event=xsite_state_key_applying cache={} transaction={} key={}",
                self.session.cache_name(),
                transaction,
                String::from_utf8_lossy(&put.key)
            );
            self.pipeline
                .apply(&mut ctx, put)
                .map_err(|source| ApplyError::Pipeline {
                    entry_index,
                    source,
                })?;
        }
        manager.commit()?;
        Ok(())
    }

    fn apply_non_transactional(&self, chunk: StateChunk) -> Result<(), ApplyError> {
        let keys = chunk.len();
        // One context for the whole chunk, reset after every entry.
        let mut ctx = WriteContext::SingleKey(SingleKeyWriteContext::new());
        for (entry_index, entry) in chunk.into_iter().enumerate() {
            let put = self.create_put(entry);
            ctx.prepare_for(&put);
            let key = log_enabled!(Level::Debug)
                .then(|| String::from_utf8_lossy(&put.key).into_owned());
            let result = self.pipeline.apply(&mut ctx, put);
            ctx.reset();
            if let Err(source) = result {
                debug!(
                    "event=xsite_state_apply_failed cache={} mode=non_transactional entry_index={} applied={} keys={} key={} error={}",
                    self.session.cache_name(),
                    entry_index,
                    entry_index,
                    keys,
                    key.as_deref().unwrap_or_default(),
                    source
                );
                self.metrics.record_chunk_failed(entry_index);
                return Err(ApplyError::Pipeline {
                    entry_index,
                    source,
                });
            }
            trace!(
                "event=xsite_state_key_applied cache={} key={}",
                self.session.cache_name(),
                key.as_deref().unwrap_or_default()
            );
        }
        self.metrics.record_chunk_applied(keys);
        debug!(
            "event=xsite_state_applied cache={} mode=non_transactional keys={}",
            self.session.cache_name(),
            keys
        );
        Ok(())
    }

    fn create_put(&self, entry: StateEntry) -> PutCommand {
        let segment = self.partitioner.segment_of(&entry.key);
        PutCommand {
            id: self.command_ids.next_id(),
            key: entry.key,
            value: entry.value,
            segment,
            metadata: entry.metadata,
            internal_metadata: entry.internal_metadata,
            flags: STATE_TRANSFER_PUT_FLAGS,
        }
    }

    fn safe_rollback(&self, manager: &dyn TransactionManager) {
        match manager.rollback() {
            Ok(()) => self.metrics.record_rollback(true),
            Err(err) => {
                self.metrics.record_rollback(false);
                debug!(
                    "event=xsite_rollback_failed cache={} error={}",
                    self.session.cache_name(),
                    err
                );
            }
        }
    }
}

impl std::fmt::Debug for StateConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateConsumer")
            .field("session", &self.session)
            .field("mode", &self.mode())
            .finish()
    }
}
