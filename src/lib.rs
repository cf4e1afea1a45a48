//! Receiving side of cross-site state transfer.
//! Tracks which remote site is pushing state into a cache, replays received
//! chunks through the local write pipeline with transfer tags, and bounds the
//! worker pools that run that work.

pub mod config;
pub mod executor;
pub mod store;
pub mod telemetry;
pub mod util;
pub mod xsite;

pub use config::{load_config, ConfigError, XsiteConfig, DEFAULT_NUM_SEGMENTS};
pub use executor::{
    spawn_with_capability, AdmissionDecision, AdmissionPolicy, BlockingRejectionPolicy,
    BoundedExecutor, ExecutorConfig, ExecutorConfigError, ExecutorError, ExecutorLifecycle,
    ExecutorMetrics, InMemoryExecutorMetrics, InMemoryExecutorSnapshot, NoopExecutorMetrics, Task,
    TaskId, TelemetryExecutorMetrics, ThreadCapability,
};
pub use store::{InMemoryStore, LocalMirror, StoredEntry, TrackingCommitManager, WriteListener};
pub use telemetry::{MetricKind, MetricsSnapshot, SharedMetricsRegistry, TelemetryError};
pub use util::XsiteError;
pub use xsite::{
    AlreadyActive, ApplyError, ApplyMode, CommandId, CommandIdGenerator, CommitTracker,
    EntryMetadata, HashPartitioner, InMemoryStateTransferMetrics, InMemoryStateTransferSnapshot,
    InternalMetadata, Key, NoopStateTransferMetrics, PartitionLookup, PipelineError, PutCommand,
    SegmentId, SingleKeyWriteContext, StateChunk, StateConsumer, StateConsumerBuilder, StateEntry,
    StateTransferMetrics, TelemetryStateTransferMetrics, TransactionError, TransactionId,
    TransactionManager, TransferSession, TxWriteContext, Value, WriteContext, WriteFlag,
    WriteFlags, WritePipeline, STATE_TRANSFER_PUT_FLAGS,
};
