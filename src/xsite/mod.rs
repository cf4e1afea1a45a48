//! Receiving side of cross-site state transfer: session tracking, write
//! tagging and chunk application.

mod collaborators;
mod command;
mod consumer;
mod flags;
mod metrics;
mod session;
mod state;

pub use collaborators::{
    CommitTracker, HashPartitioner, PartitionLookup, PipelineError, SegmentId, TransactionError,
    TransactionId, TransactionManager, WritePipeline,
};
pub use command::{
    CommandId, CommandIdGenerator, PutCommand, SingleKeyWriteContext, TxWriteContext,
    WriteContext,
};
pub use consumer::{ApplyError, ApplyMode, StateConsumer, StateConsumerBuilder};
pub use flags::{WriteFlag, WriteFlags, STATE_TRANSFER_PUT_FLAGS};
pub use metrics::{
    InMemoryStateTransferMetrics, InMemoryStateTransferSnapshot, NoopStateTransferMetrics,
    StateTransferMetrics, TelemetryStateTransferMetrics,
};
pub use session::{AlreadyActive, TransferSession};
pub use state::{EntryMetadata, InternalMetadata, Key, StateChunk, StateEntry, Value};
