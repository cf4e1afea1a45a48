//! Seams to the rest of the cache: partitioning, the write pipeline, commit
//! tracking and the local transaction manager.

use super::command::{PutCommand, WriteContext};
use super::flags::WriteFlag;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub u32);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

pub trait PartitionLookup: Send + Sync {
    fn segment_of(&self, key: &[u8]) -> SegmentId;
}

pub trait WritePipeline: Send + Sync {
    fn apply(&self, ctx: &mut WriteContext, put: PutCommand) -> Result<(), PipelineError>;
}

pub trait CommitTracker: Send + Sync {
    fn start_tracking(&self, flag: WriteFlag);
    fn stop_tracking(&self, flag: WriteFlag);
    fn is_tracking(&self, flag: WriteFlag) -> bool;
}

/// Thread-bound transaction demarcation: a transaction begun on a thread is
/// the one `commit`/`rollback`/`current_transaction` act on from that thread.
pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> Result<(), TransactionError>;
    fn commit(&self) -> Result<(), TransactionError>;
    fn rollback(&self) -> Result<(), TransactionError>;
    fn current_transaction(&self) -> Option<TransactionId>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("write to key {key} rejected: {reason}")]
    Rejected { key: String, reason: String },
    #[error("transaction {0} is not known to the pipeline")]
    UnknownTransaction(TransactionId),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("thread is already associated with transaction {0}")]
    AlreadyAssociated(TransactionId),
    #[error("no transaction associated with the calling thread")]
    NoTransaction,
    #[error("transaction {transaction} failed to commit: {reason}")]
    CommitFailed {
        transaction: TransactionId,
        reason: String,
    },
    #[error("transaction {transaction} failed to roll back: {reason}")]
    RollbackFailed {
        transaction: TransactionId,
        reason: String,
    },
}

/// Splits the key space into a fixed number of hash segments.
#[derive(Debug, Clone)]
pub struct HashPartitioner {
    num_segments: u32,
}

impl HashPartitioner {
    /// A segment count of zero is clamped to one.
    pub fn new(num_segments: u32) -> Self {
        Self {
            num_segments: num_segments.max(1),
        }
    }

    pub fn num_segments(&self) -> u32 {
        self.num_segments
    }
}

impl PartitionLookup for HashPartitioner {
    fn segment_of(&self, key: &[u8]) -> SegmentId {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        SegmentId((hasher.finish() % u64::from(self.num_segments)) as u32)
    }
}
