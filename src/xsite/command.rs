use super::collaborators::{SegmentId, TransactionId};
use super::flags::{WriteFlag, WriteFlags};
use super::state::{EntryMetadata, InternalMetadata, Key, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Site-local identity of a write command; doubles as its lock owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct CommandIdGenerator {
    next: AtomicU64,
}

impl CommandIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> CommandId {
        CommandId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// A fully resolved put, as handed to the write pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutCommand {
    pub id: CommandId,
    pub key: Key,
    pub value: Value,
    pub segment: SegmentId,
    pub metadata: EntryMetadata,
    pub internal_metadata: InternalMetadata,
    pub flags: WriteFlags,
}

impl PutCommand {
    pub fn has_flag(&self, flag: WriteFlag) -> bool {
        self.flags.contains(flag)
    }

    pub fn key_lock_owner(&self) -> CommandId {
        self.id
    }
}

/// Write context bound to an open transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxWriteContext {
    transaction: TransactionId,
    state_transfer_flag: Option<WriteFlag>,
}

impl TxWriteContext {
    pub fn new(transaction: TransactionId) -> Self {
        Self {
            transaction,
            state_transfer_flag: None,
        }
    }

    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    pub fn set_state_transfer_flag(&mut self, flag: WriteFlag) {
        self.state_transfer_flag = Some(flag);
    }

    pub fn state_transfer_flag(&self) -> Option<WriteFlag> {
        self.state_transfer_flag
    }
}

/// Reusable context for one non-transactional key at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SingleKeyWriteContext {
    lock_owner: Option<CommandId>,
    key: Option<Key>,
}

impl SingleKeyWriteContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lock_owner(&mut self, owner: CommandId) {
        self.lock_owner = Some(owner);
    }

    pub fn lock_owner(&self) -> Option<CommandId> {
        self.lock_owner
    }

    pub fn bind_key(&mut self, key: &[u8]) {
        match &mut self.key {
            Some(existing) => {
                existing.clear();
                existing.extend_from_slice(key);
            }
            None => self.key = Some(key.to_vec()),
        }
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    /// Clears per-key state so the context can be reused for the next entry.
    pub fn reset(&mut self) {
        self.lock_owner = None;
        if let Some(key) = self.key.as_mut() {
            key.clear();
        }
    }

    pub fn is_reset(&self) -> bool {
        self.lock_owner.is_none() && self.key.as_ref().map_or(true, |key| key.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteContext {
    Transactional(TxWriteContext),
    SingleKey(SingleKeyWriteContext),
}

impl WriteContext {
    pub fn is_transactional(&self) -> bool {
        matches!(self, WriteContext::Transactional(_))
    }

    pub fn transaction(&self) -> Option<TransactionId> {
        match self {
            WriteContext::Transactional(ctx) => Some(ctx.transaction()),
            WriteContext::SingleKey(_) => None,
        }
    }

    /// Binds a single-key context to the command about to run. Transactional
    /// contexts span many keys and are left alone.
    pub fn prepare_for(&mut self, put: &PutCommand) {
        if let WriteContext::SingleKey(ctx) = self {
            ctx.set_lock_owner(put.key_lock_owner());
            ctx.bind_key(&put.key);
        }
    }

    pub fn reset(&mut self) {
        if let WriteContext::SingleKey(ctx) = self {
            ctx.reset();
        }
    }
}
