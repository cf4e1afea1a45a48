use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker flags attached to a write on its way through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteFlag {
    /// The write replays state pushed by a remote site.
    TransferOrigin,
    /// The caller does not need the previous value back.
    SuppressReturnValue,
    /// Do not fetch the previous value from other owners.
    SkipRemoteLookup,
    /// Do not forward the write to backup sites.
    SkipCrossSiteBackup,
    /// The write carries the remote site's internal (versioning) state.
    TransferInternalState,
}

impl WriteFlag {
    pub const ALL: [WriteFlag; 5] = [
        WriteFlag::TransferOrigin,
        WriteFlag::SuppressReturnValue,
        WriteFlag::SkipRemoteLookup,
        WriteFlag::SkipCrossSiteBackup,
        WriteFlag::TransferInternalState,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn label(&self) -> &'static str {
        match self {
            WriteFlag::TransferOrigin => "transfer_origin",
            WriteFlag::SuppressReturnValue => "suppress_return_value",
            WriteFlag::SkipRemoteLookup => "skip_remote_lookup",
            WriteFlag::SkipCrossSiteBackup => "skip_xsite_backup",
            WriteFlag::TransferInternalState => "transfer_internal_state",
        }
    }
}

impl fmt::Display for WriteFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Compact bit-set of [`WriteFlag`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WriteFlags(u8);

impl WriteFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, flag: WriteFlag) -> Self {
        Self(self.0 | flag.bit())
    }

    pub const fn contains(&self, flag: WriteFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, flag: WriteFlag) {
        self.0 |= flag.bit();
    }

    pub fn remove(&mut self, flag: WriteFlag) {
        self.0 &= !flag.bit();
    }

    pub fn iter(&self) -> impl Iterator<Item = WriteFlag> + '_ {
        WriteFlag::ALL
            .into_iter()
            .filter(move |flag| self.contains(*flag))
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }
}

impl FromIterator<WriteFlag> for WriteFlags {
    fn from_iter<I: IntoIterator<Item = WriteFlag>>(iter: I) -> Self {
        iter.into_iter()
            .fold(WriteFlags::empty(), |flags, flag| flags.with(flag))
    }
}

impl fmt::Debug for WriteFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Fixed tag set carried by every put built from a received state entry.
pub const STATE_TRANSFER_PUT_FLAGS: WriteFlags = WriteFlags::empty()
    .with(WriteFlag::TransferOrigin)
    .with(WriteFlag::SuppressReturnValue)
    .with(WriteFlag::SkipRemoteLookup)
    .with(WriteFlag::SkipCrossSiteBackup)
    .with(WriteFlag::TransferInternalState);
