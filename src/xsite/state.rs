use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub type Key = Vec<u8>;
pub type Value = Vec<u8>;

/// User-visible metadata of a stored entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default)]
    pub lifespan: Option<Duration>,
    #[serde(default)]
    pub max_idle: Option<Duration>,
    #[serde(default)]
    pub version: Option<u64>,
}

impl EntryMetadata {
    pub fn with_version(version: u64) -> Self {
        Self {
            version: Some(version),
            ..Self::default()
        }
    }
}

/// Replication bookkeeping owned by the sending site. Carried through the
/// write pipeline untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalMetadata {
    #[serde(default)]
    pub origin_site: Option<String>,
    /// Per-site version vector used by conflict resolution.
    #[serde(default)]
    pub versions: BTreeMap<String, u64>,
}

impl InternalMetadata {
    pub fn from_site(site: impl Into<String>, version: u64) -> Self {
        let site = site.into();
        let mut versions = BTreeMap::new();
        versions.insert(site.clone(), version);
        Self {
            origin_site: Some(site),
            versions,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: Key,
    pub value: Value,
    #[serde(default)]
    pub metadata: EntryMetadata,
    #[serde(default)]
    pub internal_metadata: InternalMetadata,
}

impl StateEntry {
    pub fn new(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            metadata: EntryMetadata::default(),
            internal_metadata: InternalMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_internal_metadata(mut self, internal_metadata: InternalMetadata) -> Self {
        self.internal_metadata = internal_metadata;
        self
    }
}

// Values can be large; keep trace output to the key.
impl fmt::Debug for StateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEntry")
            .field("key", &String::from_utf8_lossy(&self.key))
            .field("value_len", &self.value.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// A batch of entries pushed by the sending site in one round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChunk {
    pub entries: Vec<StateEntry>,
}

impl StateChunk {
    pub fn new(entries: Vec<StateEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<StateEntry>> for StateChunk {
    fn from(entries: Vec<StateEntry>) -> Self {
        Self::new(entries)
    }
}

impl FromIterator<StateEntry> for StateChunk {
    fn from_iter<I: IntoIterator<Item = StateEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for StateChunk {
    type Item = StateEntry;
    type IntoIter = std::vec::IntoIter<StateEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
