use super::{InMemoryStore, StoredEntry};
use crate::xsite::{Key, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Observer of writes that became visible in a store.
pub trait WriteListener: Send + Sync {
    fn on_write(&self, key: &[u8], entry: &StoredEntry);
}

/// Read-through local copy of a store, kept current by write notifications
/// rather than by the apply loop.
pub struct LocalMirror {
    store: Weak<InMemoryStore>,
    entries: RwLock<HashMap<Key, Value>>,
}

impl LocalMirror {
    /// Subscribes a new mirror to `store` and seeds it with the current
    /// contents.
    pub fn attach(store: &Arc<InMemoryStore>) -> Arc<Self> {
        let mirror = Arc::new(Self {
            store: Arc::downgrade(store),
            entries: RwLock::new(HashMap::new()),
        });
        store.subscribe(mirror.clone());
        {
            let mut entries = mirror.entries.write();
            for key in store.keys() {
                if let Some(value) = store.get(&key) {
                    entries.entry(key).or_insert(value);
                }
            }
        }
        mirror
    }

    pub fn get(&self, key: &[u8]) -> Option<Value> {
        if let Some(value) = self.entries.read().get(key) {
            return Some(value.clone());
        }
        let value = self.store.upgrade()?.get(key)?;
        Some(self.populate(key, value))
    }

    /// Caches a read-through value unless a write notification got there
    /// first, and returns whichever value is resident.
    fn populate(&self, key: &[u8], value: Value) -> Value {
        self.entries
            .write()
            .entry(key.to_vec())
            .or_insert(value)
            .clone()
    }

    pub fn cached(&self, key: &[u8]) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn invalidate(&self) {
        self.entries.write().clear();
    }
}

impl WriteListener for LocalMirror {
    fn on_write(&self, key: &[u8], entry: &StoredEntry) {
        self.entries.write().insert(key.to_vec(), entry.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TrackingCommitManager;
    use crate::xsite::HashPartitioner;

    #[test]
    fn mirror_follows_writes_and_reads_through() {
        let store = Arc::new(InMemoryStore::new(
            "timestamps",
            Arc::new(TrackingCommitManager::new()),
        ));
        let partitioner = HashPartitioner::new(4);
        store.put(&partitioner, "before", "1").unwrap();
        let mirror = LocalMirror::attach(&store);
        assert_eq!(mirror.cached(b"before"), Some(b"1".to_vec()));

        store.put(&partitioner, "after", "2").unwrap();
        assert_eq!(mirror.cached(b"after"), Some(b"2".to_vec()));

        mirror.invalidate();
        assert!(mirror.is_empty());
        assert_eq!(mirror.get(b"after"), Some(b"2".to_vec()));
        assert_eq!(mirror.len(), 1);
        assert!(mirror.get(b"missing").is_none());
    }

    #[test]
    fn read_through_never_replaces_a_delivered_write() {
        let store = Arc::new(InMemoryStore::new(
            "timestamps",
            Arc::new(TrackingCommitManager::new()),
        ));
        let partitioner = HashPartitioner::new(4);
        store.put(&partitioner, "k1", "old").unwrap();
        let mirror = LocalMirror::attach(&store);
        mirror.invalidate();

        // A commit notification lands between the store read and the cache fill.
        let stale = store.get(b"k1").unwrap();
        store.put(&partitioner, "k1", "new").unwrap();
        assert_eq!(mirror.populate(b"k1", stale), b"new".to_vec());
        assert_eq!(mirror.cached(b"k1"), Some(b"new".to_vec()));
        assert_eq!(mirror.get(b"k1"), Some(b"new".to_vec()));
    }
}
