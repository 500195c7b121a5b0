use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::key::KeyHash;
use crate::traits::KvStore;

/// A write cache in front of a backend.
///
/// `put_batch` writes land in the cache and are visible to `get` with
/// last-write-wins. `end_batch` flushes the cache to the backend as one
/// durable batch; until then the backend never sees them.
pub struct StoreManager {
    store: Arc<dyn KvStore>,
    cache: Mutex<BTreeMap<KeyHash, Vec<u8>>>,
}

impl StoreManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// Reads a value, preferring uncommitted batch writes.
    pub fn get(&self, key: &KeyHash) -> Result<Vec<u8>, StoreError> {
        if let Some(value) = self.cache.lock().get(key) {
            return Ok(value.clone());
        }
        self.store.get(key)
    }

    /// Reads a value from the backend only, ignoring uncommitted batch
    /// writes.
    pub fn get_committed(&self, key: &KeyHash) -> Result<Vec<u8>, StoreError> {
        self.store.get(key)
    }

    /// Queues a write for the current batch.
    pub fn put_batch(&self, key: KeyHash, value: Vec<u8>) {
        self.cache.lock().insert(key, value);
    }

    /// Flushes the current batch to the backend and syncs it.
    pub fn end_batch(&self) -> Result<usize, StoreError> {
        let drained: Vec<_> = {
            let mut cache = self.cache.lock();
            core::mem::take(&mut *cache).into_iter().collect()
        };
        let count = drained.len();
        if count > 0 {
            self.store.write_batch(drained)?;
        }
        debug!(writes = count, "flushed batch");
        Ok(count)
    }

    /// Discards the current batch without writing it.
    pub fn discard_batch(&self) {
        self.cache.lock().clear();
    }

    /// Number of uncommitted writes in the current batch.
    pub fn pending_writes(&self) -> usize {
        self.cache.lock().len()
    }

    /// The current batch contents, key-ordered.
    pub fn pending_snapshot(&self) -> Vec<(KeyHash, Vec<u8>)> {
        self.cache
            .lock()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::compute_key;
    use crate::memory::MemoryStore;

    fn manager() -> (Arc<MemoryStore>, StoreManager) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), StoreManager::new(store))
    }

    #[test]
    fn batched_writes_visible_to_manager_not_backend() {
        let (backend, manager) = manager();
        let key = compute_key("a", &[&"k"]);

        manager.put_batch(key, vec![1]);
        assert_eq!(manager.get(&key).unwrap(), vec![1]);
        assert!(backend.get(&key).unwrap_err().is_not_found());
        assert!(manager.get_committed(&key).unwrap_err().is_not_found());

        manager.end_batch().unwrap();
        assert_eq!(backend.get(&key).unwrap(), vec![1]);
        assert_eq!(manager.get_committed(&key).unwrap(), vec![1]);
    }

    #[test]
    fn last_write_wins_within_a_batch() {
        let (_, manager) = manager();
        let key = compute_key("a", &[&"k"]);
        manager.put_batch(key, vec![1]);
        manager.put_batch(key, vec![2]);
        assert_eq!(manager.get(&key).unwrap(), vec![2]);
        manager.end_batch().unwrap();
        assert_eq!(manager.get(&key).unwrap(), vec![2]);
    }

    #[test]
    fn discard_batch_drops_pending_writes() {
        let (backend, manager) = manager();
        let key = compute_key("a", &[&"k"]);
        manager.put_batch(key, vec![1]);
        manager.discard_batch();
        assert_eq!(manager.pending_writes(), 0);
        manager.end_batch().unwrap();
        assert!(backend.get(&key).unwrap_err().is_not_found());
    }

    #[test]
    fn every_submitted_pair_lands_after_end_batch() {
        let (backend, manager) = manager();
        let mut submitted = Vec::new();
        for i in 0u64..10 {
            let key = compute_key("a", &[&i]);
            let value = vec![i as u8; 3];
            manager.put_batch(key, value.clone());
            submitted.push((key, value));
            // Everything submitted so far reads back through the cache.
            for (k, v) in &submitted {
                assert_eq!(&manager.get(k).unwrap(), v);
            }
        }
        manager.end_batch().unwrap();
        for (k, v) in &submitted {
            assert_eq!(&backend.get(k).unwrap(), v);
        }
    }
}
