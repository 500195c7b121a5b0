use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::key::KeyHash;
use crate::traits::KvStore;

/// In-memory backend. Used by tests and single-process tooling.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<BTreeMap<[u8; 32], Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &KeyHash) -> Result<Vec<u8>, StoreError> {
        self.inner
            .lock()
            .get(&key.0)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn put(&self, key: KeyHash, value: Vec<u8>) -> Result<(), StoreError> {
        self.inner.lock().insert(key.0, value);
        Ok(())
    }

    fn write_batch(&self, batch: Vec<(KeyHash, Vec<u8>)>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        for (key, value) in batch {
            inner.insert(key.0, value);
        }
        Ok(())
    }
}
