use std::path::Path;

use rocksdb::{Options, WriteBatch, WriteOptions, DB};
use tracing::info;

use crate::error::StoreError;
use crate::key::KeyHash;
use crate::traits::KvStore;

/// Persistent RocksDB backend.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Opens (or creates) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path.as_ref())
            .map_err(|e| StoreError::backend(format!("failed to open rocksdb: {e}")))?;
        info!(path = %path.as_ref().display(), "opened state store");
        Ok(Self { db })
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &KeyHash) -> Result<Vec<u8>, StoreError> {
        match self.db.get(key.as_slice()) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::backend(e.to_string())),
        }
    }

    fn put(&self, key: KeyHash, value: Vec<u8>) -> Result<(), StoreError> {
        self.db
            .put(key.as_slice(), value)
            .map_err(|e| StoreError::backend(e.to_string()))
    }

    fn write_batch(&self, batch: Vec<(KeyHash, Vec<u8>)>) -> Result<(), StoreError> {
        let mut wb = WriteBatch::default();
        for (key, value) in batch {
            wb.put(key.as_slice(), value);
        }
        let mut options = WriteOptions::default();
        options.set_sync(true);
        self.db
            .write_opt(wb, &options)
            .map_err(|e| StoreError::backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::compute_key;

    #[test]
    fn reopen_preserves_batch() {
        let dir = tempfile::tempdir().unwrap();
        let key = compute_key("a", &[&"persist"]);

        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.write_batch(vec![(key, vec![9, 9])]).unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&key).unwrap(), vec![9, 9]);
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let key = compute_key("a", &[&"missing"]);
        assert!(store.get(&key).unwrap_err().is_not_found());
    }
}
