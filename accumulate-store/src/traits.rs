use crate::error::StoreError;
use crate::key::KeyHash;

/// Abstraction exposed by storage backends.
///
/// Backends handle their own internal locking. A batch is applied atomically
/// and durably: after `write_batch` returns, every write in it survives a
/// crash or none do.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &KeyHash) -> Result<Vec<u8>, StoreError>;

    fn put(&self, key: KeyHash, value: Vec<u8>) -> Result<(), StoreError>;

    fn write_batch(&self, batch: Vec<(KeyHash, Vec<u8>)>) -> Result<(), StoreError>;
}
