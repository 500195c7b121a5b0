//! The state database: committed reads plus the entry point for per-block
//! transactional views.

use std::sync::Arc;

use accumulate_base::encoding::AccDecode;
use accumulate_base::Hash256;
use accumulate_store::{compute_key, KeyPart, KvStore, MemoryStore, StoreManager};
use accumulate_types::StateObject;

use crate::buckets;
use crate::error::StateError;
use crate::tx::DbTransaction;

/// Typed records keyed by chain id, over the hashed key-value facade.
///
/// All reads here observe committed state only. Mutation goes through
/// [`StateDb::begin`].
#[derive(Clone)]
pub struct StateDb {
    manager: Arc<StoreManager>,
}

impl StateDb {
    /// Opens the database over the given backend.
    pub fn open(store: Arc<dyn KvStore>) -> Self {
        Self {
            manager: Arc::new(StoreManager::new(store)),
        }
    }

    /// Opens an in-memory database. Used by tests.
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStore::new()))
    }

    pub(crate) fn manager(&self) -> &Arc<StoreManager> {
        &self.manager
    }

    /// Opens a transactional view. All block mutations must go through it.
    pub fn begin(&self) -> Arc<DbTransaction> {
        DbTransaction::new(self.manager.clone())
    }

    /// The last committed block height. `NotFound` before genesis.
    pub fn block_index(&self) -> Result<u64, StateError> {
        let key = compute_key(buckets::BLOCK_INDEX, &[]);
        let bytes = self.manager.get_committed(&key)?;
        let array: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StateError::Store("malformed block index".into()))?;
        Ok(u64::from_be_bytes(array))
    }

    /// The merkle root of the committed state. Zero before genesis.
    pub fn ensure_root_hash(&self) -> Result<Hash256, StateError> {
        let key = compute_key(buckets::ROOT_HASH, &[]);
        match self.manager.get_committed(&key) {
            Ok(bytes) => Ok(Hash256::from_slice(&bytes)?),
            Err(e) if e.is_not_found() => Ok(Hash256::ZERO),
            Err(e) => Err(e.into()),
        }
    }

    /// Records the subnet id. Called once by init-chain, before block 1.
    pub fn write_subnet_id(&self, subnet_id: &str) -> Result<(), StateError> {
        let key = compute_key(buckets::SUBNET_ID, &[]);
        self.manager.put_batch(key, subnet_id.as_bytes().to_vec());
        self.manager.end_batch()?;
        Ok(())
    }

    /// The subnet id recorded by init-chain.
    pub fn subnet_id(&self) -> Result<String, StateError> {
        let key = compute_key(buckets::SUBNET_ID, &[]);
        let bytes = self.manager.get_committed(&key)?;
        String::from_utf8(bytes).map_err(|_| StateError::Store("malformed subnet id".into()))
    }

    /// The committed object for a chain id, never an uncommitted write.
    pub fn get_persistent_entry(&self, chain_id: &Hash256) -> Result<StateObject, StateError> {
        let key = compute_key(buckets::STATE_ENTRY, &[chain_id]);
        let bytes = self.manager.get_committed(&key)?;
        Ok(StateObject::from_slice(&bytes)?)
    }

    /// The committed accepted body for a transaction hash.
    pub fn get_tx(&self, tx_id: &Hash256) -> Result<StateObject, StateError> {
        let key = compute_key(buckets::TRANSACTION, &[tx_id]);
        let bytes = self.manager.get_committed(&key)?;
        Ok(StateObject::from_slice(&bytes)?)
    }

    /// The committed pending envelope for a transaction hash. Possibly
    /// absent: pending records are pruned by an external collector.
    pub fn get_pending_tx(&self, tx_id: &Hash256) -> Result<StateObject, StateError> {
        let key = compute_key(buckets::PENDING_TRANSACTION, &[tx_id]);
        let bytes = self.manager.get_committed(&key)?;
        Ok(StateObject::from_slice(&bytes)?)
    }

    /// Ids of the synthetic transactions produced by a parent transaction.
    pub fn get_synthetic_tx_ids(&self, parent: &Hash256) -> Result<Vec<Hash256>, StateError> {
        let key = compute_key(buckets::TRANSACTION_TO_SYNTHETIC, &[parent]);
        let bytes = self.manager.get_committed(&key)?;
        decode_id_list(&bytes)
    }

    /// The committed unsigned envelope of a synthetic transaction.
    pub fn get_synthetic_tx(&self, tx_id: &Hash256) -> Result<StateObject, StateError> {
        let key = compute_key(buckets::SYNTHETIC_TRANSACTION, &[tx_id]);
        let bytes = self.manager.get_committed(&key)?;
        Ok(StateObject::from_slice(&bytes)?)
    }

    /// A committed secondary-index value.
    pub fn get_index(
        &self,
        bucket: &str,
        chain: &Hash256,
        key: &dyn KeyPart,
    ) -> Result<Vec<u8>, StateError> {
        let key = compute_key(bucket, &[chain, key]);
        Ok(self.manager.get_committed(&key)?)
    }

    /// Transaction ids `[start, start+limit)` of the chain's history, plus
    /// the total count.
    pub fn get_tx_range(
        &self,
        chain_id: &Hash256,
        start: u64,
        limit: u64,
    ) -> Result<(Vec<Hash256>, u64), StateError> {
        let count_key = compute_key(buckets::MAIN_CHAIN, &[chain_id, &"Count"]);
        let total = match self.manager.get_committed(&count_key) {
            Ok(bytes) => {
                let array: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StateError::Store("malformed chain count".into()))?;
                u64::from_be_bytes(array)
            }
            Err(e) if e.is_not_found() => 0,
            Err(e) => return Err(e.into()),
        };

        let end = start.saturating_add(limit).min(total);
        let mut ids = Vec::new();
        for n in start..end {
            let key = compute_key(buckets::MAIN_CHAIN, &[chain_id, &n]);
            let bytes = self.manager.get_committed(&key)?;
            ids.push(Hash256::from_slice(&bytes)?);
        }
        Ok((ids, total))
    }
}

pub(crate) fn decode_id_list(bytes: &[u8]) -> Result<Vec<Hash256>, StateError> {
    if bytes.len() % 32 != 0 {
        return Err(StateError::Store("malformed id list".into()));
    }
    Ok(bytes
        .chunks_exact(32)
        .map(|chunk| Hash256::from_slice(chunk).expect("32-byte chunk"))
        .collect())
}

pub(crate) fn encode_id_list(ids: &[Hash256]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ids.len() * 32);
    for id in ids {
        buf.extend_from_slice(id.as_slice());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_index_not_found_before_genesis() {
        let db = StateDb::in_memory();
        assert!(db.block_index().unwrap_err().is_not_found());
        assert_eq!(db.ensure_root_hash().unwrap(), Hash256::ZERO);
    }

    #[test]
    fn subnet_id_round_trip() {
        let db = StateDb::in_memory();
        db.write_subnet_id("BVC0").unwrap();
        assert_eq!(db.subnet_id().unwrap(), "BVC0");
    }

    #[test]
    fn reopen_yields_same_root_and_height() {
        use accumulate_store::RocksStore;
        use accumulate_types::{ChainHeader, ChainType, IdentityState, Record, StateObject};

        let dir = tempfile::tempdir().unwrap();
        let (root, chain_id) = {
            let db = StateDb::open(Arc::new(RocksStore::open(dir.path()).unwrap()));
            let dbtx = db.begin();
            let url = accumulate_base::Url::parse("acc://alice").unwrap();
            let record = Record::Identity(IdentityState {
                header: ChainHeader::new(ChainType::Identity, &url),
                key_hash: vec![7],
            });
            let chain_id = url.resource_chain();
            dbtx.add_state_entry(
                &chain_id,
                &Hash256::new(accumulate_base::sha256(b"tx")),
                StateObject::from_record(&record),
            );
            (dbtx.commit(1).unwrap().0, chain_id)
        };

        let db = StateDb::open(Arc::new(RocksStore::open(dir.path()).unwrap()));
        assert_eq!(db.block_index().unwrap(), 1);
        assert_eq!(db.ensure_root_hash().unwrap(), root);
        assert!(db.get_persistent_entry(&chain_id).is_ok());
    }

    #[test]
    fn id_list_round_trip() {
        let ids = vec![
            Hash256::new(accumulate_base::sha256(b"a")),
            Hash256::new(accumulate_base::sha256(b"b")),
        ];
        assert_eq!(decode_id_list(&encode_id_list(&ids)).unwrap(), ids);
        assert!(decode_id_list(&[0u8; 33]).is_err());
    }
}
