//! The per-block transactional view.
//!
//! One `DbTransaction` is opened per block. Deliveries from every routing
//! bucket stage their writes here; `commit` lands everything under the block
//! height atomically and produces the new merkle root. Until commit, staged
//! writes are visible through `get_current_entry` but never through
//! `get_persistent_entry`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use accumulate_base::encoding::{AccDecode, AccEncode};
use accumulate_base::merkle::merkle_root;
use accumulate_base::{sha256, Hash256};
use accumulate_store::{compute_key, KeyHash, KeyPart, StoreManager};
use accumulate_types::{ChainHeader, ChainType, Record, StateObject, TxReference};

use crate::buckets;
use crate::db::{decode_id_list, encode_id_list};
use crate::error::StateError;

struct StagedState {
    chain_id: Hash256,
    tx_hash: Hash256,
    object: StateObject,
}

struct StagedTx {
    chain_id: Hash256,
    tx_hash: Hash256,
    pending: StateObject,
    accepted: Option<StateObject>,
}

struct StagedSynth {
    parent: Hash256,
    tx_hash: Hash256,
    object: StateObject,
}

#[derive(Default)]
struct TxInner {
    /// Staged record writes in insertion order; one slot per chain id.
    entries: Vec<StagedState>,
    entry_index: HashMap<Hash256, usize>,
    transactions: Vec<StagedTx>,
    synthetic: Vec<StagedSynth>,
    /// Raw key writes (secondary indices, counters). Read-your-writes.
    writes: HashMap<KeyHash, Vec<u8>>,
    write_order: Vec<KeyHash>,
    committed: bool,
}

/// A transactional view over the state database.
pub struct DbTransaction {
    manager: Arc<StoreManager>,
    inner: Mutex<TxInner>,
}

impl DbTransaction {
    pub(crate) fn new(manager: Arc<StoreManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            inner: Mutex::new(TxInner::default()),
        })
    }

    /// The last-committed object for the chain id, independent of staged
    /// writes in this transaction. Used for does-it-exist-on-disk checks.
    pub fn get_persistent_entry(&self, chain_id: &Hash256) -> Result<StateObject, StateError> {
        let key = compute_key(buckets::STATE_ENTRY, &[chain_id]);
        let bytes = self.manager.get_committed(&key)?;
        Ok(StateObject::from_slice(&bytes)?)
    }

    /// The latest object visible within this transaction.
    pub fn get_current_entry(&self, chain_id: &Hash256) -> Result<StateObject, StateError> {
        {
            let inner = self.inner.lock();
            if let Some(&idx) = inner.entry_index.get(chain_id) {
                return Ok(inner.entries[idx].object.clone());
            }
        }
        self.get_persistent_entry(chain_id)
    }

    /// Queues a record write, cross-referencing the producing transaction.
    pub fn add_state_entry(&self, chain_id: &Hash256, tx_hash: &Hash256, object: StateObject) {
        let mut inner = self.inner.lock();
        match inner.entry_index.get(chain_id) {
            Some(&idx) => {
                inner.entries[idx].tx_hash = *tx_hash;
                inner.entries[idx].object = object;
            }
            None => {
                let idx = inner.entries.len();
                inner.entries.push(StagedState {
                    chain_id: *chain_id,
                    tx_hash: *tx_hash,
                    object,
                });
                inner.entry_index.insert(*chain_id, idx);
            }
        }
    }

    /// Records the pending envelope and, when accepted, the body.
    pub fn add_transaction(
        &self,
        chain_id: &Hash256,
        tx_hash: &Hash256,
        pending: StateObject,
        accepted: Option<StateObject>,
    ) {
        self.inner.lock().transactions.push(StagedTx {
            chain_id: *chain_id,
            tx_hash: *tx_hash,
            pending,
            accepted,
        });
    }

    /// Persists an unsigned synthetic envelope and links it to its parent.
    pub fn add_synth_tx(&self, parent: &Hash256, tx_hash: &Hash256, object: StateObject) {
        self.inner.lock().synthetic.push(StagedSynth {
            parent: *parent,
            tx_hash: *tx_hash,
            object,
        });
    }

    /// The accepted body for a transaction hash, staged or committed.
    pub fn get_tx(&self, tx_id: &Hash256) -> Result<StateObject, StateError> {
        {
            let inner = self.inner.lock();
            if let Some(tx) = inner
                .transactions
                .iter()
                .rev()
                .find(|t| t.tx_hash == *tx_id)
            {
                if let Some(accepted) = &tx.accepted {
                    return Ok(accepted.clone());
                }
            }
        }
        let key = compute_key(buckets::TRANSACTION, &[tx_id]);
        let bytes = self.manager.get_committed(&key)?;
        Ok(StateObject::from_slice(&bytes)?)
    }

    /// The pending envelope for a transaction hash, staged or committed.
    pub fn get_pending_tx(&self, tx_id: &Hash256) -> Result<StateObject, StateError> {
        {
            let inner = self.inner.lock();
            if let Some(tx) = inner
                .transactions
                .iter()
                .rev()
                .find(|t| t.tx_hash == *tx_id)
            {
                return Ok(tx.pending.clone());
            }
        }
        let key = compute_key(buckets::PENDING_TRANSACTION, &[tx_id]);
        let bytes = self.manager.get_committed(&key)?;
        Ok(StateObject::from_slice(&bytes)?)
    }

    /// The unsigned envelope of a synthetic transaction, staged or committed.
    pub fn get_synthetic_tx(&self, tx_id: &Hash256) -> Result<StateObject, StateError> {
        {
            let inner = self.inner.lock();
            if let Some(synth) = inner.synthetic.iter().rev().find(|s| s.tx_hash == *tx_id) {
                return Ok(synth.object.clone());
            }
        }
        let key = compute_key(buckets::SYNTHETIC_TRANSACTION, &[tx_id]);
        let bytes = self.manager.get_committed(&key)?;
        Ok(StateObject::from_slice(&bytes)?)
    }

    /// Ids of the synthetic transactions produced by a parent, staged plus
    /// committed.
    pub fn get_synthetic_tx_ids(&self, parent: &Hash256) -> Result<Vec<Hash256>, StateError> {
        let key = compute_key(buckets::TRANSACTION_TO_SYNTHETIC, &[parent]);
        let mut ids = match self.manager.get_committed(&key) {
            Ok(bytes) => decode_id_list(&bytes)?,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let inner = self.inner.lock();
        ids.extend(
            inner
                .synthetic
                .iter()
                .filter(|s| s.parent == *parent)
                .map(|s| s.tx_hash),
        );
        if ids.is_empty() {
            return Err(StateError::NotFound);
        }
        Ok(ids)
    }

    /// Reads a raw key, preferring writes staged in this transaction.
    pub fn read(&self, key: &KeyHash) -> Result<Vec<u8>, StateError> {
        if let Some(value) = self.inner.lock().writes.get(key) {
            return Ok(value.clone());
        }
        Ok(self.manager.get_committed(key)?)
    }

    /// Stages a raw key write.
    pub fn write(&self, key: KeyHash, value: Vec<u8>) {
        let mut inner = self.inner.lock();
        if inner.writes.insert(key, value).is_none() {
            inner.write_order.push(key);
        }
    }

    /// Stages a secondary-index write.
    pub fn write_index(&self, bucket: &str, chain: &Hash256, key: &dyn KeyPart, value: Vec<u8>) {
        self.write(compute_key(bucket, &[chain, key]), value);
    }

    /// Reads a secondary-index value, staged or committed.
    pub fn get_index(
        &self,
        bucket: &str,
        chain: &Hash256,
        key: &dyn KeyPart,
    ) -> Result<Vec<u8>, StateError> {
        self.read(&compute_key(bucket, &[chain, key]))
    }

    fn chain_count(&self, chain_id: &Hash256) -> Result<u64, StateError> {
        let key = compute_key(buckets::MAIN_CHAIN, &[chain_id, &"Count"]);
        match self.manager.get(&key) {
            Ok(bytes) => {
                let array: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StateError::Store("malformed chain count".into()))?;
                Ok(u64::from_be_bytes(array))
            }
            Err(e) if e.is_not_found() => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Commits every staged write under the block height. Atomic: either all
    /// writes land and the new merkle root is returned, or none do.
    pub fn commit(&self, height: u64) -> Result<(Hash256, usize), StateError> {
        let inner = {
            let mut guard = self.inner.lock();
            if guard.committed {
                return Err(StateError::Committed);
            }
            let inner = core::mem::take(&mut *guard);
            guard.committed = true;
            inner
        };

        let change_count =
            inner.entries.len() + inner.transactions.len() + inner.synthetic.len();

        // Record objects, in insertion order.
        for staged in &inner.entries {
            let key = compute_key(buckets::STATE_ENTRY, &[&staged.chain_id]);
            self.manager.put_batch(key, staged.object.to_vec());
            let tx_key = compute_key(buckets::STATE_TX, &[&staged.chain_id]);
            self.manager.put_batch(tx_key, staged.tx_hash.to_vec());
        }

        // Pending and accepted transaction records, plus the per-chain
        // history index for accepted ones.
        for staged in &inner.transactions {
            let pending_key = compute_key(buckets::PENDING_TRANSACTION, &[&staged.tx_hash]);
            self.manager.put_batch(pending_key, staged.pending.to_vec());

            if let Some(accepted) = &staged.accepted {
                let tx_key = compute_key(buckets::TRANSACTION, &[&staged.tx_hash]);
                self.manager.put_batch(tx_key, accepted.to_vec());

                let count = self.chain_count(&staged.chain_id)?;
                let slot = compute_key(buckets::MAIN_CHAIN, &[&staged.chain_id, &count]);
                self.manager.put_batch(slot, staged.tx_hash.to_vec());
                let count_key =
                    compute_key(buckets::MAIN_CHAIN, &[&staged.chain_id, &"Count"]);
                self.manager
                    .put_batch(count_key, (count + 1).to_be_bytes().to_vec());

                // Back-pointer from the transaction id to its owning chain,
                // resolvable as a state entry of its own.
                if let Ok(header) = staged.pending.as_header() {
                    let reference = Record::TxReference(TxReference {
                        header: ChainHeader {
                            chain_type: ChainType::TxReference,
                            chain_url: header.chain_url,
                            sig_spec_id: Hash256::ZERO,
                        },
                        tx_id: staged.tx_hash,
                    });
                    let ref_chain = Hash256::new(sha256(staged.tx_hash.as_slice()));
                    let ref_key = compute_key(buckets::STATE_ENTRY, &[&ref_chain]);
                    self.manager
                        .put_batch(ref_key, StateObject::from_record(&reference).to_vec());
                }
            }
        }

        // Synthetic envelopes and the parent linkage.
        let mut synth_by_parent: Vec<(Hash256, Vec<Hash256>)> = Vec::new();
        for staged in &inner.synthetic {
            let key = compute_key(buckets::SYNTHETIC_TRANSACTION, &[&staged.tx_hash]);
            self.manager.put_batch(key, staged.object.to_vec());
            match synth_by_parent.iter_mut().find(|(p, _)| *p == staged.parent) {
                Some((_, ids)) => ids.push(staged.tx_hash),
                None => synth_by_parent.push((staged.parent, vec![staged.tx_hash])),
            }
        }
        for (parent, new_ids) in synth_by_parent {
            let key = compute_key(buckets::TRANSACTION_TO_SYNTHETIC, &[&parent]);
            let mut ids = match self.manager.get(&key) {
                Ok(bytes) => decode_id_list(&bytes)?,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            ids.extend(new_ids);
            self.manager.put_batch(key, encode_id_list(&ids));
        }

        // Raw writes (indices, counters), in write order.
        for key in &inner.write_order {
            let value = inner.writes.get(key).expect("ordered key present");
            self.manager.put_batch(*key, value.clone());
        }

        // The root covers every write of this block: leaves are the hashes
        // of the key-ordered batch contents, chained onto the previous root.
        let prev_root = {
            let key = compute_key(buckets::ROOT_HASH, &[]);
            match self.manager.get_committed(&key) {
                Ok(bytes) => Hash256::from_slice(&bytes)?,
                Err(e) if e.is_not_found() => Hash256::ZERO,
                Err(e) => return Err(e.into()),
            }
        };
        let leaves: Vec<Hash256> = self
            .manager
            .pending_snapshot()
            .iter()
            .map(|(key, value)| {
                let mut buf = Vec::with_capacity(32 + value.len());
                buf.extend_from_slice(key.as_slice());
                buf.extend_from_slice(value);
                Hash256::new(sha256(buf))
            })
            .collect();
        let changes = merkle_root(&leaves);
        let mut buf = Vec::with_capacity(72);
        buf.extend_from_slice(prev_root.as_slice());
        buf.extend_from_slice(&height.to_be_bytes());
        buf.extend_from_slice(changes.as_slice());
        let root = Hash256::new(sha256(buf));

        self.manager
            .put_batch(compute_key(buckets::ROOT_HASH, &[]), root.to_vec());
        self.manager.put_batch(
            compute_key(buckets::BLOCK_INDEX, &[]),
            height.to_be_bytes().to_vec(),
        );

        if let Err(e) = self.manager.end_batch() {
            self.manager.discard_batch();
            return Err(e.into());
        }

        info!(height, changes = change_count, root = %root, "committed block");
        debug!(height, "state transaction closed");
        Ok((root, change_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StateDb;
    use accumulate_base::Url;
    use accumulate_types::{ChainHeader, ChainType, IdentityState, Record};

    fn record(url: &str) -> (Hash256, StateObject) {
        let url = Url::parse(url).unwrap();
        let record = Record::Identity(IdentityState {
            header: ChainHeader::new(ChainType::Identity, &url),
            key_hash: vec![1, 2, 3],
        });
        (url.resource_chain(), StateObject::from_record(&record))
    }

    #[test]
    fn staged_writes_visible_current_not_persistent() {
        let db = StateDb::in_memory();
        let dbtx = db.begin();
        let (chain_id, obj) = record("acc://alice");
        let tx_hash = Hash256::new(sha256(b"tx"));

        dbtx.add_state_entry(&chain_id, &tx_hash, obj.clone());
        assert_eq!(dbtx.get_current_entry(&chain_id).unwrap(), obj);
        assert!(dbtx
            .get_persistent_entry(&chain_id)
            .unwrap_err()
            .is_not_found());

        dbtx.commit(1).unwrap();
        assert_eq!(db.get_persistent_entry(&chain_id).unwrap(), obj);
    }

    #[test]
    fn commit_sets_height_and_stable_root() {
        let db = StateDb::in_memory();
        let dbtx = db.begin();
        let (chain_id, obj) = record("acc://alice");
        dbtx.add_state_entry(&chain_id, &Hash256::new(sha256(b"tx")), obj);
        let (root, count) = dbtx.commit(1).unwrap();

        assert_eq!(db.block_index().unwrap(), 1);
        assert_eq!(db.ensure_root_hash().unwrap(), root);
        assert_eq!(count, 1);
        assert_ne!(root, Hash256::ZERO);
    }

    #[test]
    fn commit_is_deterministic() {
        let run = || {
            let db = StateDb::in_memory();
            let dbtx = db.begin();
            let (a, obj_a) = record("acc://alice");
            let (b, obj_b) = record("acc://bob");
            dbtx.add_state_entry(&a, &Hash256::new(sha256(b"t1")), obj_a);
            dbtx.add_state_entry(&b, &Hash256::new(sha256(b"t2")), obj_b);
            dbtx.commit(1).unwrap().0
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn double_commit_rejected() {
        let db = StateDb::in_memory();
        let dbtx = db.begin();
        dbtx.commit(1).unwrap();
        assert!(matches!(dbtx.commit(2), Err(StateError::Committed)));
    }

    #[test]
    fn transaction_records_and_history() {
        let db = StateDb::in_memory();
        let dbtx = db.begin();
        let (chain_id, _) = record("acc://alice");
        let tx_hash = Hash256::new(sha256(b"tx"));
        let pending = StateObject { entry: vec![1] };
        let accepted = StateObject { entry: vec![2] };

        dbtx.add_transaction(&chain_id, &tx_hash, pending.clone(), Some(accepted.clone()));
        assert_eq!(dbtx.get_tx(&tx_hash).unwrap(), accepted);
        assert_eq!(dbtx.get_pending_tx(&tx_hash).unwrap(), pending);

        dbtx.commit(1).unwrap();
        assert_eq!(db.get_tx(&tx_hash).unwrap(), accepted);
        let (ids, total) = db.get_tx_range(&chain_id, 0, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(ids, vec![tx_hash]);
    }

    #[test]
    fn accepted_transaction_writes_a_reference_record() {
        let db = StateDb::in_memory();
        let dbtx = db.begin();
        let url = Url::parse("acc://alice").unwrap();
        let tx_hash = Hash256::new(sha256(b"tx"));
        let pending = Record::PendingTransaction(accumulate_types::PendingTxState {
            header: ChainHeader {
                chain_type: ChainType::PendingTransaction,
                chain_url: url.to_string(),
                sig_spec_id: Hash256::ZERO,
            },
            envelope: vec![1],
            status: r#"{"code":"0"}"#.into(),
        });
        dbtx.add_transaction(
            &url.resource_chain(),
            &tx_hash,
            StateObject::from_record(&pending),
            Some(StateObject { entry: vec![2] }),
        );
        dbtx.commit(1).unwrap();

        let ref_chain = Hash256::new(sha256(tx_hash.as_slice()));
        let Record::TxReference(reference) = db
            .get_persistent_entry(&ref_chain)
            .unwrap()
            .as_record()
            .unwrap()
        else {
            panic!("expected a tx reference");
        };
        assert_eq!(reference.tx_id, tx_hash);
        assert_eq!(reference.header.chain_url, url.to_string());
    }

    #[test]
    fn synthetic_linkage_accumulates_across_blocks() {
        let db = StateDb::in_memory();
        let parent = Hash256::new(sha256(b"parent"));

        let dbtx = db.begin();
        let s1 = Hash256::new(sha256(b"s1"));
        dbtx.add_synth_tx(&parent, &s1, StateObject { entry: vec![1] });
        assert_eq!(dbtx.get_synthetic_tx_ids(&parent).unwrap(), vec![s1]);
        dbtx.commit(1).unwrap();

        let dbtx = db.begin();
        let s2 = Hash256::new(sha256(b"s2"));
        dbtx.add_synth_tx(&parent, &s2, StateObject { entry: vec![2] });
        assert_eq!(
            dbtx.get_synthetic_tx(&s2).unwrap(),
            StateObject { entry: vec![2] }
        );
        dbtx.commit(2).unwrap();

        assert_eq!(db.get_synthetic_tx_ids(&parent).unwrap(), vec![s1, s2]);
        // The stored envelopes survive for replay by a successor leader.
        assert_eq!(db.get_synthetic_tx(&s1).unwrap(), StateObject { entry: vec![1] });
        assert_eq!(db.get_synthetic_tx(&s2).unwrap(), StateObject { entry: vec![2] });
    }

    #[test]
    fn raw_reads_prefer_staged_writes() {
        let db = StateDb::in_memory();
        let dbtx = db.begin();
        let key = compute_key(buckets::SYNTHETIC_TX_COUNT, &[]);

        assert!(dbtx.read(&key).unwrap_err().is_not_found());
        dbtx.write(key, 7u64.to_be_bytes().to_vec());
        assert_eq!(dbtx.read(&key).unwrap(), 7u64.to_be_bytes().to_vec());
    }

    #[test]
    fn index_shadowing_within_transaction() {
        let db = StateDb::in_memory();
        let dbtx = db.begin();
        let chain = Hash256::new(sha256(b"chain"));

        dbtx.write_index(buckets::DIRECTORY_INDEX, &chain, &0u64, b"acc://alice".to_vec());
        assert_eq!(
            dbtx.get_index(buckets::DIRECTORY_INDEX, &chain, &0u64).unwrap(),
            b"acc://alice".to_vec()
        );
        dbtx.commit(1).unwrap();
        assert_eq!(
            db.get_index(buckets::DIRECTORY_INDEX, &chain, &0u64).unwrap(),
            b"acc://alice".to_vec()
        );
    }
}
