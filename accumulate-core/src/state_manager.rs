//! The per-transaction state manager.
//!
//! One instance lives for the duration of a single transaction. It memoizes
//! record loads, stages create/update intents in insertion order, buffers
//! secondary-index writes, and queues synthetic-transaction submissions.
//! Nothing touches the database until [`StateManager::commit`].

use std::collections::HashMap;
use std::sync::Arc;

use accumulate_base::encoding::AccEncode;
use accumulate_base::{Hash256, Url};
use accumulate_state::buckets::DIRECTORY_INDEX;
use accumulate_state::DbTransaction;
use accumulate_store::{compute_key, KeyHash, KeyPart};
use accumulate_types::{
    DirectoryIndexMetadata, Envelope, Record, StateObject, SyntheticCreateChain, TxType,
};

use crate::error::ChainError;
use crate::genesis;

/// A planned synthetic transaction: destination URL plus marshaled body.
#[derive(Debug, Clone)]
pub struct Submission {
    pub url: Url,
    pub body: Vec<u8>,
}

struct StagedStore {
    chain_id: Hash256,
    record: Record,
    is_create: bool,
}

/// Buffers all reads and writes of one transaction.
pub struct StateManager {
    dbtx: Arc<DbTransaction>,
    chains: HashMap<Hash256, Record>,
    stores: Vec<StagedStore>,
    store_index: HashMap<Hash256, usize>,
    writes: HashMap<KeyHash, Vec<u8>>,
    write_order: Vec<KeyHash>,
    submissions: Vec<Submission>,
    tx_hash: Hash256,
    tx_type: TxType,

    pub sponsor: Option<Record>,
    pub sponsor_url: Url,
    pub sponsor_chain_id: Hash256,
}

impl StateManager {
    /// Creates a state manager and resolves the transaction's sponsor.
    ///
    /// A missing sponsor is not necessarily fatal: the manager is returned
    /// together with the not-found error and the caller decides by
    /// transaction type. Any other failure is returned as a hard error.
    pub fn new(
        dbtx: &Arc<DbTransaction>,
        envelope: &Envelope,
    ) -> Result<(Self, Option<ChainError>), ChainError> {
        let tx_type = envelope
            .tx_type()
            .ok_or_else(|| ChainError::MalformedEnvelope("unknown transaction type".into()))?;

        let mut manager = Self {
            dbtx: dbtx.clone(),
            chains: HashMap::new(),
            stores: Vec::new(),
            store_index: HashMap::new(),
            writes: HashMap::new(),
            write_order: Vec::new(),
            submissions: Vec::new(),
            tx_hash: envelope.tx_hash(),
            tx_type,
            sponsor: None,
            sponsor_url: genesis::acme_url(),
            sponsor_chain_id: Hash256::ZERO,
        };

        // The genesis transaction is special: it establishes its own sponsor.
        if tx_type == TxType::SyntheticGenesis {
            manager.sponsor_chain_id = manager.sponsor_url.resource_chain();
            return Ok((manager, None));
        }

        manager.sponsor_url = Url::parse(&envelope.sig_info.url)?;
        manager.sponsor_chain_id = manager.sponsor_url.resource_chain();

        let sponsor_chain_id = manager.sponsor_chain_id;
        match manager.load(&sponsor_chain_id) {
            Ok(record) => {
                manager.sponsor = Some(record);
                Ok((manager, None))
            }
            Err(e) if e.is_not_found() => {
                let sponsor = manager.sponsor_url.clone();
                Ok((
                    manager,
                    Some(ChainError::BadSponsor(format!("sponsor {sponsor} not found"))),
                ))
            }
            Err(e) => Err(e),
        }
    }

    #[inline]
    pub fn tx_hash(&self) -> Hash256 {
        self.tx_hash
    }

    #[inline]
    pub fn tx_type(&self) -> TxType {
        self.tx_type
    }

    /// Loads a record by chain id. Memoized: repeated loads observe earlier
    /// `update`/`create` staging within this transaction.
    pub fn load(&mut self, chain_id: &Hash256) -> Result<Record, ChainError> {
        if let Some(record) = self.chains.get(chain_id) {
            return Ok(record.clone());
        }
        let obj = self.dbtx.get_current_entry(chain_id)?;
        let record = obj.as_record()?;
        self.chains.insert(*chain_id, record.clone());
        Ok(record)
    }

    /// Loads a record by URL.
    pub fn load_url(&mut self, url: &Url) -> Result<Record, ChainError> {
        self.load(&url.resource_chain())
    }

    fn store(&mut self, record: Record, is_create: bool) -> Result<(), ChainError> {
        let url = record.header().parse_url()?;
        let chain_id = url.resource_chain();
        self.chains.insert(chain_id, record.clone());

        match self.store_index.get(&chain_id) {
            Some(&idx) => {
                self.stores[idx].record = record;
                self.stores[idx].is_create = is_create;
            }
            None => {
                let idx = self.stores.len();
                self.stores.push(StagedStore {
                    chain_id,
                    record,
                    is_create,
                });
                self.store_index.insert(chain_id, idx);
            }
        }
        Ok(())
    }

    /// Queues a record update. At commit time the update fails if the record
    /// does not already exist, unless this transaction is synthetic or the
    /// record is a transaction record.
    pub fn update(&mut self, record: Record) -> Result<(), ChainError> {
        self.store(record, false)
    }

    /// Queues a record for a synthetic create-chain transaction. Rejected
    /// from synthetic executors and for transaction records.
    pub fn create(&mut self, record: Record) -> Result<(), ChainError> {
        if self.tx_type.is_synthetic() {
            return Err(ChainError::rejected(
                "cannot call create from a synthetic transaction",
            ));
        }
        if record.chain_type().is_transaction() {
            return Err(ChainError::rejected(
                "cannot call create with a transaction record",
            ));
        }
        self.store(record, true)
    }

    /// Queues a synthetic transaction for submission. Synthetic executors
    /// may not produce further synthetic transactions.
    pub fn submit<B: AccEncode>(&mut self, url: Url, body: &B) -> Result<(), ChainError> {
        if self.tx_type.is_synthetic() {
            return Err(ChainError::rejected(
                "cannot call submit from a synthetic transaction",
            ));
        }
        self.submissions.push(Submission {
            url,
            body: body.to_vec(),
        });
        Ok(())
    }

    /// Stages a secondary-index write, shadowing the database view within
    /// this transaction. Last write wins.
    pub fn write_index(&mut self, bucket: &str, chain: &Hash256, key: &dyn KeyPart, value: Vec<u8>) {
        let key = compute_key(bucket, &[chain, key]);
        if self.writes.insert(key, value).is_none() {
            self.write_order.push(key);
        }
    }

    /// Reads a secondary-index value, preferring writes buffered in this
    /// transaction.
    pub fn get_index(
        &self,
        bucket: &str,
        chain: &Hash256,
        key: &dyn KeyPart,
    ) -> Result<Vec<u8>, ChainError> {
        let key = compute_key(bucket, &[chain, key]);
        if let Some(value) = self.writes.get(&key) {
            return Ok(value.clone());
        }
        Ok(self.dbtx.read(&key)?)
    }

    /// Appends the URL to its identity's directory listing and bumps the
    /// listing count.
    pub fn add_directory_entry(&mut self, url: &Url) -> Result<(), ChainError> {
        let idc = url.identity_chain();
        let mut md = match self.get_index(DIRECTORY_INDEX, &idc, &"Metadata") {
            Ok(bytes) => {
                use accumulate_base::encoding::AccDecode;
                DirectoryIndexMetadata::from_slice(&bytes)?
            }
            Err(e) if e.is_not_found() => DirectoryIndexMetadata::default(),
            Err(e) => return Err(e),
        };

        let slot = md.count;
        md.count += 1;
        self.write_index(DIRECTORY_INDEX, &idc, &"Metadata", md.to_vec());
        self.write_index(DIRECTORY_INDEX, &idc, &slot, url.to_string().into_bytes());
        Ok(())
    }

    /// Flushes buffered writes and staged records into the transactional
    /// view, grouping created records into one synthetic create-chain per
    /// identity. Returns the submission queue for the synthetic engine.
    ///
    /// Any error aborts the commit; the caller must discard the block's
    /// database transaction.
    pub fn commit(mut self) -> Result<Vec<Submission>, ChainError> {
        for key in &self.write_order {
            let value = self.writes.get(key).expect("ordered key present");
            self.dbtx.write(*key, value.clone());
        }

        // One synthetic create-chain per identity: records created by one
        // create-chain must route to a single destination, and identity is
        // the routing unit.
        let mut creates: Vec<(String, Url, SyntheticCreateChain)> = Vec::new();

        for staged in &self.stores {
            if staged.is_create {
                let url = staged.record.header().parse_url()?;
                let identity = url.identity();
                let id_key = identity.to_string().to_lowercase();

                let idx = match creates.iter().position(|(key, _, _)| *key == id_key) {
                    Some(idx) => idx,
                    None => {
                        creates.push((
                            id_key,
                            identity,
                            SyntheticCreateChain {
                                cause: self.tx_hash,
                                chains: Vec::new(),
                            },
                        ));
                        creates.len() - 1
                    }
                };
                creates[idx].2.chains.push(staged.record.to_vec());
                continue;
            }

            // Updates: the record may already be staged in this block, so
            // only the persistent entry tells us whether it exists on disk.
            match self.dbtx.get_persistent_entry(&staged.chain_id) {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    let allowed = staged.record.chain_type().is_transaction()
                        || self.tx_type.is_synthetic();
                    if !allowed {
                        return Err(ChainError::rejected(
                            "cannot create a data record in a non-synthetic transaction",
                        ));
                    }
                }
                Err(e) => return Err(e.into()),
            }

            self.dbtx.add_state_entry(
                &staged.chain_id,
                &self.tx_hash,
                StateObject::from_record(&staged.record),
            );
        }

        for (_, identity, scc) in creates {
            self.submissions.push(Submission {
                url: identity,
                body: scc.to_vec(),
            });
        }

        Ok(self.submissions)
    }
}
