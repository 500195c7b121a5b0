//! The transaction executor: per-type validators behind the block lifecycle
//! the consensus engine drives.
//!
//! `begin_block` opens the block's database transaction. `deliver_tx` runs
//! the authoritative execution path: envelope checks, sponsor and authority
//! validation, the type executor, then the synthetic-transaction engine.
//! `commit` drains in-flight deliveries, lands the block, and flushes the
//! broadcast batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use ed25519_dalek::SigningKey;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use accumulate_base::encoding::{AccEncode, SliceReader};
use accumulate_base::{sha256, Hash256, Url};
use accumulate_state::buckets::SYNTHETIC_TX_COUNT;
use accumulate_state::{DbTransaction, StateDb};
use accumulate_store::compute_key;
use accumulate_types::{
    ChainHeader, ChainType, Envelope, PendingTxState, Record, SignatureInfo, StateObject,
    TxResult, TxSynthRef, TxType,
};

use crate::error::ChainError;
use crate::relay::Relay;
use crate::state_manager::{StateManager, Submission};
use crate::sync::{BucketLatches, WaitGroup, WaitGuard};

/// A per-type transaction validator.
pub trait TxExecutor: Send + Sync {
    fn tx_type(&self) -> TxType;

    fn validate(&self, st: &mut StateManager, envelope: &Envelope) -> Result<(), ChainError>;
}

/// Which authority validated the envelope; drives the nonce update applied
/// after a successful delivery.
pub(crate) enum Authority {
    Genesis,
    Synthetic,
    Lite(Hash256),
    Page(Hash256),
}

struct Block {
    height: u64,
    leader: bool,
    dbtx: Arc<DbTransaction>,
}

/// The block executor.
pub struct Executor {
    db: StateDb,
    key: SigningKey,
    relay: Arc<dyn Relay>,
    executors: RwLock<HashMap<TxType, Box<dyn TxExecutor>>>,
    wg: WaitGroup,
    latches: BucketLatches,
    block: RwLock<Option<Block>>,
}

fn raw_tx_type(envelope: &Envelope) -> u64 {
    use accumulate_base::encoding::AccRead;
    let mut reader = SliceReader::new(&envelope.body);
    reader.read_uvarint().unwrap_or(0)
}

impl Executor {
    /// Creates an executor with the given type validators. Panics on a
    /// duplicate registration; that is a wiring bug, not a runtime
    /// condition.
    pub fn new(
        db: StateDb,
        key: SigningKey,
        relay: Arc<dyn Relay>,
        executors: Vec<Box<dyn TxExecutor>>,
    ) -> Self {
        let mut registry: HashMap<TxType, Box<dyn TxExecutor>> = HashMap::new();
        for executor in executors {
            let tx_type = executor.tx_type();
            if registry.insert(tx_type, executor).is_some() {
                panic!("duplicate executor for {}", tx_type.name());
            }
        }

        let height = db.block_index().unwrap_or(0);
        let root = db.ensure_root_hash().unwrap_or(Hash256::ZERO);
        info!(height, root = %root, "loaded executor");

        Self {
            db,
            key,
            relay,
            executors: RwLock::new(registry),
            wg: WaitGroup::new(),
            latches: BucketLatches::new(),
            block: RwLock::new(None),
        }
    }

    /// Creates a block-validator executor with the standard transaction set.
    pub fn new_block_validator(db: StateDb, key: SigningKey, relay: Arc<dyn Relay>) -> Self {
        use crate::executors::*;
        Self::new(
            db,
            key,
            relay,
            vec![
                Box::new(CreateIdentityExecutor),
                Box::new(CreateTokenAccountExecutor),
                Box::new(SendTokensExecutor),
                Box::new(SyntheticCreateChainExecutor),
                Box::new(SyntheticDepositTokensExecutor),
                Box::new(SyntheticGenesisExecutor),
            ],
        )
    }

    #[inline]
    pub fn state_db(&self) -> &StateDb {
        &self.db
    }

    fn block(&self) -> Result<(u64, bool, Arc<DbTransaction>), ChainError> {
        let guard = self.block.read();
        let block = guard
            .as_ref()
            .ok_or_else(|| ChainError::Db("no block in progress".into()))?;
        Ok((block.height, block.leader, block.dbtx.clone()))
    }

    /// Records the chain state blob delivered before block 1.
    pub fn init_chain(&self, state: &[u8]) -> Result<(), ChainError> {
        let subnet = String::from_utf8(state.to_vec())
            .map_err(|_| ChainError::Db("malformed chain state".into()))?;
        self.db.write_subnet_id(subnet.trim())?;
        info!(subnet = subnet.trim(), "chain initialized");
        Ok(())
    }

    /// Opens a new block.
    pub fn begin_block(&self, height: u64, is_leader: bool, time: SystemTime) {
        debug!(height, is_leader, ?time, "begin block");
        self.latches.reset();
        *self.block.write() = Some(Block {
            height,
            leader: is_leader,
            dbtx: self.db.begin(),
        });
    }

    /// Stateless-plus-sponsor pre-check. No records are written.
    pub fn check_tx(&self, envelope: &Envelope) -> Result<(), ChainError> {
        let (_, _, dbtx) = self.block()?;

        let mut envelope = envelope.clone();
        let url = Url::parse(&envelope.sig_info.url)?;
        envelope.set_routing(&url);

        let (mut st, _) = self.check(&dbtx, &envelope)?;

        let raw = raw_tx_type(&envelope);
        let tx_type = envelope
            .tx_type()
            .ok_or(ChainError::UnsupportedTxType(raw))?;
        let registry = self.executors.read();
        let executor = registry
            .get(&tx_type)
            .ok_or(ChainError::UnsupportedTxType(raw))?;
        executor.validate(&mut st, &envelope)
    }

    /// Authoritative execution of one transaction.
    pub fn deliver_tx(&self, envelope: &Envelope) -> Result<TxResult, ChainError> {
        let (height, leader, dbtx) = self.block()?;
        let _in_flight = WaitGuard::enter(&self.wg);

        if envelope.body.is_empty()
            || envelope.sig_info.url.is_empty()
            || envelope.chain_id.is_zero()
        {
            return Err(ChainError::MalformedEnvelope("malformed transaction".into()));
        }

        let raw = raw_tx_type(envelope);
        let Some(tx_type) = envelope.tx_type() else {
            return Err(self.record_tx_error(&dbtx, envelope, ChainError::UnsupportedTxType(raw)));
        };
        if !self.executors.read().contains_key(&tx_type) {
            return Err(self.record_tx_error(&dbtx, envelope, ChainError::UnsupportedTxType(raw)));
        }

        // Deliveries in the same routing bucket are serialized; across
        // buckets they run in parallel.
        let bucket = self.latches.bucket(envelope.routing);
        let _latch = bucket.lock();

        let (mut st, authority) = match self.check(&dbtx, envelope) {
            Ok(checked) => checked,
            Err(e) => {
                let e = ChainError::Rejected(format!("failed check: {e}"));
                return Err(self.record_tx_error(&dbtx, envelope, e));
            }
        };

        // The registry may have lost the entry since the pre-check: the
        // genesis executor removes itself on first acceptance.
        let validated = {
            let registry = self.executors.read();
            match registry.get(&tx_type) {
                Some(executor) => executor.validate(&mut st, envelope),
                None => Err(ChainError::UnsupportedTxType(raw)),
            }
        };
        if let Err(e) = validated {
            let e = ChainError::Rejected(format!("rejected by chain: {e}"));
            return Err(self.record_tx_error(&dbtx, envelope, e));
        }

        // The genesis transaction can only be processed once.
        if tx_type == TxType::SyntheticGenesis {
            self.executors.write().remove(&TxType::SyntheticGenesis);
        }

        if let Err(e) = self.apply_nonce_updates(&mut st, envelope, &authority) {
            return Err(self.record_tx_error(&dbtx, envelope, e));
        }

        // Split the envelope: the accepted body lands on the main chain, the
        // signed envelope lands on the pending chain and is pruned later.
        let tx_hash = envelope.tx_hash();
        let accepted = Record::Transaction(accumulate_types::TxState {
            header: ChainHeader {
                chain_type: ChainType::Transaction,
                chain_url: envelope.sig_info.url.clone(),
                sig_spec_id: Hash256::ZERO,
            },
            body: envelope.body.clone(),
        });
        let pending = Record::PendingTransaction(PendingTxState {
            header: ChainHeader {
                chain_type: ChainType::PendingTransaction,
                chain_url: envelope.sig_info.url.clone(),
                sig_spec_id: Hash256::ZERO,
            },
            envelope: envelope.to_vec(),
            status: r#"{"code":"0"}"#.to_string(),
        });
        dbtx.add_transaction(
            &envelope.chain_id,
            &tx_hash,
            StateObject::from_record(&pending),
            Some(StateObject::from_record(&accepted)),
        );

        let submissions = match st.commit() {
            Ok(submissions) => submissions,
            Err(e) => return Err(self.record_tx_error(&dbtx, envelope, e)),
        };

        let refs = self.produce_synthetic(&dbtx, &tx_hash, submissions, leader, height)?;
        Ok(TxResult {
            synthetic_txs: refs,
        })
    }

    /// No-op hook.
    pub fn end_block(&self) {}

    /// Waits for in-flight deliveries, commits the block, and drains the
    /// broadcast batch. A database failure here is fatal: consensus expects
    /// a deterministic root, so the process must exit and replay.
    pub fn commit(&self) -> Result<Vec<u8>, ChainError> {
        self.wg.wait();

        let block = self
            .block
            .write()
            .take()
            .ok_or_else(|| ChainError::Db("no block in progress".into()))?;

        let (root, changes) = block
            .dbtx
            .commit(block.height)
            .unwrap_or_else(|e| panic!("fatal error, block not committed: {e}"));

        self.relay.batch_send();
        debug!(height = block.height, changes, "block committed");
        Ok(root.to_vec())
    }

    /// Validates signatures, sponsor, and authority. Returns the state
    /// manager and the authority that passed, without writing anything.
    fn check(
        &self,
        dbtx: &Arc<DbTransaction>,
        envelope: &Envelope,
    ) -> Result<(StateManager, Authority), ChainError> {
        let tx_type = envelope
            .tx_type()
            .ok_or_else(|| ChainError::MalformedEnvelope("unknown transaction type".into()))?;

        if tx_type == TxType::SyntheticGenesis {
            let (st, _) = StateManager::new(dbtx, envelope)?;
            return Ok((st, Authority::Genesis));
        }

        if envelope.signatures.is_empty() {
            return Err(ChainError::MalformedEnvelope(
                "transaction is not signed".into(),
            ));
        }
        if !envelope.validate_sig() {
            return Err(ChainError::BadSignature);
        }

        let (mut st, sponsor_missing) = StateManager::new(dbtx, envelope)?;
        if let Some(err) = sponsor_missing {
            match tx_type {
                // These transactions may create their own sponsor.
                TxType::SyntheticCreateChain | TxType::SyntheticDepositTokens => {}
                _ => return Err(err),
            }
        }

        if tx_type.is_synthetic() {
            // The envelope is signed by a validator of the producing subnet.
            // Verifying it against a directory receipt is a known gap.
            return Ok((st, Authority::Synthetic));
        }

        let sponsor = st
            .sponsor
            .clone()
            .ok_or_else(|| ChainError::BadSponsor("sponsor not found".into()))?;

        let book = match &sponsor {
            Record::LiteTokenAccount(account) => {
                let authority = self.check_anonymous(&st, envelope, account)?;
                return Ok((st, authority));
            }

            Record::Identity(_) | Record::TokenAccount(_) | Record::KeyPage(_) => {
                let sig_spec_id = sponsor.header().sig_spec_id;
                if sig_spec_id.is_zero() {
                    return Err(ChainError::BadSponsor(
                        "sponsor has not been assigned to a key book".into(),
                    ));
                }
                match st.load(&sig_spec_id)? {
                    Record::KeyBook(book) => book,
                    _ => return Err(ChainError::BadSponsor("invalid sigSpecId".into())),
                }
            }

            Record::KeyBook(book) => book.clone(),

            other => {
                return Err(ChainError::BadSponsor(format!(
                    "chain type {} cannot sponsor transactions",
                    other.chain_type().name()
                )))
            }
        };

        let priority = envelope.sig_info.priority_idx;
        if priority >= book.pages.len() as u64 {
            return Err(ChainError::BadAuthority("invalid sig spec index".into()));
        }
        let page_id = book.pages[priority as usize];
        let page = match st.load(&page_id)? {
            Record::KeyPage(page) => page,
            _ => return Err(ChainError::BadSponsor("invalid sig spec".into())),
        };

        for (i, sig) in envelope.signatures.iter().enumerate() {
            let Some(entry) = page.find_key(&sig.public_key) else {
                return Err(ChainError::BadAuthority(format!(
                    "no key spec matches signature {i}"
                )));
            };
            if page.keys[entry].nonce >= sig.nonce {
                return Err(ChainError::BadAuthority("invalid nonce".into()));
            }
        }

        Ok((st, Authority::Page(page_id)))
    }

    /// A lite sponsor binds directly to the key digest embedded in its URL.
    fn check_anonymous(
        &self,
        st: &StateManager,
        envelope: &Envelope,
        account: &accumulate_types::LiteTokenAccount,
    ) -> Result<Authority, ChainError> {
        let url_key_hash = st.sponsor_url.lite_key_hash().ok_or_else(|| {
            // Invalid URLs should never make it into the database.
            ChainError::BadSponsor("invalid anonymous token URL".into())
        })?;

        for (i, sig) in envelope.signatures.iter().enumerate() {
            let sig_key_hash = sha256(sig.public_key);
            if sig_key_hash[..20] != url_key_hash {
                return Err(ChainError::BadAuthority(format!(
                    "signature {i}'s public key does not match the sponsor"
                )));
            }
            if account.nonce >= sig.nonce {
                return Err(ChainError::BadAuthority("invalid nonce".into()));
            }
        }

        Ok(Authority::Lite(st.sponsor_chain_id))
    }

    /// Applies the accepted nonces to the authority that granted them, so a
    /// replayed signature is rejected by the next check.
    fn apply_nonce_updates(
        &self,
        st: &mut StateManager,
        envelope: &Envelope,
        authority: &Authority,
    ) -> Result<(), ChainError> {
        match authority {
            Authority::Genesis | Authority::Synthetic => Ok(()),

            Authority::Lite(chain_id) => {
                let Record::LiteTokenAccount(mut account) = st.load(chain_id)? else {
                    return Ok(());
                };
                for sig in &envelope.signatures {
                    if sig.nonce > account.nonce {
                        account.nonce = sig.nonce;
                    }
                }
                st.update(Record::LiteTokenAccount(account))
            }

            Authority::Page(page_id) => {
                let Record::KeyPage(mut page) = st.load(page_id)? else {
                    return Ok(());
                };
                for sig in &envelope.signatures {
                    if let Some(entry) = page.find_key(&sig.public_key) {
                        if sig.nonce > page.keys[entry].nonce {
                            page.keys[entry].nonce = sig.nonce;
                        }
                    }
                }
                st.update(Record::KeyPage(page))
            }
        }
    }

    /// Records a rejected transaction as a pending-only record with a
    /// non-zero status on the sponsor's chain, then hands the error back.
    fn record_tx_error(
        &self,
        dbtx: &Arc<DbTransaction>,
        envelope: &Envelope,
        err: ChainError,
    ) -> ChainError {
        let status = serde_json::json!({
            "code": "1",
            "error": err.to_string(),
        })
        .to_string();

        let pending = Record::PendingTransaction(PendingTxState {
            header: ChainHeader {
                chain_type: ChainType::PendingTransaction,
                chain_url: envelope.sig_info.url.clone(),
                sig_spec_id: Hash256::ZERO,
            },
            envelope: envelope.to_vec(),
            status,
        });
        dbtx.add_transaction(
            &envelope.chain_id,
            &envelope.tx_hash(),
            StateObject::from_record(&pending),
            None,
        );
        warn!(tx = %envelope.tx_hash(), error = %err, "transaction rejected");
        err
    }

    /// The monotonic per-subnet synthetic numbering counter, read-modify-
    /// written inside the block's database transaction.
    fn next_synth_count(&self, dbtx: &Arc<DbTransaction>) -> Result<u64, ChainError> {
        let key = compute_key(SYNTHETIC_TX_COUNT, &[]);
        let n = match dbtx.read(&key) {
            Ok(bytes) => {
                let array: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| ChainError::Db("malformed synthetic counter".into()))?;
                u64::from_be_bytes(array)
            }
            Err(e) if e.is_not_found() => 0,
            Err(e) => return Err(e.into()),
        };
        dbtx.write(key, (n + 1).to_be_bytes().to_vec());
        Ok(n)
    }

    /// The synthetic-transaction engine. Every node persists the unsigned
    /// envelope so a successor leader can replay it; only the leader signs
    /// and queues the broadcast.
    fn produce_synthetic(
        &self,
        dbtx: &Arc<DbTransaction>,
        parent: &Hash256,
        submissions: Vec<Submission>,
        leader: bool,
        height: u64,
    ) -> Result<Vec<TxSynthRef>, ChainError> {
        let mut refs = Vec::new();

        for submission in submissions {
            let mut envelope = Envelope {
                signatures: Vec::new(),
                sig_info: SignatureInfo {
                    url: submission.url.to_string(),
                    ms_height: height,
                    priority_idx: 0,
                    nonce: self.next_synth_count(dbtx)?,
                },
                routing: 0,
                chain_id: Hash256::ZERO,
                body: submission.body,
            };
            envelope.set_routing(&submission.url);

            let synth_hash = envelope.tx_hash();
            let pending = Record::PendingTransaction(PendingTxState {
                header: ChainHeader {
                    chain_type: ChainType::PendingTransaction,
                    chain_url: envelope.sig_info.url.clone(),
                    sig_spec_id: Hash256::ZERO,
                },
                envelope: envelope.to_vec(),
                status: String::new(),
            });
            dbtx.add_synth_tx(parent, &synth_hash, StateObject::from_record(&pending));

            if leader {
                let nonce = envelope.sig_info.nonce;
                envelope.sign(nonce, &self.key);
                let reference = self
                    .relay
                    .queue(&envelope)
                    .map_err(|e| ChainError::Db(e.to_string()))?;
                refs.push(TxSynthRef {
                    tx_type: raw_tx_type(&envelope),
                    url: envelope.sig_info.url.clone(),
                    tx_hash: synth_hash,
                    tx_ref: reference,
                });
            }
        }

        Ok(refs)
    }
}
