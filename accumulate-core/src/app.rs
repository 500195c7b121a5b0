//! The contract the consensus engine drives.
//!
//! Consensus replicates a block stream and calls these hooks on a single
//! context per callback: `begin_block`, then any number of `check_tx` /
//! `deliver_tx`, then `end_block` and `commit`. The merkle root returned by
//! `commit` goes back to consensus as the application hash.

use std::time::SystemTime;

use accumulate_base::encoding::AccDecode;
use accumulate_types::query::Query;
use accumulate_types::{Envelope, TxResult};

use crate::error::ChainError;
use crate::executor::Executor;

#[derive(Debug, Clone, Copy)]
pub struct BeginBlockRequest {
    pub is_leader: bool,
    pub height: u64,
    pub time: SystemTime,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EndBlockRequest {}

/// The state-machine application embedded in each validator.
pub trait Application: Send + Sync {
    /// One-time chain state, applied before block 1.
    fn init_chain(&self, state: &[u8]) -> Result<(), ChainError>;

    fn begin_block(&self, request: BeginBlockRequest);

    fn check_tx(&self, raw: &[u8]) -> Result<(), ChainError>;

    fn deliver_tx(&self, raw: &[u8]) -> Result<TxResult, ChainError>;

    fn end_block(&self, request: EndBlockRequest);

    /// Returns the merkle root of the committed state.
    fn commit(&self) -> Result<Vec<u8>, ChainError>;

    /// Read-only; returns a kind tag plus the marshaled payload.
    fn query(&self, raw: &[u8]) -> Result<(&'static str, Vec<u8>), ChainError>;
}

fn decode_envelope(raw: &[u8]) -> Result<Envelope, ChainError> {
    Envelope::from_slice(raw).map_err(|e| ChainError::MalformedEnvelope(e.to_string()))
}

impl Application for Executor {
    fn init_chain(&self, state: &[u8]) -> Result<(), ChainError> {
        Executor::init_chain(self, state)
    }

    fn begin_block(&self, request: BeginBlockRequest) {
        Executor::begin_block(self, request.height, request.is_leader, request.time);
    }

    fn check_tx(&self, raw: &[u8]) -> Result<(), ChainError> {
        Executor::check_tx(self, &decode_envelope(raw)?)
    }

    fn deliver_tx(&self, raw: &[u8]) -> Result<TxResult, ChainError> {
        Executor::deliver_tx(self, &decode_envelope(raw)?)
    }

    fn end_block(&self, _request: EndBlockRequest) {
        Executor::end_block(self);
    }

    fn commit(&self) -> Result<Vec<u8>, ChainError> {
        Executor::commit(self)
    }

    fn query(&self, raw: &[u8]) -> Result<(&'static str, Vec<u8>), ChainError> {
        let query = Query::from_slice(raw)?;
        Executor::query(self, &query)
    }
}
