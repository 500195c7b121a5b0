//! The read-only query service the RPC layer drives.
//!
//! Every state read goes through the committed view: callers never observe
//! writes staged in the current block.

use accumulate_base::encoding::{AccDecode, AccEncode};
use accumulate_base::{Hash256, Url};
use accumulate_state::buckets::DIRECTORY_INDEX;
use accumulate_types::query::{
    DirectoryQueryResult, Query, QueryType, RequestByChainId, RequestByTxId, RequestByUrl,
    RequestTxHistory, ResponseByTxId, ResponseTxHistory,
};
use accumulate_types::{DirectoryIndexMetadata, StateObject};

use crate::error::ChainError;
use crate::executor::Executor;

impl Executor {
    /// Dispatches a query and returns the response kind tag plus the
    /// marshaled payload.
    pub fn query(&self, query: &Query) -> Result<(&'static str, Vec<u8>), ChainError> {
        match query.query_type {
            QueryType::TxId => {
                let request = RequestByTxId::from_slice(&query.content)?;
                let response = self.query_by_tx_id(&request.tx_id)?;
                Ok(("tx", response.to_vec()))
            }

            QueryType::TxHistory => {
                let request = RequestTxHistory::from_slice(&query.content)?;
                let (ids, total) =
                    self.state_db()
                        .get_tx_range(&request.chain_id, request.start, request.limit)?;
                let mut response = ResponseTxHistory {
                    total,
                    transactions: Vec::with_capacity(ids.len()),
                };
                for id in ids {
                    response.transactions.push(self.query_by_tx_id(&id)?);
                }
                Ok(("tx-history", response.to_vec()))
            }

            QueryType::Url => {
                let request = RequestByUrl::from_slice(&query.content)?;
                let url = Url::parse(&request.url)?;
                match url.query_value("txid") {
                    Some(txid) => {
                        let raw = hex::decode(&txid).map_err(|_| {
                            ChainError::Rejected(format!("invalid txid {txid:?}"))
                        })?;
                        let tx_id = Hash256::from_slice(&raw)?;
                        let response = self.query_by_tx_id(&tx_id)?;
                        Ok(("tx", response.to_vec()))
                    }
                    None => {
                        let object = self.query_by_chain_id(&url.resource_chain())?;
                        Ok(("chain", object.to_vec()))
                    }
                }
            }

            QueryType::DirectoryUrl => {
                let request = RequestByUrl::from_slice(&query.content)?;
                let url = Url::parse(&request.url)?;
                let response = self.query_directory(&url.resource_chain())?;
                Ok(("directory", response.to_vec()))
            }

            QueryType::ChainId => {
                let request = RequestByChainId::from_slice(&query.content)?;
                let object = self.query_by_chain_id(&request.chain_id)?;
                Ok(("chain", object.to_vec()))
            }
        }
    }

    fn query_by_chain_id(&self, chain_id: &Hash256) -> Result<StateObject, ChainError> {
        let db = self.state_db();
        match db.get_persistent_entry(chain_id) {
            Ok(object) => {
                // The header must decode, or the entry is not a chain.
                object.as_header()?;
                Ok(object)
            }
            // The id may name a transaction instead of a chain.
            Err(e) if e.is_not_found() => match db.get_tx(chain_id) {
                Ok(object) => Ok(object),
                Err(e) if e.is_not_found() => Err(ChainError::NotFound),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    fn query_by_tx_id(&self, tx_id: &Hash256) -> Result<ResponseByTxId, ChainError> {
        let db = self.state_db();

        let tx_state = match db.get_tx(tx_id) {
            Ok(object) => object.to_vec(),
            Err(e) if e.is_not_found() => return Err(ChainError::NotFound),
            Err(e) => return Err(e.into()),
        };

        // Pending records are pruned after a couple of weeks; absence is
        // not an error.
        let tx_pending_state = match db.get_pending_tx(tx_id) {
            Ok(object) => object.to_vec(),
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let tx_synth_tx_ids = match db.get_synthetic_tx_ids(tx_id) {
            Ok(ids) => {
                let mut buf = Vec::with_capacity(ids.len() * 32);
                for id in ids {
                    buf.extend_from_slice(id.as_slice());
                }
                buf
            }
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(ResponseByTxId {
            tx_id: *tx_id,
            tx_state,
            tx_pending_state,
            tx_synth_tx_ids,
        })
    }

    fn query_directory(&self, chain_id: &Hash256) -> Result<DirectoryQueryResult, ChainError> {
        let db = self.state_db();
        let metadata = db.get_index(DIRECTORY_INDEX, chain_id, &"Metadata")?;
        let metadata = DirectoryIndexMetadata::from_slice(&metadata)?;

        let mut entries = Vec::with_capacity(metadata.count.min(1024) as usize);
        for n in 0..metadata.count {
            let entry = db
                .get_index(DIRECTORY_INDEX, chain_id, &n)
                .map_err(|_| ChainError::Db(format!("failed to get entry {n}")))?;
            entries.push(
                String::from_utf8(entry)
                    .map_err(|_| ChainError::Db(format!("malformed entry {n}")))?,
            );
        }
        Ok(DirectoryQueryResult { entries })
    }
}
