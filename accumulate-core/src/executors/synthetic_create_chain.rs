use accumulate_base::encoding::AccDecode;
use accumulate_types::{Envelope, Record, SyntheticCreateChain, TxType};

use crate::error::ChainError;
use crate::executor::TxExecutor;
use crate::state_manager::StateManager;

/// Applies the records carried by a synthetic create-chain on the
/// destination subnet and lists each one in its identity's directory.
pub struct SyntheticCreateChainExecutor;

impl TxExecutor for SyntheticCreateChainExecutor {
    fn tx_type(&self) -> TxType {
        TxType::SyntheticCreateChain
    }

    fn validate(&self, st: &mut StateManager, envelope: &Envelope) -> Result<(), ChainError> {
        let body = SyntheticCreateChain::from_slice(&envelope.body)
            .map_err(|e| ChainError::rejected(format!("invalid payload: {e}")))?;
        if body.chains.is_empty() {
            return Err(ChainError::rejected("no chains"));
        }

        for (i, raw) in body.chains.iter().enumerate() {
            let record = Record::from_slice(raw)
                .map_err(|e| ChainError::rejected(format!("invalid chain {i}: {e}")))?;
            let url = record
                .header()
                .parse_url()
                .map_err(|e| ChainError::rejected(format!("chain {i} has an invalid URL: {e}")))?;

            if record.chain_type().is_transaction() {
                return Err(ChainError::rejected(format!(
                    "chain {i} is a transaction record"
                )));
            }

            // Synthetic transactions may create records, so update suffices
            // whether or not the record already exists.
            st.update(record)?;
            st.add_directory_entry(&url)?;
        }
        Ok(())
    }
}
