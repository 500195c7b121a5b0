use accumulate_base::encoding::AccDecode;
use accumulate_types::{Envelope, SyntheticGenesis, TxType};

use crate::error::ChainError;
use crate::executor::TxExecutor;
use crate::genesis;
use crate::state_manager::StateManager;

/// The one-shot bootstrap: establishes the ACME faucet account and its
/// authority records. The dispatcher removes this executor from the
/// registry after the first acceptance.
pub struct SyntheticGenesisExecutor;

impl TxExecutor for SyntheticGenesisExecutor {
    fn tx_type(&self) -> TxType {
        TxType::SyntheticGenesis
    }

    fn validate(&self, st: &mut StateManager, envelope: &Envelope) -> Result<(), ChainError> {
        SyntheticGenesis::from_slice(&envelope.body)
            .map_err(|e| ChainError::rejected(format!("invalid payload: {e}")))?;

        let faucet_key: &[u8] = envelope
            .signatures
            .first()
            .map(|sig| sig.public_key.as_slice())
            .unwrap_or(&[]);
        if faucet_key.is_empty() {
            return Err(ChainError::rejected("genesis transaction is not signed"));
        }

        for record in genesis::acme_records(faucet_key) {
            let url = record.header().parse_url()?;
            st.update(record)?;
            st.add_directory_entry(&url)?;
        }
        Ok(())
    }
}
