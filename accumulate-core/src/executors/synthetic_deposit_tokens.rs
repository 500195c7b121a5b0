use accumulate_base::encoding::AccDecode;
use accumulate_types::{
    ChainHeader, ChainType, Envelope, LiteTokenAccount, Record, SyntheticDepositTokens, TxType,
};

use crate::error::ChainError;
use crate::executor::TxExecutor;
use crate::state_manager::StateManager;

/// Credits the destination account. A missing destination is created as a
/// lite account when its URL names a key digest.
pub struct SyntheticDepositTokensExecutor;

impl TxExecutor for SyntheticDepositTokensExecutor {
    fn tx_type(&self) -> TxType {
        TxType::SyntheticDepositTokens
    }

    fn validate(&self, st: &mut StateManager, envelope: &Envelope) -> Result<(), ChainError> {
        let body = SyntheticDepositTokens::from_slice(&envelope.body)
            .map_err(|e| ChainError::rejected(format!("invalid payload: {e}")))?;

        match st.sponsor.clone() {
            Some(Record::LiteTokenAccount(mut account)) => {
                account.credit(u128::from(body.amount));
                st.update(Record::LiteTokenAccount(account))?;
            }
            Some(Record::TokenAccount(mut account)) => {
                account.credit(u128::from(body.amount));
                st.update(Record::TokenAccount(account))?;
            }
            Some(other) => {
                return Err(ChainError::rejected(format!(
                    "chain type {} cannot accept a deposit",
                    other.chain_type().name()
                )))
            }
            None => {
                // The deposit creates its own sponsor when the destination
                // is a lite address.
                if st.sponsor_url.lite_key_hash().is_none() {
                    return Err(ChainError::BadSponsor(format!(
                        "sponsor {} not found and is not a lite address",
                        st.sponsor_url
                    )));
                }
                let account = LiteTokenAccount {
                    header: ChainHeader::new(ChainType::LiteTokenAccount, &st.sponsor_url),
                    token_url: body.token_url,
                    balance: u128::from(body.amount),
                    tx_count: 1,
                    nonce: 0,
                };
                st.update(Record::LiteTokenAccount(account))?;
            }
        }
        Ok(())
    }
}
