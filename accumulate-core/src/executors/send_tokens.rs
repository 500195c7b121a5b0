use accumulate_base::encoding::AccDecode;
use accumulate_base::Url;
use accumulate_types::{Envelope, Record, SendTokens, SyntheticDepositTokens, TxType};

use crate::error::ChainError;
use crate::executor::TxExecutor;
use crate::state_manager::StateManager;

/// Debits the sponsor account and produces one synthetic deposit per
/// output, each routed to the subnet that owns the destination URL.
pub struct SendTokensExecutor;

impl TxExecutor for SendTokensExecutor {
    fn tx_type(&self) -> TxType {
        TxType::SendTokens
    }

    fn validate(&self, st: &mut StateManager, envelope: &Envelope) -> Result<(), ChainError> {
        let body = SendTokens::from_slice(&envelope.body)
            .map_err(|e| ChainError::rejected(format!("invalid payload: {e}")))?;
        if body.to.is_empty() {
            return Err(ChainError::rejected("no outputs"));
        }

        let mut total: u128 = 0;
        for output in &body.to {
            Url::parse(&output.url)
                .map_err(|e| ChainError::rejected(format!("invalid destination URL: {e}")))?;
            total += u128::from(output.amount);
        }

        let token_url = match st.sponsor.clone() {
            Some(Record::LiteTokenAccount(mut account)) => {
                if !account.debit(total) {
                    return Err(ChainError::rejected("insufficient balance"));
                }
                let token_url = account.token_url.clone();
                st.update(Record::LiteTokenAccount(account))?;
                token_url
            }
            Some(Record::TokenAccount(mut account)) => {
                if !account.debit(total) {
                    return Err(ChainError::rejected("insufficient balance"));
                }
                let token_url = account.token_url.clone();
                st.update(Record::TokenAccount(account))?;
                token_url
            }
            Some(other) => {
                return Err(ChainError::rejected(format!(
                    "chain type {} cannot send tokens",
                    other.chain_type().name()
                )))
            }
            None => return Err(ChainError::BadSponsor("sponsor not found".into())),
        };

        let cause = st.tx_hash();
        for output in body.to {
            let dest = Url::parse(&output.url).expect("validated above");
            st.submit(
                dest,
                &SyntheticDepositTokens {
                    cause,
                    token_url: token_url.clone(),
                    amount: output.amount,
                },
            )?;
        }
        Ok(())
    }
}
