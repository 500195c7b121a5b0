use accumulate_base::encoding::AccDecode;
use accumulate_base::Url;
use accumulate_types::{
    ChainHeader, ChainType, CreateTokenAccount, Envelope, Record, TokenAccount, TxType,
};

use crate::error::ChainError;
use crate::executor::TxExecutor;
use crate::state_manager::StateManager;

/// Creates a token account under the sponsor identity, controlled by the
/// sponsor's key book.
pub struct CreateTokenAccountExecutor;

impl TxExecutor for CreateTokenAccountExecutor {
    fn tx_type(&self) -> TxType {
        TxType::CreateTokenAccount
    }

    fn validate(&self, st: &mut StateManager, envelope: &Envelope) -> Result<(), ChainError> {
        let body = CreateTokenAccount::from_slice(&envelope.body)
            .map_err(|e| ChainError::rejected(format!("invalid payload: {e}")))?;

        let account_url = Url::parse(&body.url)
            .map_err(|e| ChainError::rejected(format!("invalid account URL: {e}")))?;
        Url::parse(&body.token_url)
            .map_err(|e| ChainError::rejected(format!("invalid token URL: {e}")))?;

        let sponsor = match &st.sponsor {
            Some(Record::Identity(identity)) => identity.clone(),
            Some(other) => {
                return Err(ChainError::rejected(format!(
                    "chain type {} cannot sponsor token account creation",
                    other.chain_type().name()
                )))
            }
            None => return Err(ChainError::BadSponsor("sponsor not found".into())),
        };

        if !account_url.identity().eq_fold(&st.sponsor_url.identity()) {
            return Err(ChainError::rejected(
                "account URL does not belong to the sponsor identity",
            ));
        }

        let mut account = TokenAccount {
            header: ChainHeader::new(ChainType::TokenAccount, &account_url),
            token_url: body.token_url,
            balance: 0,
            tx_count: 0,
        };
        account.header.sig_spec_id = sponsor.header.sig_spec_id;

        st.create(Record::TokenAccount(account))?;
        Ok(())
    }
}
