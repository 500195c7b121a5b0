use accumulate_base::encoding::AccDecode;
use accumulate_base::Url;
use accumulate_types::{
    ChainHeader, ChainType, CreateIdentity, Envelope, IdentityState, KeyBook, KeyPage, KeySpec,
    Record, TxType,
};

use crate::error::ChainError;
use crate::executor::TxExecutor;
use crate::state_manager::StateManager;

/// Creates an ADI: the identity record, a key book, and one key page
/// holding the submitted key hash. All three are carried to the identity's
/// subnet by one synthetic create-chain.
pub struct CreateIdentityExecutor;

impl TxExecutor for CreateIdentityExecutor {
    fn tx_type(&self) -> TxType {
        TxType::CreateIdentity
    }

    fn validate(&self, st: &mut StateManager, envelope: &Envelope) -> Result<(), ChainError> {
        let body = CreateIdentity::from_slice(&envelope.body)
            .map_err(|e| ChainError::rejected(format!("invalid payload: {e}")))?;

        let identity_url = Url::parse(&body.url)
            .map_err(|e| ChainError::rejected(format!("invalid identity URL: {e}")))?;
        if !identity_url.is_identity() {
            return Err(ChainError::rejected("identity URL must not have a path"));
        }
        if body.key_hash.is_empty() {
            return Err(ChainError::rejected("missing key hash"));
        }

        match &st.sponsor {
            Some(Record::LiteTokenAccount(_)) | Some(Record::Identity(_)) => {}
            Some(other) => {
                return Err(ChainError::rejected(format!(
                    "chain type {} cannot sponsor identity creation",
                    other.chain_type().name()
                )))
            }
            None => return Err(ChainError::BadSponsor("sponsor not found".into())),
        }

        let book_url = identity_url.join_path(&["ssg0"]);
        let page_url = identity_url.join_path(&["sigspec0"]);
        let book_id = book_url.resource_chain();

        let mut page = KeyPage {
            header: ChainHeader::new(ChainType::KeyPage, &page_url),
            keys: vec![KeySpec {
                public_key: body.key_hash.clone(),
                nonce: 0,
            }],
        };
        page.header.sig_spec_id = book_id;

        let mut book = KeyBook {
            header: ChainHeader::new(ChainType::KeyBook, &book_url),
            pages: vec![page_url.resource_chain()],
        };
        book.header.sig_spec_id = book_id;

        let mut identity = IdentityState {
            header: ChainHeader::new(ChainType::Identity, &identity_url),
            key_hash: body.key_hash,
        };
        identity.header.sig_spec_id = book_id;

        st.create(Record::Identity(identity))?;
        st.create(Record::KeyBook(book))?;
        st.create(Record::KeyPage(page))?;
        Ok(())
    }
}
