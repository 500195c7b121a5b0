//! Genesis state: the protocol's ACME token root.

use accumulate_base::Url;
use accumulate_types::{ChainHeader, ChainType, KeyBook, KeyPage, KeySpec, Record, TokenAccount};

/// The protocol's ACME root URL. The synthetic sponsor of the genesis
/// transaction.
pub const ACME: &str = "acc://ACME";

/// Initial faucet balance established at genesis.
pub const FAUCET_BALANCE: u128 = 314_159_265_358_979_323_846_264_338;

pub fn acme_url() -> Url {
    Url::parse(ACME).expect("static url")
}

/// Builds the ACME faucet account plus its key book and page, authorized by
/// the given public key.
pub fn acme_records(faucet_public_key: &[u8]) -> Vec<Record> {
    let acme = acme_url();
    let book_url = acme.join_path(&["ssg0"]);
    let page_url = acme.join_path(&["sigspec0"]);
    let book_id = book_url.resource_chain();

    let mut page = KeyPage {
        header: ChainHeader::new(ChainType::KeyPage, &page_url),
        keys: vec![KeySpec {
            public_key: faucet_public_key.to_vec(),
            nonce: 0,
        }],
    };
    page.header.sig_spec_id = book_id;

    let mut book = KeyBook {
        header: ChainHeader::new(ChainType::KeyBook, &book_url),
        pages: vec![page_url.resource_chain()],
    };
    book.header.sig_spec_id = book_id;

    let mut account = TokenAccount {
        header: ChainHeader::new(ChainType::TokenAccount, &acme),
        token_url: ACME.to_string(),
        balance: FAUCET_BALANCE,
        tx_count: 0,
    };
    account.header.sig_spec_id = book_id;

    vec![
        Record::TokenAccount(account),
        Record::KeyBook(book),
        Record::KeyPage(page),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acme_records_are_linked() {
        let records = acme_records(&[1u8; 32]);
        assert_eq!(records.len(), 3);

        let book_id = acme_url().join_path(&["ssg0"]).resource_chain();
        for record in &records {
            assert_eq!(record.header().sig_spec_id, book_id);
        }

        let Record::KeyBook(book) = &records[1] else {
            panic!("expected key book");
        };
        assert_eq!(
            book.pages,
            vec![acme_url().join_path(&["sigspec0"]).resource_chain()]
        );
    }
}
