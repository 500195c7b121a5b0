//! Ledger records.
//!
//! Every record stored under a resource chain carries a [`ChainHeader`] naming
//! its type, its URL, and the key book that controls it. The [`Record`] enum
//! is the decode registry: the header's discriminant selects the variant.

use accumulate_base::encoding::{AccDecode, AccEncode, AccRead, AccWrite, DecodeError};
use accumulate_base::{Hash256, Url, UrlError};

const MAX_URL_LEN: u64 = 1024;
const MAX_KEY_LEN: u64 = 64;
const MAX_ENTRY_LEN: u64 = 1 << 24;

/// Record type discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum ChainType {
    Identity = 1,
    TokenAccount = 3,
    LiteTokenAccount = 4,
    TxReference = 5,
    Transaction = 6,
    PendingTransaction = 7,
    KeyPage = 8,
    KeyBook = 9,
}

impl ChainType {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Identity),
            3 => Some(Self::TokenAccount),
            4 => Some(Self::LiteTokenAccount),
            5 => Some(Self::TxReference),
            6 => Some(Self::Transaction),
            7 => Some(Self::PendingTransaction),
            8 => Some(Self::KeyPage),
            9 => Some(Self::KeyBook),
            _ => None,
        }
    }

    /// Transaction records may be created by any transaction; data records
    /// may only be created by synthetic transactions.
    pub fn is_transaction(self) -> bool {
        matches!(
            self,
            Self::TxReference | Self::Transaction | Self::PendingTransaction
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::TokenAccount => "tokenAccount",
            Self::LiteTokenAccount => "liteTokenAccount",
            Self::TxReference => "txReference",
            Self::Transaction => "transaction",
            Self::PendingTransaction => "pendingTransaction",
            Self::KeyPage => "keyPage",
            Self::KeyBook => "keyBook",
        }
    }
}

/// Common header carried by every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHeader {
    pub chain_type: ChainType,
    pub chain_url: String,
    /// Chain id of the controlling key book. Zero for lite accounts and
    /// transaction records.
    pub sig_spec_id: Hash256,
}

impl ChainHeader {
    pub fn new(chain_type: ChainType, url: &Url) -> Self {
        Self {
            chain_type,
            chain_url: url.to_string(),
            sig_spec_id: Hash256::ZERO,
        }
    }

    pub fn parse_url(&self) -> Result<Url, UrlError> {
        Url::parse(&self.chain_url)
    }
}

impl AccEncode for ChainHeader {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(self.chain_type as u64);
        writer.write_var_str(&self.chain_url);
        self.sig_spec_id.acc_encode(writer);
    }
}

impl AccDecode for ChainHeader {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        let raw = reader.read_uvarint()?;
        let chain_type =
            ChainType::from_u64(raw).ok_or(DecodeError::InvalidValue("chain type"))?;
        let chain_url = reader.read_var_str(MAX_URL_LEN)?;
        let sig_spec_id = Hash256::acc_decode(reader)?;
        Ok(Self {
            chain_type,
            chain_url,
            sig_spec_id,
        })
    }
}

fn write_balance<W: AccWrite>(writer: &mut W, value: u128) {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(16);
    writer.write_var_bytes(&bytes[first..]);
}

fn read_balance<R: AccRead>(reader: &mut R) -> Result<u128, DecodeError> {
    let bytes = reader.read_var_bytes(16)?;
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(&bytes);
    Ok(u128::from_be_bytes(buf))
}

/// An ADI (Accumulate Digital Identifier) root record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityState {
    pub header: ChainHeader,
    pub key_hash: Vec<u8>,
}

/// A token account bound to an identity's key book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub header: ChainHeader,
    pub token_url: String,
    pub balance: u128,
    pub tx_count: u64,
}

impl TokenAccount {
    pub fn credit(&mut self, amount: u128) {
        self.balance = self.balance.saturating_add(amount);
        self.tx_count += 1;
    }

    pub fn debit(&mut self, amount: u128) -> bool {
        if self.balance < amount {
            return false;
        }
        self.balance -= amount;
        self.tx_count += 1;
        true
    }
}

/// A token account bound directly to a key hash; its URL is the key digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteTokenAccount {
    pub header: ChainHeader,
    pub token_url: String,
    pub balance: u128,
    pub tx_count: u64,
    pub nonce: u64,
}

impl LiteTokenAccount {
    pub fn credit(&mut self, amount: u128) {
        self.balance = self.balance.saturating_add(amount);
        self.tx_count += 1;
    }

    pub fn debit(&mut self, amount: u128) -> bool {
        if self.balance < amount {
            return false;
        }
        self.balance -= amount;
        self.tx_count += 1;
        true
    }
}

/// An ordered list of key pages. The authority root of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBook {
    pub header: ChainHeader,
    pub pages: Vec<Hash256>,
}

/// A single key entry: a public key (or its SHA-256) and the last accepted
/// nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub public_key: Vec<u8>,
    pub nonce: u64,
}

/// An ordered set of key entries. Any key in the page can authorize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPage {
    pub header: ChainHeader,
    pub keys: Vec<KeySpec>,
}

impl KeyPage {
    /// Finds the entry matching the public key, either by exact bytes or by
    /// the key's SHA-256 (pages created from a key hash still authorize the
    /// raw key).
    pub fn find_key(&self, public_key: &[u8]) -> Option<usize> {
        let hashed = accumulate_base::sha256(public_key);
        self.keys.iter().position(|ks| {
            ks.public_key == public_key || ks.public_key == hashed
        })
    }
}

/// The accepted body of a transaction, content-addressed by its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxState {
    pub header: ChainHeader,
    pub body: Vec<u8>,
}

/// The full envelope plus a status document. Subject to pruning; treat as
/// possibly absent on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTxState {
    pub header: ChainHeader,
    pub envelope: Vec<u8>,
    pub status: String,
}

/// Parsed form of the pending-transaction status JSON.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TxStatus {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PendingTxState {
    pub fn parse_status(&self) -> Option<TxStatus> {
        serde_json::from_str(&self.status).ok()
    }
}

/// Back-pointer from a transaction id to the chain that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReference {
    pub header: ChainHeader,
    pub tx_id: Hash256,
}

/// Metadata for the per-identity directory index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryIndexMetadata {
    pub count: u64,
}

impl AccEncode for DirectoryIndexMetadata {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(self.count);
    }
}

impl AccDecode for DirectoryIndexMetadata {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            count: reader.read_uvarint()?,
        })
    }
}

/// A record, tagged by its header's chain type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Identity(IdentityState),
    TokenAccount(TokenAccount),
    LiteTokenAccount(LiteTokenAccount),
    KeyBook(KeyBook),
    KeyPage(KeyPage),
    Transaction(TxState),
    PendingTransaction(PendingTxState),
    TxReference(TxReference),
}

impl Record {
    pub fn header(&self) -> &ChainHeader {
        match self {
            Record::Identity(r) => &r.header,
            Record::TokenAccount(r) => &r.header,
            Record::LiteTokenAccount(r) => &r.header,
            Record::KeyBook(r) => &r.header,
            Record::KeyPage(r) => &r.header,
            Record::Transaction(r) => &r.header,
            Record::PendingTransaction(r) => &r.header,
            Record::TxReference(r) => &r.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut ChainHeader {
        match self {
            Record::Identity(r) => &mut r.header,
            Record::TokenAccount(r) => &mut r.header,
            Record::LiteTokenAccount(r) => &mut r.header,
            Record::KeyBook(r) => &mut r.header,
            Record::KeyPage(r) => &mut r.header,
            Record::Transaction(r) => &mut r.header,
            Record::PendingTransaction(r) => &mut r.header,
            Record::TxReference(r) => &mut r.header,
        }
    }

    #[inline]
    pub fn chain_type(&self) -> ChainType {
        self.header().chain_type
    }

    /// The resource chain id of this record's URL.
    pub fn chain_id(&self) -> Result<Hash256, UrlError> {
        Ok(self.header().parse_url()?.resource_chain())
    }
}

impl AccEncode for Record {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        self.header().acc_encode(writer);
        match self {
            Record::Identity(r) => {
                writer.write_var_bytes(&r.key_hash);
            }
            Record::TokenAccount(r) => {
                writer.write_var_str(&r.token_url);
                write_balance(writer, r.balance);
                writer.write_uvarint(r.tx_count);
            }
            Record::LiteTokenAccount(r) => {
                writer.write_var_str(&r.token_url);
                write_balance(writer, r.balance);
                writer.write_uvarint(r.tx_count);
                writer.write_uvarint(r.nonce);
            }
            Record::KeyBook(r) => {
                writer.write_uvarint(r.pages.len() as u64);
                for page in &r.pages {
                    page.acc_encode(writer);
                }
            }
            Record::KeyPage(r) => {
                writer.write_uvarint(r.keys.len() as u64);
                for key in &r.keys {
                    writer.write_var_bytes(&key.public_key);
                    writer.write_uvarint(key.nonce);
                }
            }
            Record::Transaction(r) => {
                writer.write_var_bytes(&r.body);
            }
            Record::PendingTransaction(r) => {
                writer.write_var_bytes(&r.envelope);
                writer.write_var_str(&r.status);
            }
            Record::TxReference(r) => {
                r.tx_id.acc_encode(writer);
            }
        }
    }
}

impl AccDecode for Record {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        let header = ChainHeader::acc_decode(reader)?;
        let record = match header.chain_type {
            ChainType::Identity => Record::Identity(IdentityState {
                header,
                key_hash: reader.read_var_bytes(MAX_KEY_LEN)?,
            }),
            ChainType::TokenAccount => Record::TokenAccount(TokenAccount {
                header,
                token_url: reader.read_var_str(MAX_URL_LEN)?,
                balance: read_balance(reader)?,
                tx_count: reader.read_uvarint()?,
            }),
            ChainType::LiteTokenAccount => Record::LiteTokenAccount(LiteTokenAccount {
                header,
                token_url: reader.read_var_str(MAX_URL_LEN)?,
                balance: read_balance(reader)?,
                tx_count: reader.read_uvarint()?,
                nonce: reader.read_uvarint()?,
            }),
            ChainType::KeyBook => {
                let count = reader.read_uvarint()?;
                let mut pages = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    pages.push(Hash256::acc_decode(reader)?);
                }
                Record::KeyBook(KeyBook { header, pages })
            }
            ChainType::KeyPage => {
                let count = reader.read_uvarint()?;
                let mut keys = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    keys.push(KeySpec {
                        public_key: reader.read_var_bytes(MAX_KEY_LEN)?,
                        nonce: reader.read_uvarint()?,
                    });
                }
                Record::KeyPage(KeyPage { header, keys })
            }
            ChainType::Transaction => Record::Transaction(TxState {
                header,
                body: reader.read_var_bytes(MAX_ENTRY_LEN)?,
            }),
            ChainType::PendingTransaction => Record::PendingTransaction(PendingTxState {
                header,
                envelope: reader.read_var_bytes(MAX_ENTRY_LEN)?,
                status: reader.read_var_str(MAX_ENTRY_LEN)?,
            }),
            ChainType::TxReference => Record::TxReference(TxReference {
                header,
                tx_id: Hash256::acc_decode(reader)?,
            }),
        };
        Ok(record)
    }
}

/// The serialized wrapper stored under a chain id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateObject {
    pub entry: Vec<u8>,
}

impl StateObject {
    pub fn from_record(record: &Record) -> Self {
        Self {
            entry: record.to_vec(),
        }
    }

    pub fn as_record(&self) -> Result<Record, DecodeError> {
        Record::from_slice(&self.entry)
    }

    pub fn as_header(&self) -> Result<ChainHeader, DecodeError> {
        let mut reader = accumulate_base::encoding::SliceReader::new(&self.entry);
        ChainHeader::acc_decode(&mut reader)
    }
}

impl AccEncode for StateObject {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_var_bytes(&self.entry);
    }
}

impl AccDecode for StateObject {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            entry: reader.read_var_bytes(MAX_ENTRY_LEN)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accumulate_base::sha256;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn header_round_trip() {
        let mut header = ChainHeader::new(ChainType::LiteTokenAccount, &url("acc://acme/chain/path"));
        header.sig_spec_id = Hash256::new(sha256(b"book"));
        let data = header.to_vec();
        let decoded = ChainHeader::from_slice(&data).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn token_account_round_trip() {
        let mut header = ChainHeader::new(ChainType::TokenAccount, &url("acc://alice/tokens"));
        header.sig_spec_id = Hash256::new(sha256(b"ssg"));
        let record = Record::TokenAccount(TokenAccount {
            header,
            token_url: "acc://ACME".into(),
            balance: 5_000_000_000_000_000_000_000u128,
            tx_count: 7,
        });
        let decoded = Record::from_slice(&record.to_vec()).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn key_page_round_trip_and_find_key() {
        let public_key = [7u8; 32];
        let page = KeyPage {
            header: ChainHeader::new(ChainType::KeyPage, &url("acc://alice/sigspec0")),
            keys: vec![KeySpec {
                public_key: sha256(public_key).to_vec(),
                nonce: 4,
            }],
        };
        let record = Record::KeyPage(page.clone());
        let decoded = Record::from_slice(&record.to_vec()).unwrap();
        assert_eq!(record, decoded);

        // Matches through the stored key hash.
        assert_eq!(page.find_key(&public_key), Some(0));
        assert_eq!(page.find_key(&[8u8; 32]), None);
    }

    #[test]
    fn state_object_round_trip() {
        let record = Record::Identity(IdentityState {
            header: ChainHeader::new(ChainType::Identity, &url("acc://alice")),
            key_hash: sha256(b"key").to_vec(),
        });
        let obj = StateObject::from_record(&record);
        let decoded = StateObject::from_slice(&obj.to_vec()).unwrap();
        assert_eq!(decoded.as_record().unwrap(), record);
        assert_eq!(decoded.as_header().unwrap().chain_type, ChainType::Identity);
    }

    #[test]
    fn unknown_chain_type_rejected() {
        let mut data = Vec::new();
        use accumulate_base::encoding::AccWrite;
        data.write_uvarint(99);
        data.write_var_str("acc://x");
        data.extend_from_slice(&[0u8; 32]);
        assert!(Record::from_slice(&data).is_err());
    }

    #[test]
    fn pending_status_parses() {
        let pending = PendingTxState {
            header: ChainHeader::new(ChainType::PendingTransaction, &url("acc://alice")),
            envelope: vec![1, 2, 3],
            status: r#"{"code":"1", "error":"failed check"}"#.into(),
        };
        let status = pending.parse_status().unwrap();
        assert_eq!(status.code, "1");
        assert_eq!(status.error.as_deref(), Some("failed check"));
    }

    #[test]
    fn balance_encoding_is_minimal() {
        let mut buf = Vec::new();
        write_balance(&mut buf, 0);
        assert_eq!(buf, vec![0]); // zero-length slice
        let mut reader = accumulate_base::encoding::SliceReader::new(&buf);
        assert_eq!(read_balance(&mut reader).unwrap(), 0);

        let mut buf = Vec::new();
        write_balance(&mut buf, u128::MAX);
        let mut reader = accumulate_base::encoding::SliceReader::new(&buf);
        assert_eq!(read_balance(&mut reader).unwrap(), u128::MAX);
    }
}
