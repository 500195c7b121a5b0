//! Read-only query payloads served to the RPC layer.

use accumulate_base::encoding::{AccDecode, AccEncode, AccRead, AccWrite, DecodeError};
use accumulate_base::Hash256;

const MAX_URL_LEN: u64 = 1024;
const MAX_PAYLOAD_LEN: u64 = 1 << 24;

/// Query type discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum QueryType {
    TxId = 1,
    TxHistory = 2,
    Url = 3,
    ChainId = 4,
    DirectoryUrl = 5,
}

impl QueryType {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::TxId),
            2 => Some(Self::TxHistory),
            3 => Some(Self::Url),
            4 => Some(Self::ChainId),
            5 => Some(Self::DirectoryUrl),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TxId => "txId",
            Self::TxHistory => "txHistory",
            Self::Url => "url",
            Self::ChainId => "chainId",
            Self::DirectoryUrl => "directoryUrl",
        }
    }
}

/// A query envelope: the discriminant plus the marshaled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub query_type: QueryType,
    pub content: Vec<u8>,
}

impl Query {
    pub fn new<B: AccEncode>(query_type: QueryType, request: &B) -> Self {
        Self {
            query_type,
            content: request.to_vec(),
        }
    }
}

impl AccEncode for Query {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(self.query_type as u64);
        writer.write_var_bytes(&self.content);
    }
}

impl AccDecode for Query {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        let raw = reader.read_uvarint()?;
        let query_type = QueryType::from_u64(raw).ok_or(DecodeError::InvalidValue("query type"))?;
        Ok(Self {
            query_type,
            content: reader.read_var_bytes(MAX_PAYLOAD_LEN)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestByTxId {
    pub tx_id: Hash256,
}

impl AccEncode for RequestByTxId {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        self.tx_id.acc_encode(writer);
    }
}

impl AccDecode for RequestByTxId {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            tx_id: Hash256::acc_decode(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTxHistory {
    pub chain_id: Hash256,
    pub start: u64,
    pub limit: u64,
}

impl AccEncode for RequestTxHistory {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        self.chain_id.acc_encode(writer);
        writer.write_uvarint(self.start);
        writer.write_uvarint(self.limit);
    }
}

impl AccDecode for RequestTxHistory {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            chain_id: Hash256::acc_decode(reader)?,
            start: reader.read_uvarint()?,
            limit: reader.read_uvarint()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestByUrl {
    pub url: String,
}

impl AccEncode for RequestByUrl {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_var_str(&self.url);
    }
}

impl AccDecode for RequestByUrl {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            url: reader.read_var_str(MAX_URL_LEN)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestByChainId {
    pub chain_id: Hash256,
}

impl AccEncode for RequestByChainId {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        self.chain_id.acc_encode(writer);
    }
}

impl AccDecode for RequestByChainId {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            chain_id: Hash256::acc_decode(reader)?,
        })
    }
}

/// Everything known about a transaction id: the accepted body, the pending
/// envelope (absent once pruned), and the ids of any synthetic transactions
/// it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseByTxId {
    pub tx_id: Hash256,
    pub tx_state: Vec<u8>,
    pub tx_pending_state: Vec<u8>,
    pub tx_synth_tx_ids: Vec<u8>,
}

impl ResponseByTxId {
    /// The synthetic transaction ids as typed hashes.
    pub fn synth_tx_ids(&self) -> Vec<Hash256> {
        self.tx_synth_tx_ids
            .chunks_exact(32)
            .map(|chunk| Hash256::from_slice(chunk).expect("32-byte chunk"))
            .collect()
    }
}

impl AccEncode for ResponseByTxId {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        self.tx_id.acc_encode(writer);
        writer.write_var_bytes(&self.tx_state);
        writer.write_var_bytes(&self.tx_pending_state);
        writer.write_var_bytes(&self.tx_synth_tx_ids);
    }
}

impl AccDecode for ResponseByTxId {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            tx_id: Hash256::acc_decode(reader)?,
            tx_state: reader.read_var_bytes(MAX_PAYLOAD_LEN)?,
            tx_pending_state: reader.read_var_bytes(MAX_PAYLOAD_LEN)?,
            tx_synth_tx_ids: reader.read_var_bytes(MAX_PAYLOAD_LEN)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseTxHistory {
    pub total: u64,
    pub transactions: Vec<ResponseByTxId>,
}

impl AccEncode for ResponseTxHistory {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(self.total);
        writer.write_uvarint(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.acc_encode(writer);
        }
    }
}

impl AccDecode for ResponseTxHistory {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        let total = reader.read_uvarint()?;
        let count = reader.read_uvarint()?;
        let mut transactions = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            transactions.push(ResponseByTxId::acc_decode(reader)?);
        }
        Ok(Self {
            total,
            transactions,
        })
    }
}

/// Paginated directory listing for an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryQueryResult {
    pub entries: Vec<String>,
}

impl AccEncode for DirectoryQueryResult {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(self.entries.len() as u64);
        for entry in &self.entries {
            writer.write_var_str(entry);
        }
    }
}

impl AccDecode for DirectoryQueryResult {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        let count = reader.read_uvarint()?;
        let mut entries = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            entries.push(reader.read_var_str(MAX_URL_LEN)?);
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accumulate_base::sha256;

    #[test]
    fn query_envelope_round_trip() {
        let request = RequestByTxId {
            tx_id: Hash256::new(sha256(b"tx")),
        };
        let query = Query::new(QueryType::TxId, &request);
        let decoded = Query::from_slice(&query.to_vec()).unwrap();
        assert_eq!(decoded, query);
        assert_eq!(
            RequestByTxId::from_slice(&decoded.content).unwrap(),
            request
        );
    }

    #[test]
    fn tx_history_round_trip() {
        let response = ResponseTxHistory {
            total: 12,
            transactions: vec![ResponseByTxId {
                tx_id: Hash256::new(sha256(b"a")),
                tx_state: vec![1, 2],
                tx_pending_state: vec![],
                tx_synth_tx_ids: sha256(b"s").to_vec(),
            }],
        };
        let decoded = ResponseTxHistory::from_slice(&response.to_vec()).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(
            decoded.transactions[0].synth_tx_ids(),
            vec![Hash256::new(sha256(b"s"))]
        );
    }

    #[test]
    fn unknown_query_type_rejected() {
        use accumulate_base::encoding::AccWrite;
        let mut data = Vec::new();
        data.write_uvarint(42);
        data.write_var_bytes(&[]);
        assert!(Query::from_slice(&data).is_err());
    }

    #[test]
    fn directory_result_round_trip() {
        let result = DirectoryQueryResult {
            entries: vec!["acc://alice/tokens".into(), "acc://alice/ssg0".into()],
        };
        assert_eq!(
            DirectoryQueryResult::from_slice(&result.to_vec()).unwrap(),
            result
        );
    }
}
