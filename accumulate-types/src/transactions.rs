//! Transaction envelopes and bodies.
//!
//! Every transaction travels as an [`Envelope`]: one or more ed25519
//! signatures, the signature-info block naming the sponsor, the routing
//! prefix and chain id of the destination, and the type-tagged body. The
//! transaction hash is the SHA-256 of the body bytes alone; each signature
//! covers the uvarint-encoded nonce followed by that hash.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use accumulate_base::encoding::{AccDecode, AccEncode, AccRead, AccWrite, DecodeError, SliceReader};
use accumulate_base::{sha256, Hash256, Url};

/// Bounds on the number of signatures per envelope.
pub const MAX_SIGNATURES: u64 = 100;

const MAX_URL_LEN: u64 = 1024;
const MAX_BODY_LEN: u64 = 1 << 24;

/// Transaction type discriminants. Values at or above `0x30` are synthetic:
/// produced by the execution of another transaction, never submitted by a
/// user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum TxType {
    CreateIdentity = 0x01,
    CreateTokenAccount = 0x02,
    SendTokens = 0x03,
    SyntheticCreateChain = 0x31,
    SyntheticDepositTokens = 0x32,
    SyntheticGenesis = 0x33,
}

const SYNTHETIC_BASE: u64 = 0x30;

impl TxType {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0x01 => Some(Self::CreateIdentity),
            0x02 => Some(Self::CreateTokenAccount),
            0x03 => Some(Self::SendTokens),
            0x31 => Some(Self::SyntheticCreateChain),
            0x32 => Some(Self::SyntheticDepositTokens),
            0x33 => Some(Self::SyntheticGenesis),
            _ => None,
        }
    }

    #[inline]
    pub fn is_synthetic(self) -> bool {
        self as u64 >= SYNTHETIC_BASE
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateIdentity => "createIdentity",
            Self::CreateTokenAccount => "createTokenAccount",
            Self::SendTokens => "sendTokens",
            Self::SyntheticCreateChain => "syntheticCreateChain",
            Self::SyntheticDepositTokens => "syntheticDepositTokens",
            Self::SyntheticGenesis => "syntheticGenesis",
        }
    }
}

/// Reads the type discriminant from the first uvarint of a transaction body.
pub fn body_type(body: &[u8]) -> Option<TxType> {
    let mut reader = SliceReader::new(body);
    reader.read_uvarint().ok().and_then(TxType::from_u64)
}

fn read_body_type<R: AccRead>(reader: &mut R, expected: TxType) -> Result<(), DecodeError> {
    let raw = reader.read_uvarint()?;
    if raw != expected as u64 {
        return Err(DecodeError::InvalidValue("transaction type"));
    }
    Ok(())
}

/// Creates an identity (ADI) with a key book and one key page holding the
/// given key hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIdentity {
    pub url: String,
    pub key_hash: Vec<u8>,
}

impl AccEncode for CreateIdentity {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(TxType::CreateIdentity as u64);
        writer.write_var_str(&self.url);
        writer.write_var_bytes(&self.key_hash);
    }
}

impl AccDecode for CreateIdentity {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        read_body_type(reader, TxType::CreateIdentity)?;
        Ok(Self {
            url: reader.read_var_str(MAX_URL_LEN)?,
            key_hash: reader.read_var_bytes(64)?,
        })
    }
}

/// Creates a token account under the sponsor identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTokenAccount {
    pub url: String,
    pub token_url: String,
}

impl AccEncode for CreateTokenAccount {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(TxType::CreateTokenAccount as u64);
        writer.write_var_str(&self.url);
        writer.write_var_str(&self.token_url);
    }
}

impl AccDecode for CreateTokenAccount {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        read_body_type(reader, TxType::CreateTokenAccount)?;
        Ok(Self {
            url: reader.read_var_str(MAX_URL_LEN)?,
            token_url: reader.read_var_str(MAX_URL_LEN)?,
        })
    }
}

/// One destination of a token send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOutput {
    pub url: String,
    pub amount: u64,
}

/// Debits the sponsor and produces one synthetic deposit per output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTokens {
    pub to: Vec<TokenOutput>,
}

impl AccEncode for SendTokens {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(TxType::SendTokens as u64);
        writer.write_uvarint(self.to.len() as u64);
        for output in &self.to {
            writer.write_var_str(&output.url);
            writer.write_uvarint(output.amount);
        }
    }
}

impl AccDecode for SendTokens {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        read_body_type(reader, TxType::SendTokens)?;
        let count = reader.read_uvarint()?;
        let mut to = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            to.push(TokenOutput {
                url: reader.read_var_str(MAX_URL_LEN)?,
                amount: reader.read_uvarint()?,
            });
        }
        Ok(Self { to })
    }
}

/// Carries marshaled records to the subnet that owns their identity. One
/// envelope per identity; all records inside route to the same place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntheticCreateChain {
    pub cause: Hash256,
    pub chains: Vec<Vec<u8>>,
}

impl AccEncode for SyntheticCreateChain {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(TxType::SyntheticCreateChain as u64);
        self.cause.acc_encode(writer);
        writer.write_uvarint(self.chains.len() as u64);
        for chain in &self.chains {
            writer.write_var_bytes(chain);
        }
    }
}

impl AccDecode for SyntheticCreateChain {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        read_body_type(reader, TxType::SyntheticCreateChain)?;
        let cause = Hash256::acc_decode(reader)?;
        let count = reader.read_uvarint()?;
        let mut chains = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            chains.push(reader.read_var_bytes(MAX_BODY_LEN)?);
        }
        Ok(Self { cause, chains })
    }
}

/// Credits tokens to the destination account, creating a lite account when
/// the destination names a key digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticDepositTokens {
    pub cause: Hash256,
    pub token_url: String,
    pub amount: u64,
}

impl AccEncode for SyntheticDepositTokens {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(TxType::SyntheticDepositTokens as u64);
        self.cause.acc_encode(writer);
        writer.write_var_str(&self.token_url);
        writer.write_uvarint(self.amount);
    }
}

impl AccDecode for SyntheticDepositTokens {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        read_body_type(reader, TxType::SyntheticDepositTokens)?;
        Ok(Self {
            cause: Hash256::acc_decode(reader)?,
            token_url: reader.read_var_str(MAX_URL_LEN)?,
            amount: reader.read_uvarint()?,
        })
    }
}

/// The one-shot bootstrap transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyntheticGenesis {}

impl AccEncode for SyntheticGenesis {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(TxType::SyntheticGenesis as u64);
    }
}

impl AccDecode for SyntheticGenesis {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        read_body_type(reader, TxType::SyntheticGenesis)?;
        Ok(Self {})
    }
}

/// An ed25519 signature over the uvarint-encoded nonce followed by the
/// transaction hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ed25519Sig {
    pub public_key: [u8; 32],
    pub nonce: u64,
    pub signature: [u8; 64],
}

impl Ed25519Sig {
    /// Signs the digest with the nonce folded into the signed message.
    pub fn sign(nonce: u64, key: &SigningKey, digest: &Hash256) -> Self {
        let mut message = Vec::with_capacity(42);
        message.write_uvarint(nonce);
        message.write_bytes(digest.as_slice());
        let signature = key.sign(&message);
        Self {
            public_key: key.verifying_key().to_bytes(),
            nonce,
            signature: signature.to_bytes(),
        }
    }

    /// Verifies the signature against the digest.
    pub fn verify(&self, digest: &Hash256) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.public_key) else {
            return false;
        };
        let mut message = Vec::with_capacity(42);
        message.write_uvarint(self.nonce);
        message.write_bytes(digest.as_slice());
        let signature = Signature::from_bytes(&self.signature);
        key.verify(&message, &signature).is_ok()
    }
}

impl AccEncode for Ed25519Sig {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_bytes(&self.public_key);
        writer.write_uvarint(self.nonce);
        writer.write_bytes(&self.signature);
    }
}

impl AccDecode for Ed25519Sig {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut public_key = [0u8; 32];
        reader.read_into(&mut public_key)?;
        let nonce = reader.read_uvarint()?;
        let mut signature = [0u8; 64];
        reader.read_into(&mut signature)?;
        Ok(Self {
            public_key,
            nonce,
            signature,
        })
    }
}

/// Names the sponsor and the authority path used to validate the envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureInfo {
    /// The sponsor URL.
    pub url: String,
    /// Main-chain height the signer observed.
    pub ms_height: u64,
    /// Which key page within the sponsor's key book the signatures satisfy.
    pub priority_idx: u64,
    /// Envelope-level nonce; used by the synthetic numbering scheme.
    pub nonce: u64,
}

impl AccEncode for SignatureInfo {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_var_str(&self.url);
        writer.write_uvarint(self.ms_height);
        writer.write_uvarint(self.priority_idx);
        writer.write_uvarint(self.nonce);
    }
}

impl AccDecode for SignatureInfo {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            url: reader.read_var_str(MAX_URL_LEN)?,
            ms_height: reader.read_uvarint()?,
            priority_idx: reader.read_uvarint()?,
            nonce: reader.read_uvarint()?,
        })
    }
}

/// A signed transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub signatures: Vec<Ed25519Sig>,
    pub sig_info: SignatureInfo,
    pub routing: u64,
    pub chain_id: Hash256,
    pub body: Vec<u8>,
}

impl Envelope {
    /// Builds an unsigned envelope addressed to `dest`, with routing and
    /// chain id derived from it.
    pub fn new<B: AccEncode>(dest: &Url, body: &B) -> Self {
        let mut envelope = Self {
            signatures: Vec::new(),
            sig_info: SignatureInfo {
                url: dest.to_string(),
                ..SignatureInfo::default()
            },
            routing: 0,
            chain_id: Hash256::ZERO,
            body: body.to_vec(),
        };
        envelope.set_routing(dest);
        envelope
    }

    /// The transaction hash: SHA-256 of the body bytes alone.
    #[inline]
    pub fn tx_hash(&self) -> Hash256 {
        Hash256::new(sha256(&self.body))
    }

    /// The type discriminant from the first uvarint of the body.
    #[inline]
    pub fn tx_type(&self) -> Option<TxType> {
        body_type(&self.body)
    }

    /// Recomputes the routing prefix and chain id from a URL.
    pub fn set_routing(&mut self, url: &Url) {
        self.routing = url.routing();
        self.chain_id = url.resource_chain();
    }

    /// Signs the transaction hash and appends the signature.
    pub fn sign(&mut self, nonce: u64, key: &SigningKey) {
        let digest = self.tx_hash();
        self.signatures.push(Ed25519Sig::sign(nonce, key, &digest));
    }

    /// Verifies every signature against the transaction hash. An envelope
    /// with no signatures does not validate.
    pub fn validate_sig(&self) -> bool {
        if self.signatures.is_empty() {
            return false;
        }
        let digest = self.tx_hash();
        self.signatures.iter().all(|sig| sig.verify(&digest))
    }
}

impl AccEncode for Envelope {
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_uvarint(self.signatures.len() as u64);
        for sig in &self.signatures {
            sig.acc_encode(writer);
        }
        self.sig_info.acc_encode(writer);
        writer.write_uvarint(self.routing);
        writer.write_var_bytes(self.chain_id.as_slice());
        writer.write_var_bytes(&self.body);
    }
}

impl AccDecode for Envelope {
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        let count = reader.read_uvarint()?;
        if count < 1 || count > MAX_SIGNATURES {
            return Err(DecodeError::InvalidValue("signature count"));
        }
        let mut signatures = Vec::with_capacity(count as usize);
        for _ in 0..count {
            signatures.push(Ed25519Sig::acc_decode(reader)?);
        }
        let sig_info = SignatureInfo::acc_decode(reader)?;
        let routing = reader.read_uvarint()?;
        let chain_id = reader.read_var_bytes(32)?;
        let chain_id = Hash256::from_slice(&chain_id)
            .map_err(|_| DecodeError::InvalidValue("chain id length"))?;
        let body = reader.read_var_bytes(MAX_BODY_LEN)?;
        Ok(Self {
            signatures,
            sig_info,
            routing,
            chain_id,
            body,
        })
    }
}

/// Reference to a synthetic transaction handed to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSynthRef {
    pub tx_type: u64,
    pub url: String,
    pub tx_hash: Hash256,
    pub tx_ref: Hash256,
}

/// Result of a successful delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxResult {
    pub synthetic_txs: Vec<TxSynthRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(seed: &[u8]) -> SigningKey {
        SigningKey::from_bytes(&sha256(seed))
    }

    fn sample_envelope() -> Envelope {
        let dest = Url::parse("acc://alice/tokens").unwrap();
        let body = SendTokens {
            to: vec![TokenOutput {
                url: "acc://bob/tokens".into(),
                amount: 50,
            }],
        };
        Envelope::new(&dest, &body)
    }

    #[test]
    fn sign_and_verify() {
        let key = test_key(b"signer");
        let mut envelope = sample_envelope();
        envelope.sign(1, &key);
        assert!(envelope.validate_sig());

        // A flipped body byte invalidates every signature.
        envelope.body[0] ^= 1;
        assert!(!envelope.validate_sig());
    }

    #[test]
    fn signature_covers_nonce() {
        let key = test_key(b"signer");
        let mut envelope = sample_envelope();
        envelope.sign(5, &key);
        envelope.signatures[0].nonce = 6;
        assert!(!envelope.validate_sig());
    }

    #[test]
    fn unsigned_envelope_does_not_validate() {
        assert!(!sample_envelope().validate_sig());
    }

    #[test]
    fn marshal_round_trip_is_byte_identical() {
        let key = test_key(b"signer");
        let mut envelope = sample_envelope();
        envelope.sig_info.ms_height = 12;
        envelope.sign(3, &key);

        let first = envelope.to_vec();
        let decoded = Envelope::from_slice(&first).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.to_vec(), first);
    }

    #[test]
    fn signature_count_bounds() {
        let key = test_key(b"signer");

        let mut one = sample_envelope();
        one.sign(1, &key);
        assert!(Envelope::from_slice(&one.to_vec()).is_ok());

        let mut hundred = sample_envelope();
        for nonce in 1..=100 {
            hundred.sign(nonce, &key);
        }
        assert!(Envelope::from_slice(&hundred.to_vec()).is_ok());

        let mut too_many = hundred.clone();
        too_many.sign(101, &key);
        assert!(matches!(
            Envelope::from_slice(&too_many.to_vec()),
            Err(DecodeError::InvalidValue("signature count"))
        ));

        let zero = sample_envelope();
        assert!(Envelope::from_slice(&zero.to_vec()).is_err());
    }

    #[test]
    fn routing_matches_destination() {
        let dest = Url::parse("acc://alice/tokens").unwrap();
        let envelope = sample_envelope();
        assert_eq!(envelope.routing, dest.routing());
        assert_eq!(envelope.chain_id, dest.resource_chain());
        assert_eq!(envelope.tx_type(), Some(TxType::SendTokens));
    }

    #[test]
    fn body_round_trips() {
        let scc = SyntheticCreateChain {
            cause: Hash256::new(sha256(b"cause")),
            chains: vec![vec![1, 2], vec![3]],
        };
        assert_eq!(SyntheticCreateChain::from_slice(&scc.to_vec()).unwrap(), scc);

        let deposit = SyntheticDepositTokens {
            cause: Hash256::new(sha256(b"cause")),
            token_url: "acc://ACME".into(),
            amount: 1_000_000_000,
        };
        assert_eq!(
            SyntheticDepositTokens::from_slice(&deposit.to_vec()).unwrap(),
            deposit
        );

        // Wrong discriminant rejects.
        assert!(SendTokens::from_slice(&deposit.to_vec()).is_err());
    }

    #[test]
    fn synthetic_classification() {
        assert!(!TxType::CreateIdentity.is_synthetic());
        assert!(!TxType::SendTokens.is_synthetic());
        assert!(TxType::SyntheticCreateChain.is_synthetic());
        assert!(TxType::SyntheticGenesis.is_synthetic());
    }
}
