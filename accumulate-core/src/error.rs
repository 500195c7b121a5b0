use accumulate_base::encoding::DecodeError;
use accumulate_base::UrlError;
use accumulate_state::StateError;
use thiserror::Error;

/// Errors raised by the block execution pipeline.
///
/// Check-phase errors flow back to the RPC layer unchanged. Deliver-phase
/// validation errors are additionally recorded as a pending transaction with
/// a non-zero status code on the sponsor's chain. Commit-phase database
/// errors are fatal.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A record or key is not present. Callers branch on this variant.
    #[error("not found")]
    NotFound,

    #[error("malformed transaction: {0}")]
    MalformedEnvelope(String),

    #[error("invalid signature")]
    BadSignature,

    #[error("bad sponsor: {0}")]
    BadSponsor(String),

    #[error("bad authority: {0}")]
    BadAuthority(String),

    #[error("{0}")]
    Rejected(String),

    #[error("unsupported TX type: {0}")]
    UnsupportedTxType(u64),

    #[error("marshal: {0}")]
    Marshal(#[from] DecodeError),

    #[error("invalid url: {0}")]
    Url(#[from] UrlError),

    #[error("database: {0}")]
    Db(String),
}

impl ChainError {
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainError::NotFound)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        ChainError::Rejected(message.into())
    }
}

impl From<StateError> for ChainError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound => ChainError::NotFound,
            StateError::Decode(e) => ChainError::Marshal(e),
            StateError::Url(e) => ChainError::Url(e),
            other => ChainError::Db(other.to_string()),
        }
    }
}
