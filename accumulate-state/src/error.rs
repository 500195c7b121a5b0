use accumulate_base::encoding::DecodeError;
use accumulate_base::UrlError;
use accumulate_store::StoreError;
use thiserror::Error;

/// Errors raised by the state database.
#[derive(Debug, Error)]
pub enum StateError {
    /// The entry is not present. Callers branch on this variant.
    #[error("state: not found")]
    NotFound,

    #[error("state: store failure: {0}")]
    Store(String),

    #[error("state: decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("state: invalid url: {0}")]
    Url(#[from] UrlError),

    #[error("state: transaction already committed")]
    Committed,
}

impl StateError {
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound)
    }
}

impl From<StoreError> for StateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => StateError::NotFound,
            StoreError::Backend(message) => StateError::Store(message),
        }
    }
}
