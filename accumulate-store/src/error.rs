use thiserror::Error;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is not present. Callers branch on this variant.
    #[error("store: not found")]
    NotFound,

    #[error("store: backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    #[inline]
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend(message.into())
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}
