// Copyright @ 2025 - present, Accumulate Network
// All Rights Reserved

pub mod encoding;
pub mod hash;
pub mod merkle;
pub mod url;

pub use hash::{sha256, ChainId, Hash256};
pub use url::{Url, UrlError};
