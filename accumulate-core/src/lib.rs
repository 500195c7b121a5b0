// Copyright @ 2025 - present, Accumulate Network
// All Rights Reserved

pub mod app;
pub mod error;
pub mod executor;
pub mod executors;
pub mod genesis;
pub mod query;
pub mod relay;
pub mod state_manager;
pub mod sync;

pub use app::{Application, BeginBlockRequest, EndBlockRequest};
pub use error::ChainError;
pub use executor::{Executor, TxExecutor};
pub use relay::{BatchRelay, NullRelay, Relay, RelayError, Transport};
pub use state_manager::{StateManager, Submission};
