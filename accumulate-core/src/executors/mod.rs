//! Per-type transaction executors.

mod create_identity;
mod create_token_account;
mod send_tokens;
mod synthetic_create_chain;
mod synthetic_deposit_tokens;
mod synthetic_genesis;

pub use create_identity::CreateIdentityExecutor;
pub use create_token_account::CreateTokenAccountExecutor;
pub use send_tokens::SendTokensExecutor;
pub use synthetic_create_chain::SyntheticCreateChainExecutor;
pub use synthetic_deposit_tokens::SyntheticDepositTokensExecutor;
pub use synthetic_genesis::SyntheticGenesisExecutor;
