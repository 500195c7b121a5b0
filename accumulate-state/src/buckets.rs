//! Bucket names for the hashed key space.

/// Committed record objects, by resource chain id.
pub const STATE_ENTRY: &str = "StateEntry";
/// Producing transaction hash for a state entry, by resource chain id.
pub const STATE_TX: &str = "StateTx";
/// Accepted transaction bodies, by transaction hash.
pub const TRANSACTION: &str = "Transaction";
/// Pending envelopes plus status, by transaction hash.
pub const PENDING_TRANSACTION: &str = "PendingTransaction";
/// Unsigned synthetic envelopes, by transaction hash.
pub const SYNTHETIC_TRANSACTION: &str = "SyntheticTransaction";
/// Parent transaction to produced synthetic transaction ids.
pub const TRANSACTION_TO_SYNTHETIC: &str = "TransactionToSynthetic";
/// Per-chain transaction history: `(chain, "Count")` and `(chain, n)`.
pub const MAIN_CHAIN: &str = "MainChain";
/// Per-identity directory listing: `(chain, "Metadata")` and `(chain, n)`.
pub const DIRECTORY_INDEX: &str = "DirectoryIndex";
/// Last committed block height.
pub const BLOCK_INDEX: &str = "BlockIndex";
/// Merkle root of the committed state.
pub const ROOT_HASH: &str = "RootHash";
/// Subnet identifier recorded by init-chain.
pub const SUBNET_ID: &str = "SubnetId";
/// Monotonic counter for synthetic transaction numbering.
pub const SYNTHETIC_TX_COUNT: &str = "SyntheticTransactionCount";
