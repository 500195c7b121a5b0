// Copyright @ 2025 - present, Accumulate Network
// All Rights Reserved

pub mod query;
pub mod records;
pub mod transactions;

pub use records::{
    ChainHeader, ChainType, DirectoryIndexMetadata, IdentityState, KeyBook, KeyPage, KeySpec,
    LiteTokenAccount, PendingTxState, Record, StateObject, TokenAccount, TxReference, TxState,
};
pub use transactions::{
    body_type, CreateIdentity, CreateTokenAccount, Ed25519Sig, Envelope, SendTokens,
    SignatureInfo, SyntheticCreateChain, SyntheticDepositTokens, SyntheticGenesis, TokenOutput,
    TxResult, TxSynthRef, TxType, MAX_SIGNATURES,
};
