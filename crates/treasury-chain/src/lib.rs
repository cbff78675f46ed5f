//! Ledger primitives for the token treasury.
//!
//! Everything in this crate is pure: address handling, keypair loading,
//! associated token account derivation, SPL Token / Associated Token Account /
//! System program instruction builders, and the legacy transaction wire format
//! with multi-signer signing. Network I/O lives in `treasury-core`.
//!
//! The wire format is implemented by hand on top of `ed25519-dalek` and `bs58`
//! rather than through `solana-sdk`.

pub mod address;
pub mod error;
pub mod keypair;
pub mod spl_token;
pub mod transaction;

pub use address::Address;
pub use error::ChainError;
pub use keypair::Keypair;
pub use spl_token::{
    build_create_associated_account, build_initialize_mint, build_spl_transfer,
    derive_associated_token_address, ASSOCIATED_TOKEN_PROGRAM_ID, MINT_SIZE, TOKEN_PROGRAM_ID,
};
pub use transaction::{
    build_create_account, compile_transaction, encode_compact_u16, serialize_message,
    sign_transaction, CompiledInstruction, SignedTransaction, SolAccountMeta, SolInstruction,
    SolTransaction, SYSTEM_PROGRAM_ID,
};
