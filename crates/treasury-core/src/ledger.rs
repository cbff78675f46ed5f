//! The ledger as seen by the treasury workflow.
//!
//! [`LedgerClient`] is the consumed interface: every call is a suspending I/O
//! operation with no local side effects. [`Faucet`] is the separate,
//! network-gated supplemental-funds role.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use treasury_chain::Address;

/// Failures reported by a ledger client, already classified.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Network or HTTP-level failure; the request may not have arrived.
    #[error("transport error: {0}")]
    Transport(String),
    /// The transaction references a blockhash the ledger no longer accepts.
    #[error("blockhash not found")]
    BlockhashNotFound,
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("simulation failed: {0}")]
    Simulation(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl LedgerError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Durability requested when reading state or confirming a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recent blockhash and the last block height at which it is still valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessToken {
    pub blockhash: [u8; 32],
    pub last_valid_block_height: u64,
}

impl FreshnessToken {
    /// Whether a ledger at `block_height` would still accept this token.
    pub fn is_valid_at(&self, block_height: u64) -> bool {
        block_height <= self.last_valid_block_height
    }
}

/// The parts of an on-ledger account record the workflow cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub lamports: u64,
    pub owner: Address,
    pub data_len: usize,
}

/// An SPL token balance in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub amount: u64,
    pub decimals: u8,
}

impl TokenAmount {
    /// Amount in whole tokens, for display.
    pub fn ui_amount(&self) -> f64 {
        self.amount as f64 / 10f64.powi(self.decimals as i32)
    }
}

/// Status of a submitted transaction at the requested commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// The ledger has no record of the signature.
    NotFound,
    /// Landed, but not yet at the requested commitment.
    Pending,
    Confirmed,
    Failed(String),
}

/// Options passed along with a transaction submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub skip_preflight: bool,
    pub preflight_commitment: Commitment,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            preflight_commitment: Commitment::Confirmed,
        }
    }
}

/// Read and write access to the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Native-currency balance in lamports.
    async fn get_balance(&self, address: &Address) -> Result<u64, LedgerError>;

    /// The account record, or `None` if no account exists at `address`.
    async fn get_account_info(&self, address: &Address)
        -> Result<Option<AccountRecord>, LedgerError>;

    /// Balance of an SPL token account, or `None` if it does not exist.
    async fn get_token_account_balance(
        &self,
        address: &Address,
    ) -> Result<Option<TokenAmount>, LedgerError>;

    async fn get_latest_freshness_token(&self) -> Result<FreshnessToken, LedgerError>;

    async fn get_block_height(&self) -> Result<u64, LedgerError>;

    /// Submit signed wire bytes, returning the transaction signature.
    async fn send_transaction(
        &self,
        wire: &[u8],
        options: &SendOptions,
    ) -> Result<String, LedgerError>;

    /// Single status probe; callers poll.
    async fn confirm_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> Result<ConfirmationStatus, LedgerError>;

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        data_len: u64,
    ) -> Result<u64, LedgerError>;
}

/// A source of supplemental native funds (test networks only).
#[async_trait]
pub trait Faucet: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Request `lamports` for `address`, returning the funding signature.
    async fn request_funds(&self, address: &Address, lamports: u64)
        -> Result<String, LedgerError>;

    /// Status of a funding signature, asked of the endpoint that issued it.
    async fn confirm_funds(&self, signature: &str) -> Result<ConfirmationStatus, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_token_validity_window() {
        let token = FreshnessToken {
            blockhash: [0u8; 32],
            last_valid_block_height: 150,
        };
        assert!(token.is_valid_at(100));
        assert!(token.is_valid_at(150));
        assert!(!token.is_valid_at(151));
    }

    #[test]
    fn commitment_ordering_matches_durability() {
        assert!(Commitment::Processed < Commitment::Confirmed);
        assert!(Commitment::Confirmed < Commitment::Finalized);
        assert_eq!(Commitment::default(), Commitment::Confirmed);
    }

    #[test]
    fn token_amount_ui_value() {
        let amount = TokenAmount {
            amount: 50_000_000_000,
            decimals: 9,
        };
        assert!((amount.ui_amount() - 50.0).abs() < f64::EPSILON);
    }
}
