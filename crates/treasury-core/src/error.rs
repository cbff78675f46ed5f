use std::path::PathBuf;

use thiserror::Error;
use treasury_chain::{Address, ChainError};

use crate::ledger::LedgerError;

pub type Result<T> = std::result::Result<T, TreasuryError>;

/// Everything the treasury workflow can report to a caller.
///
/// Ledger-rule rejections (`InsufficientFunds`, `SimulationFailure`,
/// `TransactionFailed`) are terminal for the given inputs. `LedgerUnavailable`
/// and `StaleFreshnessToken` may be retried; `ConfirmationTimeout` must not be
/// retried until the signature's status has been re-queried.
#[derive(Debug, Error)]
pub enum TreasuryError {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("freshness token expired before the transaction landed")]
    StaleFreshnessToken,
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("transaction simulation failed: {0}")]
    SimulationFailure(String),
    #[error("transaction {signature} failed on the ledger: {reason}")]
    TransactionFailed { signature: String, reason: String },
    #[error("transaction {signature} was not confirmed in time; re-query its status before retrying")]
    ConfirmationTimeout { signature: String },
    #[error("could not fund {address}: balance {balance} is below the minimum {minimum}")]
    LiquidityBootstrapFailed {
        address: Address,
        balance: u64,
        minimum: u64,
    },
    #[error("deadline exceeded before the transaction was submitted")]
    DeadlineExceeded,
    #[error("transaction could not be built: {0}")]
    TransactionBuild(String),

    // Configuration
    #[error("secret not available: {0}")]
    MissingSecret(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("could not read {1}: {0}")]
    FileIo(std::io::Error, PathBuf),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl TreasuryError {
    /// Whether the same request may be attempted again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LedgerUnavailable(_) | Self::StaleFreshnessToken | Self::DeadlineExceeded
        )
    }
}

impl From<ChainError> for TreasuryError {
    fn from(error: ChainError) -> Self {
        match error {
            ChainError::InvalidSecretKey(msg) => Self::InvalidSecretKey(msg),
            ChainError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            ChainError::InvalidAddress(msg) => Self::InvalidAddress(msg),
            other => Self::TransactionBuild(other.to_string()),
        }
    }
}

impl From<LedgerError> for TreasuryError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Transport(msg) => Self::LedgerUnavailable(msg),
            LedgerError::BlockhashNotFound => Self::StaleFreshnessToken,
            LedgerError::InsufficientFunds(msg) => Self::InsufficientFunds(msg),
            LedgerError::Simulation(msg) => Self::SimulationFailure(msg),
            LedgerError::Rpc { code, message } => {
                Self::LedgerUnavailable(format!("rpc error {code}: {message}"))
            }
        }
    }
}
