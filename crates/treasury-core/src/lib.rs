//! Treasury-funded token transfers on a Solana ledger.
//!
//! The workflow loads a signing authority from an external secret store,
//! provisions associated token accounts on demand, submits transfers with
//! bounded retries and confirmation, and (on test networks) bootstraps native
//! balance from faucets. All ledger access goes through [`LedgerClient`].

pub mod balance;
pub mod config;
pub mod error;
pub mod funding;
pub mod ledger;
pub mod lock;
pub mod provisioning;
pub mod rpc;
pub mod secret;
pub mod submit;
pub mod treasury;

pub use balance::{BalanceReading, BalanceWatcher};
pub use config::{
    Cluster, Config, ConfigFile, RetryPolicy, SecretEncoding, SecretLocation, SecretSource,
};
pub use error::{Result, TreasuryError};
pub use funding::{ensure_funded, FundingOutcome};
pub use ledger::{
    AccountRecord, Commitment, ConfirmationStatus, Faucet, FreshnessToken, LedgerClient,
    LedgerError, SendOptions, TokenAmount,
};
pub use lock::{AuthorityClaim, AuthorityLocks};
pub use provisioning::ensure_account;
pub use rpc::RpcLedgerClient;
pub use secret::load_authority;
pub use submit::submit;
pub use treasury::{deadline_in, TransferPlan, Treasury};
