use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use treasury_chain::Address;

use crate::error::{Result, TreasuryError};
use crate::ledger::Commitment;

/// Treasury configuration with all fields parsed and validated.
#[derive(Clone, Debug)]
pub struct Config {
    pub network: NetworkConfig,
    pub retry: RetryPolicy,
    pub treasury: TreasuryConfig,
    pub funding: FundingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_string = std::fs::read_to_string(&config_path)
            .map_err(|e| TreasuryError::FileIo(e, config_path.as_ref().to_path_buf()))?;
        let config_file = ConfigFile::from_str(&config_string)?;
        Self::from_config_file(config_file)
    }

    pub fn from_config_file(config_file: ConfigFile) -> Result<Self> {
        let ConfigFile {
            network,
            retry,
            treasury,
            funding,
            logging,
        } = config_file;

        if retry.max_send_attempts == 0 {
            return Err(TreasuryError::InvalidConfig(
                "retry.max_send_attempts must be at least 1".into(),
            ));
        }
        if network.cluster == Cluster::Mainnet && !funding.faucets.is_empty() {
            return Err(TreasuryError::InvalidConfig(
                "faucets cannot be configured for a mainnet profile".into(),
            ));
        }

        let mint = treasury
            .mint
            .as_deref()
            .map(Address::from_str)
            .transpose()?;

        Ok(Self {
            network,
            retry,
            treasury: TreasuryConfig {
                mint,
                authority: treasury.authority,
                min_fee_balance: treasury.min_fee_balance,
            },
            funding,
            logging,
        })
    }
}

/// Configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
#[non_exhaustive]
pub struct ConfigFile {
    pub network: NetworkConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub treasury: TreasuryConfigFile,
    #[serde(default)]
    pub funding: FundingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FromStr for ConfigFile {
    type Err = TreasuryError;

    fn from_str(config_string: &str) -> std::result::Result<Self, Self::Err> {
        Ok(toml::from_str(config_string)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cluster {
    Mainnet,
    Devnet,
    Testnet,
    Localnet,
}

impl Cluster {
    /// Whether supplemental funds can be requested at all.
    pub fn allows_faucets(&self) -> bool {
        !matches!(self, Self::Mainnet)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct NetworkConfig {
    pub cluster: Cluster,
    pub rpc_url: String,
    #[serde(default)]
    pub commitment: Commitment,
}

/// The single retry policy applied to every submission.
///
/// Transport failures during submission are retried with a fixed delay.
/// Confirmation is polled at a fixed interval until the timeout. A stale
/// freshness token causes the whole transaction to be rebuilt at most
/// `stale_token_refreshes` times.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "snake_case", default)]
pub struct RetryPolicy {
    pub max_send_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub send_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub confirm_poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub confirm_timeout: Duration,
    pub stale_token_refreshes: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_send_attempts: 4,
            send_backoff: Duration::from_secs(1),
            confirm_poll_interval: Duration::from_millis(500),
            confirm_timeout: Duration::from_secs(60),
            stale_token_refreshes: 1,
        }
    }
}

/// Where the encoded signing key is read from. Secrets never live in the
/// configuration file itself.
///
/// In TOML: `authority = { env = "TREASURY_PRIVATE_KEY" }`, optionally with
/// `encoding = "base64"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretLocation {
    #[serde(flatten)]
    pub source: SecretSource,
    #[serde(default)]
    pub encoding: SecretEncoding,
}

impl SecretLocation {
    pub fn env(var: impl Into<String>) -> Self {
        Self {
            source: SecretSource::Env(var.into()),
            encoding: SecretEncoding::default(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: SecretSource::File(path.into()),
            encoding: SecretEncoding::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: SecretEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    /// Name of an environment variable holding the encoded key.
    Env(String),
    /// Path to a file holding the encoded key.
    File(PathBuf),
}

/// How the stored key text is decoded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecretEncoding {
    /// Base58 text or a JSON byte array.
    #[default]
    Auto,
    /// Standard base64 of the 32-byte seed or 64-byte keypair.
    Base64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct TreasuryConfigFile {
    pub mint: Option<String>,
    pub authority: SecretLocation,
    pub min_fee_balance: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreasuryConfig {
    /// The asset identifier. Absent until the mint has been created.
    pub mint: Option<Address>,
    pub authority: SecretLocation,
    /// Lamports the fee payer must hold before a transfer is attempted.
    pub min_fee_balance: Option<u64>,
}

impl TreasuryConfig {
    pub fn require_mint(&self) -> Result<Address> {
        self.mint
            .ok_or_else(|| TreasuryError::InvalidConfig("treasury.mint is not set".into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "snake_case", default)]
pub struct FundingConfig {
    pub minimum_native_balance: u64,
    pub airdrop_lamports: u64,
    /// RPC endpoints that serve `requestAirdrop`, tried in order.
    pub faucets: Vec<String>,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            minimum_native_balance: 10_000_000,
            airdrop_lamports: 2_000_000_000,
            faucets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "snake_case", default)]
pub struct LoggingConfig {
    pub stdout_log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout_log_level: "info".into(),
        }
    }
}
