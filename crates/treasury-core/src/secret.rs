//! Loading the signing authority from an external secret store.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use treasury_chain::Keypair;
use zeroize::Zeroizing;

use crate::config::{SecretEncoding, SecretLocation, SecretSource};
use crate::error::{Result, TreasuryError};

impl SecretLocation {
    /// Read the encoded secret. The value is held in a [`SecretString`] and is
    /// never logged.
    pub fn load(&self) -> Result<SecretString> {
        match &self.source {
            SecretSource::Env(var) => std::env::var(var)
                .map(SecretString::from)
                .map_err(|_| TreasuryError::MissingSecret(format!("environment variable {var}"))),
            SecretSource::File(path) => std::fs::read_to_string(path)
                .map(SecretString::from)
                .map_err(|e| TreasuryError::FileIo(e, path.clone())),
        }
    }
}

/// Load and decode the signing authority stored at `location`.
pub fn load_authority(location: &SecretLocation) -> Result<Keypair> {
    let secret = location.load()?;
    let keypair = match location.encoding {
        SecretEncoding::Auto => Keypair::from_encoded(secret.expose_secret())?,
        SecretEncoding::Base64 => {
            let bytes = BASE64
                .decode(secret.expose_secret().trim())
                .map(Zeroizing::new)
                .map_err(|e| TreasuryError::InvalidSecretKey(format!("invalid base64: {e}")))?;
            Keypair::from_bytes(&bytes)?
        }
    };
    debug!(address = %keypair.address(), "Loaded signing authority.");
    Ok(keypair)
}
