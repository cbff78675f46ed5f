//! Signing authorities.
//!
//! A [`Keypair`] is loaded once from an external secret store and held in
//! memory only. Two encodings are accepted:
//!
//! - Base58 text of the 64-byte `secret || public` keypair (what wallets
//!   export), or of a bare 32-byte Ed25519 seed.
//! - A JSON array of 64 byte values, the `solana-keygen` file format.
//!
//! The secret half is wiped on drop (`ed25519-dalek` zeroizes `SigningKey`),
//! and intermediate buffers are zeroized explicitly.

use std::fmt;

use ed25519_dalek::{Signer, SigningKey};
use zeroize::{Zeroize, Zeroizing};

use crate::address::Address;
use crate::error::ChainError;

const SEED_LEN: usize = 32;
const KEYPAIR_LEN: usize = 64;

/// An Ed25519 keypair that owns exactly one address.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Decode an encoded secret into a keypair.
    ///
    /// Fails with [`ChainError::InvalidSecretKey`] if the text is neither
    /// Base58 nor a JSON byte array, if the decoded length is not 32 or 64,
    /// or if the public half of a 64-byte keypair does not belong to its
    /// secret half.
    pub fn from_encoded(encoded: &str) -> Result<Self, ChainError> {
        let trimmed = encoded.trim();
        let bytes = if trimmed.starts_with('[') {
            decode_json_bytes(trimmed)?
        } else {
            Zeroizing::new(bs58::decode(trimmed).into_vec().map_err(|e| {
                ChainError::InvalidSecretKey(format!("base58 decode failed: {e}"))
            })?)
        };

        Self::from_bytes(&bytes)
    }

    /// Build a keypair from a 32-byte seed or a 64-byte `secret || public`
    /// keypair.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        match bytes.len() {
            SEED_LEN => {
                let mut seed = [0u8; SEED_LEN];
                seed.copy_from_slice(bytes);
                let signing_key = SigningKey::from_bytes(&seed);
                seed.zeroize();
                Ok(Self { signing_key })
            }
            KEYPAIR_LEN => {
                let mut pair = [0u8; KEYPAIR_LEN];
                pair.copy_from_slice(bytes);
                let result = SigningKey::from_keypair_bytes(&pair);
                pair.zeroize();
                let signing_key = result.map_err(|_| {
                    ChainError::InvalidSecretKey(
                        "public key does not match secret key".into(),
                    )
                })?;
                Ok(Self { signing_key })
            }
            n => Err(ChainError::InvalidSecretKey(format!(
                "expected {SEED_LEN} or {KEYPAIR_LEN} bytes, got {n}"
            ))),
        }
    }

    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// The address owned by this keypair.
    pub fn address(&self) -> Address {
        Address::new(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign an arbitrary message (a serialized transaction message).
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Serialize as the JSON byte array format used by keypair files.
    ///
    /// The returned string contains secret material; it is wrapped so it is
    /// wiped once the caller has written it out.
    pub fn to_json_bytes(&self) -> Zeroizing<String> {
        let pair = Zeroizing::new(self.signing_key.to_keypair_bytes());
        let parts: Vec<String> = pair.iter().map(|b| b.to_string()).collect();
        let joined = Zeroizing::new(parts.join(","));
        Zeroizing::new(format!("[{}]", joined.as_str()))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

fn decode_json_bytes(text: &str) -> Result<Zeroizing<Vec<u8>>, ChainError> {
    let values: Vec<u8> = serde_json::from_str(text)
        .map_err(|e| ChainError::InvalidSecretKey(format!("json decode failed: {e}")))?;
    Ok(Zeroizing::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keypair_bytes() -> [u8; 64] {
        SigningKey::from_bytes(&[0x42u8; 32]).to_keypair_bytes()
    }

    #[test]
    fn base58_keypair_roundtrip() {
        let encoded = bs58::encode(test_keypair_bytes()).into_string();
        let keypair = Keypair::from_encoded(&encoded).unwrap();

        let expected = SigningKey::from_bytes(&[0x42u8; 32])
            .verifying_key()
            .to_bytes();
        assert_eq!(keypair.address().to_bytes(), expected);
    }

    #[test]
    fn address_is_stable_across_loads() {
        let encoded = bs58::encode(test_keypair_bytes()).into_string();
        let a = Keypair::from_encoded(&encoded).unwrap().address();
        let b = Keypair::from_encoded(&encoded).unwrap().address();
        assert_eq!(a, b);
    }

    #[test]
    fn seed_and_full_keypair_agree() {
        let from_seed = Keypair::from_bytes(&[0x42u8; 32]).unwrap();
        let from_pair = Keypair::from_bytes(&test_keypair_bytes()).unwrap();
        assert_eq!(from_seed.address(), from_pair.address());
    }

    #[test]
    fn json_array_roundtrip() {
        let original = Keypair::from_bytes(&[0x07u8; 32]).unwrap();
        let json = original.to_json_bytes();
        let restored = Keypair::from_encoded(&json).unwrap();
        assert_eq!(original.address(), restored.address());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let encoded = bs58::encode([1u8; 12]).into_string();
        let err = Keypair::from_encoded(&encoded).unwrap_err();
        assert!(matches!(err, ChainError::InvalidSecretKey(_)));
        assert!(err.to_string().contains("got 12"));
    }

    #[test]
    fn invalid_base58_is_rejected() {
        let err = Keypair::from_encoded("0OIl-not-base58").unwrap_err();
        assert!(matches!(err, ChainError::InvalidSecretKey(_)));
    }

    #[test]
    fn mismatched_public_half_is_rejected() {
        let mut bytes = test_keypair_bytes();
        bytes[63] ^= 0xff;
        let err = Keypair::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = Keypair::from_encoded("[1, 2, 999]").unwrap_err();
        assert!(matches!(err, ChainError::InvalidSecretKey(_)));
    }

    #[test]
    fn debug_redacts_secret() {
        let keypair = Keypair::from_bytes(&[0x42u8; 32]).unwrap();
        let debug = format!("{keypair:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("66, 66"));
    }

    #[test]
    fn signatures_verify() {
        use ed25519_dalek::{Signature, VerifyingKey};

        let keypair = Keypair::from_bytes(&[0x55u8; 32]).unwrap();
        let sig = keypair.sign(b"message");
        let vk = VerifyingKey::from_bytes(keypair.address().as_bytes()).unwrap();
        assert!(vk
            .verify_strict(b"message", &Signature::from_bytes(&sig))
            .is_ok());
    }

    #[test]
    fn generated_keypairs_differ() {
        assert_ne!(Keypair::generate().address(), Keypair::generate().address());
    }
}
