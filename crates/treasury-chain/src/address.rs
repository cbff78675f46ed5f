//! Ledger addresses.
//!
//! An address is a Base58-encoded 32-byte value: either an Ed25519 public key
//! (wallets, mints created from a keypair) or a program derived address that
//! is deliberately off the curve (associated token accounts). No hashing is
//! applied; the bytes ARE the address.

use std::fmt;
use std::str::FromStr;

use crate::error::ChainError;

/// A 32-byte ledger address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Base58 representation, as used in RPC requests and explorers.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Whether the bytes decompress to a point on the Ed25519 curve.
    ///
    /// Wallet addresses are on the curve; program derived addresses never are.
    pub fn is_on_curve(&self) -> bool {
        curve25519_dalek::edwards::CompressedEdwardsY(self.0)
            .decompress()
            .is_some()
    }
}

impl FromStr for Address {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| ChainError::InvalidAddress(format!("base58 decode failed: {e}")))?;

        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            ChainError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
        })?;

        Ok(Self(arr))
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The System Program address is 32 zero bytes.
    #[test]
    fn system_program_address() {
        let addr = Address::new([0u8; 32]);
        assert_eq!(addr.to_string(), "11111111111111111111111111111111");
    }

    #[test]
    fn parse_and_display_token_program() {
        let address = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
        let parsed: Address = address.parse().unwrap();
        assert_eq!(parsed.to_string(), address);
    }

    #[test]
    fn parse_tolerates_surrounding_whitespace() {
        let parsed: Address = "  MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr\n".parse().unwrap();
        assert_eq!(parsed.to_string(), "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");
    }

    #[test]
    fn parse_garbage_returns_error() {
        let result = "not-a-valid-address!!!".parse::<Address>();
        assert!(matches!(result, Err(ChainError::InvalidAddress(_))));
    }

    #[test]
    fn parse_too_short_returns_error() {
        // "1" decodes to a single zero byte.
        let err = "1".parse::<Address>().unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes, got 1"));
    }

    #[test]
    fn debug_uses_base58() {
        let addr = Address::new([0u8; 32]);
        assert_eq!(
            format!("{addr:?}"),
            "Address(11111111111111111111111111111111)"
        );
    }

    #[test]
    fn basepoint_is_on_curve() {
        let mut basepoint = [0x66u8; 32];
        basepoint[0] = 0x58;
        assert!(Address::new(basepoint).is_on_curve());
    }

    #[test]
    fn off_curve_bytes_detected() {
        assert!(!Address::new([0x02; 32]).is_on_curve());
    }
}
