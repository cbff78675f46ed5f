use thiserror::Error;

/// Errors raised while building or signing ledger data structures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("missing signer for required account {0}")]
    MissingSigner(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_secret_key() {
        let err = ChainError::InvalidSecretKey("expected 64 bytes, got 12".into());
        assert_eq!(
            err.to_string(),
            "invalid secret key: expected 64 bytes, got 12"
        );
    }

    #[test]
    fn display_invalid_amount() {
        let err = ChainError::InvalidAmount("transfer amount must be > 0".into());
        assert_eq!(err.to_string(), "invalid amount: transfer amount must be > 0");
    }

    #[test]
    fn display_missing_signer() {
        let err = ChainError::MissingSigner("11111111111111111111111111111111".into());
        assert!(err.to_string().starts_with("missing signer"));
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn std::error::Error> =
            Box::new(ChainError::InvalidAddress("bad decode".into()));
        assert!(err.to_string().contains("bad decode"));
    }
}
