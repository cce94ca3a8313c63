//! Credential minting and validation.
//!
//! Provides the broker's JWT minter and the consumer-facing validator shared
//! by the API layer and products.

pub mod jwt;

use thiserror::Error;

/// Token validation failures. Each variant maps to a machine-readable kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("No token supplied")]
    Missing,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token issuer is not trusted")]
    InvalidIssuer,

    #[error("Token audience is not accepted")]
    InvalidAudience,
}

impl TokenError {
    /// Stable identifier reported to callers in 401 bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Missing => "token_missing",
            TokenError::Malformed => "token_malformed",
            TokenError::Expired => "token_expired",
            TokenError::SignatureInvalid => "token_signature_invalid",
            TokenError::InvalidIssuer => "token_invalid_issuer",
            TokenError::InvalidAudience => "token_invalid_audience",
        }
    }
}

/// Minting errors. Only reachable if the signing key itself is unusable.
#[derive(Debug, Error)]
pub enum MintError {
    #[error("Token signing failed: {0}")]
    Signing(String),
}
