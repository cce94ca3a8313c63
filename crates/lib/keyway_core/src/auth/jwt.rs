//! JWT minting and verification for broker-issued tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use uuid::Uuid;

use super::{MintError, TokenError};
use crate::models::{IdentityClaims, InternalClaims};

/// Minimum accepted signing secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Default token lifetime: 24 hours.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Generate a random alphanumeric signing secret (64 chars).
pub fn generate_secret() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Issues HS256 tokens on behalf of the broker.
#[derive(Clone)]
pub struct TokenMinter {
    key: EncodingKey,
    issuer: String,
    ttl: Duration,
}

impl TokenMinter {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `identity` at the current time.
    ///
    /// `audience` is only set for product-scoped handoff tokens.
    pub fn mint(
        &self,
        identity: &IdentityClaims,
        product_id: Option<&str>,
        audience: Option<&str>,
    ) -> Result<(String, InternalClaims), MintError> {
        self.mint_at(identity, product_id, audience, Utc::now())
    }

    /// Mint a token as if the clock read `now`.
    pub fn mint_at(
        &self,
        identity: &IdentityClaims,
        product_id: Option<&str>,
        audience: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(String, InternalClaims), MintError> {
        let claims = InternalClaims {
            sub: identity.sub.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            picture: identity.picture.clone(),
            roles: identity.roles.clone(),
            permissions: identity.permissions.clone(),
            product_id: product_id.map(str::to_string),
            iss: self.issuer.clone(),
            aud: audience.map(str::to_string),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| MintError::Signing(e.to_string()))?;
        Ok((token, claims))
    }
}

/// Verifies broker-issued tokens and recovers their claims.
///
/// This is the single source of truth for "is this caller authenticated".
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    issuer: String,
    audiences: Vec<String>,
}

impl TokenValidator {
    /// Validator for broker-wide tokens: signature, expiry and issuer.
    ///
    /// Tokens carrying an `aud` are refused until
    /// [`with_audiences`](Self::with_audiences) lists that audience.
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            audiences: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_audiences(mut self, audiences: Vec<String>) -> Self {
        self.audiences = audiences;
        self
    }

    /// Copy of this validator that accepts tokens scoped to `audience`.
    pub fn for_audience(&self, audience: &str) -> Self {
        self.clone().with_audiences(vec![audience.to_string()])
    }

    /// Verify `token` against the current time.
    pub fn validate(&self, token: &str) -> Result<InternalClaims, TokenError> {
        self.validate_at(token, Utc::now())
    }

    /// Verify `token` as if the clock read `now`.
    ///
    /// A token is accepted up to and including its `exp` second.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<InternalClaims, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        // Time and audience are checked below against the injected clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<InternalClaims>(token, &self.key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::SignatureInvalid
                }
                _ => TokenError::Malformed,
            })?;

        if now.timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }
        if claims.iss != self.issuer {
            return Err(TokenError::InvalidIssuer);
        }
        // Product-scoped tokens are never broker credentials.
        if let Some(aud) = &claims.aud
            && !self.audiences.iter().any(|a| a == aud)
        {
            return Err(TokenError::InvalidAudience);
        }
        Ok(claims)
    }
}
