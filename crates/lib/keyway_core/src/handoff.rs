//! Back-channel handoff to products that must not receive a bearer token
//! through the browser.
//!
//! The broker mints a product-scoped token, wraps it in a short-lived
//! assertion signed with the product's pre-shared secret, and posts it to
//! the product's session endpoint together with a one-time code. The browser
//! only ever sees the code.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::TokenError;
use crate::config::ProductConfig;
use crate::models::{IdentityClaims, InternalClaims};

/// Lifetime of a handoff ticket and its assertion: 5 minutes.
pub const HANDOFF_TTL_SECS: i64 = 5 * 60;

/// Handoff failures.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Unknown or already redeemed code")]
    UnknownCode,

    #[error("Handoff code has expired")]
    Expired,

    #[error("Code was issued for a different product")]
    WrongProduct,

    #[error("Product {0} is not configured for back-channel delivery")]
    NotConfigured(String),

    #[error("Assertion signing failed: {0}")]
    Signing(String),

    #[error("Product {product} session endpoint failed: {reason}")]
    Upstream { product: String, reason: String },
}

/// Generate a one-time handoff code: 32 random bytes, hex encoded.
pub fn generate_handoff_code() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Single-use ticket tracked by the broker until redeemed or expired.
#[derive(Debug, Clone)]
pub struct HandoffTicket {
    pub code: String,
    pub product_id: String,
    pub product_token: String,
    pub claims: InternalClaims,
    pub expires_at: DateTime<Utc>,
}

/// Outstanding handoff tickets keyed by code.
#[derive(Default)]
pub struct HandoffLedger {
    tickets: DashMap<String, HandoffTicket>,
}

impl HandoffLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, ticket: HandoffTicket) {
        self.tickets.insert(ticket.code.clone(), ticket);
    }

    /// Drop a ticket whose session establishment failed.
    pub fn discard(&self, code: &str) {
        self.tickets.remove(code);
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Redeem `code` for `product_id` at the current time.
    pub fn redeem(&self, product_id: &str, code: &str) -> Result<HandoffTicket, HandoffError> {
        self.redeem_at(product_id, code, Utc::now())
    }

    /// Redeem `code` as if the clock read `now`.
    ///
    /// A successful or expired redemption removes the ticket, so no code is
    /// ever honoured twice. A code presented by the wrong product is left
    /// in place for its rightful owner.
    pub fn redeem_at(
        &self,
        product_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<HandoffTicket, HandoffError> {
        let Some((_, ticket)) = self.tickets.remove_if(code, |_, t| t.product_id == product_id)
        else {
            return Err(if self.tickets.contains_key(code) {
                warn!(product_id, "handoff code presented by the wrong product");
                HandoffError::WrongProduct
            } else {
                HandoffError::UnknownCode
            });
        };
        if now > ticket.expires_at {
            return Err(HandoffError::Expired);
        }
        Ok(ticket)
    }

    /// Evict expired tickets.
    pub fn cleanup(&self) {
        let now = Utc::now();
        self.tickets.retain(|_, t| t.expires_at >= now);
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>, every: StdDuration) -> tokio::task::JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                ledger.cleanup();
                debug!(tickets = ledger.len(), "handoff ledger cleanup tick");
            }
        })
    }
}

/// Server-to-server credential posted to the product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffAssertion {
    pub iss: String,
    /// Product id.
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub code: String,
    pub product_token: String,
    pub claims: IdentityClaims,
}

/// Body of the session-establishment call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRequest {
    pub assertion: String,
    pub claims: IdentityClaims,
    pub code: String,
}

/// Sign a handoff assertion with the product's shared secret.
pub fn sign_assertion(
    identity: &IdentityClaims,
    product_token: &str,
    code: &str,
    issuer: &str,
    product_id: &str,
    shared_secret: &[u8],
    now: DateTime<Utc>,
) -> Result<String, HandoffError> {
    let assertion = HandoffAssertion {
        iss: issuer.to_string(),
        aud: product_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(HANDOFF_TTL_SECS)).timestamp(),
        code: code.to_string(),
        product_token: product_token.to_string(),
        claims: identity.clone(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &assertion,
        &EncodingKey::from_secret(shared_secret),
    )
    .map_err(|e| HandoffError::Signing(e.to_string()))
}

/// Verify a handoff assertion on the product side.
pub fn verify_assertion(
    assertion: &str,
    shared_secret: &[u8],
    issuer: &str,
    product_id: &str,
    now: DateTime<Utc>,
) -> Result<HandoffAssertion, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<HandoffAssertion>(
        assertion,
        &DecodingKey::from_secret(shared_secret),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::SignatureInvalid,
        _ => TokenError::Malformed,
    })?;
    let claims = data.claims;
    if now.timestamp() > claims.exp {
        return Err(TokenError::Expired);
    }
    if claims.iss != issuer {
        return Err(TokenError::InvalidIssuer);
    }
    if claims.aud != product_id {
        return Err(TokenError::InvalidAudience);
    }
    Ok(claims)
}

/// Call the product's session endpoint with the shared secret as bearer.
///
/// Any non-2xx status, timeout or transport error is an upstream failure.
/// There is no retry.
pub async fn establish_session(
    client: &reqwest::Client,
    product: &ProductConfig,
    request: &HandoffRequest,
    timeout: StdDuration,
) -> Result<(), HandoffError> {
    let (Some(endpoint), Some(secret)) = (&product.session_endpoint, &product.shared_secret) else {
        return Err(HandoffError::NotConfigured(product.id.clone()));
    };
    let upstream = |reason: String| HandoffError::Upstream {
        product: product.id.clone(),
        reason,
    };

    let resp = client
        .post(endpoint.clone())
        .bearer_auth(secret)
        .json(request)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                upstream(format!("timed out after {}ms", timeout.as_millis()))
            } else {
                upstream(e.to_string())
            }
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(upstream(format!("HTTP {status}")));
    }
    Ok(())
}
