//! Back-channel delivery and ticket redemption.

use chrono::{Duration, Utc};
use keyway_core::config::ProductConfig;
use keyway_core::handoff::{
    HANDOFF_TTL_SECS, HandoffError, HandoffRequest, HandoffTicket, establish_session,
    generate_handoff_code, sign_assertion,
};
use keyway_core::models::IdentityClaims;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{RedeemRequest, RedeemResponse};

/// Establish a session at `product` for `identity` and return the one-time
/// code the browser carries to the product's callback.
///
/// The ticket is recorded before the product is called so that a product
/// redeeming the code from inside its session endpoint finds it. On failure
/// the ticket is discarded.
pub async fn deliver(
    state: &AppState,
    product: &ProductConfig,
    identity: &IdentityClaims,
) -> Result<String, HandoffError> {
    let secret = product
        .shared_secret
        .as_deref()
        .ok_or_else(|| HandoffError::NotConfigured(product.id.clone()))?;

    let (product_token, claims) = state
        .minter
        .mint(identity, Some(&product.id), Some(&product.id))
        .map_err(|e| HandoffError::Signing(e.to_string()))?;

    let code = generate_handoff_code();
    let now = Utc::now();
    let assertion = sign_assertion(
        identity,
        &product_token,
        &code,
        state.minter.issuer(),
        &product.id,
        secret.as_bytes(),
        now,
    )?;

    state.handoff.issue(HandoffTicket {
        code: code.clone(),
        product_id: product.id.clone(),
        product_token,
        claims,
        expires_at: now + Duration::seconds(HANDOFF_TTL_SECS),
    });

    let request = HandoffRequest {
        assertion,
        claims: identity.clone(),
        code: code.clone(),
    };
    if let Err(e) = establish_session(&state.http, product, &request, state.config.handoff_timeout).await
    {
        state.handoff.discard(&code);
        return Err(e);
    }

    info!(product_id = %product.id, "back-channel session established");
    Ok(code)
}

/// Exchange a one-time code for the product token it stands for.
///
/// The caller authenticates with its pre-shared secret as bearer token.
pub fn redeem(state: &AppState, bearer: Option<&str>, request: RedeemRequest) -> AppResult<RedeemResponse> {
    let product = state
        .config
        .product(&request.product_id)
        .ok_or_else(|| AppError::Unauthorized("Unknown product".into()))?;
    let expected = product
        .shared_secret
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized("Product has no shared secret".into()))?;
    let presented = bearer.ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    // Compare fixed-length digests rather than the raw secrets.
    if Sha256::digest(presented.as_bytes()) != Sha256::digest(expected.as_bytes()) {
        warn!(product_id = %product.id, "handoff redemption with wrong shared secret");
        return Err(AppError::Unauthorized("Invalid shared secret".into()));
    }

    let ticket = state.handoff.redeem(&product.id, &request.code)?;
    info!(product_id = %product.id, sub = %ticket.claims.sub, "handoff code redeemed");
    Ok(RedeemResponse {
        token: ticket.product_token,
        claims: ticket.claims,
    })
}
