//! Login initiation: remember where the user is going, then send them to
//! the IdP.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use keyway_core::redirect::validate_return_to;
use keyway_core::session::{PendingLogin, Session};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::LoginParams;
use crate::services::cookies::{RedirectWithCookies, session_cookie};

/// Random URL-safe token from `len` bytes of entropy.
fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 code challenge for a PKCE verifier.
fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Record a pending login in the caller's session and build the IdP
/// authorization redirect.
///
/// Repeated calls overwrite the pending login; the last one wins.
pub async fn begin_login(
    state: &AppState,
    session: Option<Session>,
    params: LoginParams,
) -> AppResult<RedirectWithCookies> {
    let product_id = params.product_id.filter(|p| !p.trim().is_empty());
    if let Some(id) = &product_id
        && state.config.product(id).is_none()
    {
        return Err(AppError::Validation(format!("Unknown productId: {id}")));
    }

    let return_to = match params.return_to.as_deref().filter(|r| !r.trim().is_empty()) {
        Some(raw) => Some(validate_return_to(raw, &state.config.redirect_allowlist())?),
        None => None,
    };

    let mut session = session.unwrap_or_else(|| {
        debug!("starting new browser session");
        Session::new()
    });

    // 32 bytes encode to a 43 character verifier, the RFC 7636 minimum.
    let verifier = random_token(32);
    let challenge = s256_challenge(&verifier);
    let oauth_state = random_token(24);

    session.pending = Some(PendingLogin {
        product_id: product_id.clone(),
        return_to,
        state: oauth_state.clone(),
        pkce_verifier: verifier,
        created_at: Utc::now(),
    });
    let session_id = session.id.clone();
    state.sessions.set(session).await?;

    let location = state
        .idp
        .authorization_url(&oauth_state, &challenge, &state.config.callback_url);

    info!(product_id = ?product_id, "login started");
    Ok(RedirectWithCookies::to(location).with_cookie(session_cookie(&state.cookies, &session_id)))
}
