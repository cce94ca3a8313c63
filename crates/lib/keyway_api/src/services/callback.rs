//! Callback processing: the single place a login completes.
//!
//! Outcomes are redirects. A stale or forged `state` sends the browser back
//! to the login entry point, an IdP failure goes to the configured error
//! page, and a back-channel failure returns to `returnTo` with an error
//! marker. Only unexpected failures surface as `AppError`.

use keyway_core::config::DeliveryMode;
use keyway_core::redirect::with_query_param;
use keyway_core::session::Session;
use tracing::{info, warn};
use url::Url;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::CallbackParams;
use crate::services::cookies::{RedirectWithCookies, session_cookie, set_cookie};
use crate::services::handoff;

/// Login entry point with an error marker, used to force a fresh login.
fn relogin_url(state: &AppState, error: &str, product_id: Option<&str>) -> AppResult<Url> {
    let login = state
        .config
        .callback_url
        .join("/auth/login")
        .map_err(|e| AppError::Internal(format!("login url: {e}")))?;
    let mut url = with_query_param(&login, "error", error);
    if let Some(id) = product_id {
        url = with_query_param(&url, "productId", id);
    }
    Ok(url)
}

fn idp_unavailable(state: &AppState) -> RedirectWithCookies {
    RedirectWithCookies::to(with_query_param(
        &state.config.error_redirect,
        "error",
        "idp_unavailable",
    ))
}

/// Complete a login started by [`crate::services::login::begin_login`].
pub async fn complete_login(
    state: &AppState,
    session: Option<Session>,
    params: CallbackParams,
) -> AppResult<RedirectWithCookies> {
    let mut session = session.unwrap_or_else(Session::new);
    let pending = session.pending.take();
    if pending.is_some() {
        // Consume the pending login before anything else can fail.
        state.sessions.set(session.clone()).await?;
    }

    if let Some(pending) = &pending
        && params.state.as_deref() != Some(pending.state.as_str())
    {
        warn!(product_id = ?pending.product_id, "callback state mismatch");
        let url = relogin_url(state, "state_mismatch", pending.product_id.as_deref())?;
        return Ok(RedirectWithCookies::to(url));
    }
    if pending.is_none() {
        warn!("callback without pending login; using default destination");
    }

    if let Some(error) = &params.error {
        warn!(%error, description = ?params.error_description, "IdP returned an error");
        return Ok(idp_unavailable(state));
    }
    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        warn!("callback without authorization code");
        return Ok(idp_unavailable(state));
    };

    let verifier = pending
        .as_ref()
        .map(|p| p.pkce_verifier.as_str())
        .unwrap_or_default();
    let exchange = match state
        .idp
        .exchange_code(code, verifier, &state.config.callback_url)
        .await
    {
        Ok(exchange) => exchange,
        Err(e) => {
            warn!(error = %e, "authorization code exchange failed");
            return Ok(idp_unavailable(state));
        }
    };

    let product = pending
        .as_ref()
        .and_then(|p| p.product_id.as_deref())
        .and_then(|id| state.config.product(id));
    let requested_return = pending.as_ref().and_then(|p| p.return_to.clone());
    let return_to = requested_return
        .clone()
        .unwrap_or_else(|| state.config.default_redirect.clone());
    let identity = exchange.claims;

    if let Some(product) = product
        && product.delivery == DeliveryMode::BackChannel
    {
        let code = match handoff::deliver(state, product, &identity).await {
            Ok(code) => code,
            Err(e) => {
                warn!(product_id = %product.id, error = %e, "back-channel handoff failed");
                return Ok(RedirectWithCookies::to(with_query_param(
                    &return_to,
                    "error",
                    "handoff_failed",
                )));
            }
        };
        let (token, _) = state.minter.mint(&identity, Some(&product.id), None)?;
        let mut redirect =
            RedirectWithCookies::to(with_query_param(&product.callback_url, "code", &code));
        for placement in state.cookies.login_placements(Some(&product.id)) {
            redirect = redirect.with_cookie(set_cookie(&placement.name, &token, &placement.scope));
        }
        return finish(state, session, token, &identity.sub, exchange.id_token, redirect).await;
    }

    let product_id = product.map(|p| p.id.as_str());
    let (token, _) = state.minter.mint(&identity, product_id, None)?;
    let location = match product {
        Some(product) => {
            let url = with_query_param(&product.callback_url, "token", &token);
            // The product finishes the user's navigation.
            match &requested_return {
                Some(next) => with_query_param(&url, "returnTo", next.as_str()),
                None => url,
            }
        }
        None => return_to,
    };
    let mut redirect = RedirectWithCookies::to(location);
    for placement in state.cookies.login_placements(product_id) {
        redirect = redirect.with_cookie(set_cookie(&placement.name, &token, &placement.scope));
    }
    finish(state, session, token, &identity.sub, exchange.id_token, redirect).await
}

/// Store the authenticated session under a fresh id, drop the
/// pre-authentication one and attach the new cookie to the redirect.
async fn finish(
    state: &AppState,
    previous: Session,
    token: String,
    subject: &str,
    id_token: Option<String>,
    redirect: RedirectWithCookies,
) -> AppResult<RedirectWithCookies> {
    let session = Session {
        token: Some(token),
        subject: Some(subject.to_string()),
        id_token_hint: id_token,
        ..Session::new()
    };
    let session_id = session.id.clone();
    state.sessions.set(session).await?;
    state.sessions.destroy(&previous.id).await?;

    info!(sub = %subject, location = %redirect.location.origin().ascii_serialization(), "login completed");
    Ok(redirect.with_cookie(session_cookie(&state.cookies, &session_id)))
}
