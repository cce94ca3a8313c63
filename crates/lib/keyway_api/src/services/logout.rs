//! Logout: local session teardown, cookie clearing and optional federated
//! logout at the IdP.
//!
//! Best effort throughout. Sessions that products established over the
//! back channel are not reachable from here and live until they expire.

use keyway_core::redirect::validate_return_to;
use keyway_core::session::Session;
use tracing::{info, warn};

use crate::AppState;
use crate::models::LogoutParams;
use crate::services::cookies::{RedirectWithCookies, clear_cookie, clear_session_cookie};

/// Tear down the caller's broker session and redirect.
///
/// Never fails: store and IdP errors are logged and the browser is still
/// redirected with every token cookie cleared. A global logout goes through
/// the IdP's end-session endpoint when it has one, which forwards the
/// browser on to `returnTo`.
pub async fn logout(state: &AppState, session: Option<Session>, params: LogoutParams) -> RedirectWithCookies {
    let global = params.is_global();
    let return_to = params
        .return_to
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .and_then(|raw| match validate_return_to(raw, &state.config.redirect_allowlist()) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, "ignoring invalid logout returnTo");
                None
            }
        })
        .unwrap_or_else(|| state.config.default_redirect.clone());

    let mut id_token_hint = None;
    if let Some(session) = session {
        id_token_hint = session.id_token_hint;
        if let Err(e) = state.sessions.destroy(&session.id).await {
            warn!(error = %e, "failed to destroy session during logout");
        }
    }

    let mut location = return_to;
    if global {
        match state.idp.end_session_redirect(id_token_hint.as_deref(), &location) {
            Some(end_session) => {
                info!(idp = %end_session.origin().ascii_serialization(), "sending browser to IdP end-session");
                location = end_session;
            }
            None => {
                let call = state.idp.federated_logout(id_token_hint.as_deref());
                match tokio::time::timeout(state.config.idp_timeout, call).await {
                    Ok(Ok(())) => info!("federated logout completed"),
                    Ok(Err(e)) => warn!(error = %e, "federated logout failed"),
                    Err(_) => warn!(
                        timeout_ms = state.config.idp_timeout.as_millis() as u64,
                        "federated logout timed out"
                    ),
                }
            }
        }
    }

    let mut redirect = RedirectWithCookies::to(location);
    for placement in state.cookies.logout_placements() {
        redirect = redirect.with_cookie(clear_cookie(&placement.name, &placement.scope));
    }
    info!(global, "logout completed");
    redirect.with_cookie(clear_session_cookie(&state.cookies))
}
