//! Browser session lookup.

use axum::http::HeaderMap;
use keyway_core::cookies::SESSION_COOKIE;
use keyway_core::session::Session;

use crate::AppState;
use crate::error::AppResult;
use crate::services::cookies::read_cookie;

/// Load the session named by the `keyway_sid` cookie, if it is still alive.
pub async fn current_session(state: &AppState, headers: &HeaderMap) -> AppResult<Option<Session>> {
    let Some(id) = read_cookie(headers, SESSION_COOKIE) else {
        return Ok(None);
    };
    Ok(state.sessions.get(&id).await?)
}
