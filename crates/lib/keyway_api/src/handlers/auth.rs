//! Login, callback and logout handlers.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::AppState;
use crate::error::AppResult;
use crate::models::{CallbackParams, LoginParams, LogoutParams};
use crate::services::session::current_session;
use crate::services::{callback, login, logout};

/// `GET /auth/login`: start a login and redirect to the IdP.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LoginParams>,
) -> AppResult<Response> {
    let session = current_session(&state, &headers).await?;
    let redirect = login::begin_login(&state, session, params).await?;
    Ok(redirect.into_response())
}

/// `GET /auth/callback`: IdP redirect target.
pub async fn callback_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> AppResult<Response> {
    let session = current_session(&state, &headers).await?;
    let redirect = callback::complete_login(&state, session, params).await?;
    Ok(redirect.into_response())
}

/// `GET|POST /auth/logout`: clear the session everywhere the broker can.
///
/// An unreadable query degrades to a local logout to the default
/// destination rather than a 400.
pub async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<LogoutParams>, QueryRejection>,
) -> Response {
    let params = match query {
        Ok(Query(params)) => params,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable logout query; logging out locally");
            LogoutParams::default()
        }
    };
    // A broken store must not block logout.
    let session = current_session(&state, &headers).await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "session lookup failed during logout");
        None
    });
    logout::logout(&state, session, params).await.into_response()
}
