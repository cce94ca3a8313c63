//! Authentication middleware: token extraction and verification.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use keyway_core::auth::TokenError;
use keyway_core::cookies::TOKEN_COOKIE;
use keyway_core::models::InternalClaims;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::read_cookie;

/// Key used to store verified claims in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub InternalClaims);

/// Value of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Locate the caller's token: bearer header, then the `keyway_token`
/// cookie, then the `token` query parameter.
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token.to_string());
    }
    if let Some(token) = read_cookie(headers, TOKEN_COOKIE) {
        return Some(token);
    }
    query_param(query, "token")
}

/// First non-empty value of `name` in a raw query string.
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, v)| k == name && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

/// Verify whatever token the request carries.
///
/// With `audience`, tokens scoped to that audience are accepted as well as
/// unscoped ones; without it only unscoped broker tokens pass.
pub fn verify_request(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
    audience: Option<&str>,
) -> Result<InternalClaims, TokenError> {
    let token = extract_token(headers, query).ok_or(TokenError::Missing)?;
    match audience {
        Some(audience) => state.validator.for_audience(audience).validate(&token),
        None => state.validator.validate(&token),
    }
}

/// Axum middleware: verifies the request token and injects
/// `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = verify_request(&state, request.headers(), request.uri().query(), None)?;
    request.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(request).await)
}
