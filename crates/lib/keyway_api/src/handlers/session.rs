//! Token verification endpoints.

use axum::extract::{Extension, State};
use axum::http::{HeaderMap, Uri};
use axum::Json;
use keyway_core::models::InternalClaims;
use tracing::debug;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::{AuthenticatedUser, query_param, verify_request};
use crate::models::VerifyResponse;

/// `GET /auth/verify?audience=`: claims of the presented token, or 401 with
/// the failure kind. A product passes its own id as `audience` to accept
/// tokens scoped to it.
pub async fn verify_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> AppResult<Json<VerifyResponse>> {
    let audience = query_param(uri.query(), "audience");
    let claims = verify_request(&state, &headers, uri.query(), audience.as_deref()).inspect_err(|e| {
        debug!(kind = e.kind(), "token verification failed");
    })?;
    Ok(Json(VerifyResponse {
        valid: true,
        claims,
    }))
}

/// `GET /auth/me`: the authenticated caller's claims.
pub async fn me_handler(Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>) -> Json<InternalClaims> {
    Json(claims)
}
