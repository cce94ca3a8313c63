//! Handoff redemption handler.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::bearer_token;
use crate::models::{RedeemRequest, RedeemResponse};
use crate::services::handoff;

/// `POST /auth/handoff/redeem`: exchange a one-time code for the product
/// token. Authenticated with the product's shared secret.
pub async fn redeem_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RedeemRequest>,
) -> AppResult<Json<RedeemResponse>> {
    let resp = handoff::redeem(&state, bearer_token(&headers), body)?;
    Ok(Json(resp))
}
