//! Request and response bodies.

use keyway_core::models::InternalClaims;
use serde::{Deserialize, Serialize};

/// JSON error body: machine-readable `error`, human-readable `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// `GET /auth/login` query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginParams {
    pub product_id: Option<String>,
    pub return_to: Option<String>,
}

/// `GET /auth/callback` query as sent by the IdP.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// `GET|POST /auth/logout` query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutParams {
    pub return_to: Option<String>,
    /// Raw flag; see [`LogoutParams::is_global`].
    pub global: Option<String>,
}

impl LogoutParams {
    /// `1`, `true`, `yes` and `on` (any case) ask for federated logout.
    /// Anything else, including an empty value, means local logout.
    pub fn is_global(&self) -> bool {
        self.global.as_deref().map(str::trim).is_some_and(|v| {
            ["1", "true", "yes", "on"]
                .iter()
                .any(|t| v.eq_ignore_ascii_case(t))
        })
    }
}

/// `POST /auth/handoff/redeem` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub product_id: String,
    pub code: String,
}

/// Product token unlocked by a one-time code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub token: String,
    pub claims: InternalClaims,
}

/// `GET /auth/verify` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub claims: InternalClaims,
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
