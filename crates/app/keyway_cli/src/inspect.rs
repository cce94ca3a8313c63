//! Token inspection for `keyway inspect-token`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use keyway_core::auth::TokenError;
use keyway_core::auth::jwt::TokenValidator;
use serde_json::Value;

use crate::Result;

/// Decoded token claims and whether they were verified.
#[derive(Debug)]
pub struct Inspection {
    pub verified: bool,
    pub claims: Value,
}

/// Verify `token` when a secret is given, otherwise decode its payload.
pub fn inspect(
    token: &str,
    secret: Option<&str>,
    issuer: &str,
    audience: Option<&str>,
) -> Result<Inspection> {
    let token = token.trim();
    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        let mut validator = TokenValidator::new(secret.as_bytes(), issuer);
        if let Some(audience) = audience {
            validator = validator.for_audience(audience);
        }
        let claims = validator.validate(token)?;
        return Ok(Inspection {
            verified: true,
            claims: serde_json::to_value(claims)?,
        });
    }

    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed.into());
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed)?;
    Ok(Inspection {
        verified: false,
        claims: serde_json::from_slice(&bytes)?,
    })
}
