//! OpenID Connect provider over reqwest.
//!
//! Authorization-code flow with PKCE: form-encoded token exchange and claims
//! from the userinfo endpoint. Federated logout sends the browser to the
//! end-session endpoint, since the IdP session lives in the browser's IdP
//! cookie.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use super::{IdentityProvider, IdpError, IdpExchange};
use crate::config::OidcConfig;
use crate::models::IdentityClaims;

/// Response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
}

pub struct OidcProvider {
    config: OidcConfig,
    client: reqwest::Client,
}

impl OidcProvider {
    /// Build a provider whose every request is bounded by `timeout`.
    pub fn new(config: OidcConfig, timeout: std::time::Duration) -> Result<Self, IdpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| IdpError::Unreachable(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn claims_from_userinfo(&self, info: &Value) -> Result<IdentityClaims, IdpError> {
        let sub = info
            .get("sub")
            .and_then(Value::as_str)
            .ok_or_else(|| IdpError::InvalidResponse("userinfo has no sub".into()))?;
        let string = |key: &str| info.get(key).and_then(Value::as_str).map(str::to_string);
        let list = |key: &str| -> Vec<String> {
            info.get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(IdentityClaims {
            sub: sub.to_string(),
            email: string("email"),
            name: string("name"),
            picture: string("picture"),
            roles: list(&self.config.roles_claim),
            permissions: list(&self.config.permissions_claim),
        })
    }
}

fn transport_error(what: &str, e: reqwest::Error) -> IdpError {
    if e.is_timeout() {
        IdpError::Unreachable(format!("{what} timed out"))
    } else {
        IdpError::Unreachable(format!("{what}: {e}"))
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn authorization_url(&self, state: &str, code_challenge: &str, redirect_uri: &Url) -> Url {
        let mut url = self.config.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        url
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &Url,
    ) -> Result<IdpExchange, IdpError> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        // Empty when the pending login was already consumed.
        if !code_verifier.is_empty() {
            params.push(("code_verifier", code_verifier));
        }

        let resp = self
            .client
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error("token exchange", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body: String = resp.text().await.unwrap_or_default().chars().take(500).collect();
            error!(token_url = %self.config.token_url, %status, "token exchange failed");
            debug!(%body, "token endpoint error body");
            return Err(IdpError::Rejected(format!("token endpoint returned HTTP {status}")));
        }

        let tokens: TokenResponse = resp
            .json()
            .await
            .map_err(|e| IdpError::InvalidResponse(format!("token response: {e}")))?;

        let resp = self
            .client
            .get(self.config.userinfo_url.clone())
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| transport_error("userinfo", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            error!(userinfo_url = %self.config.userinfo_url, %status, "userinfo request failed");
            return Err(IdpError::Rejected(format!("userinfo returned HTTP {status}")));
        }

        let info: Value = resp
            .json()
            .await
            .map_err(|e| IdpError::InvalidResponse(format!("userinfo: {e}")))?;

        let claims = self.claims_from_userinfo(&info)?;
        info!(sub = %claims.sub, "IdP code exchange successful");
        Ok(IdpExchange {
            claims,
            id_token: tokens.id_token,
        })
    }

    fn end_session_redirect(&self, id_token_hint: Option<&str>, return_to: &Url) -> Option<Url> {
        let Some(endpoint) = &self.config.end_session_url else {
            debug!("no end-session endpoint configured; skipping federated logout");
            return None;
        };
        let mut url = endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
            // Auth0 reads `returnTo`; RP-initiated logout reads the other.
            query.append_pair("returnTo", return_to.as_str());
            query.append_pair("post_logout_redirect_uri", return_to.as_str());
        }
        Some(url)
    }
}
