//! Identity provider capability.
//!
//! The broker never talks to an IdP implicitly; components that need one are
//! handed an `Arc<dyn IdentityProvider>` at construction.

pub mod oidc;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::models::IdentityClaims;
use crate::session::Session;

pub use oidc::OidcProvider;

/// Upstream IdP failures. Never retried synchronously.
#[derive(Debug, Error)]
pub enum IdpError {
    #[error("IdP unreachable: {0}")]
    Unreachable(String),

    #[error("IdP rejected the request: {0}")]
    Rejected(String),

    #[error("IdP response invalid: {0}")]
    InvalidResponse(String),
}

/// Result of a completed authorization-code exchange.
#[derive(Debug, Clone)]
pub struct IdpExchange {
    pub claims: IdentityClaims,
    /// Raw ID token, kept only as the federated logout hint.
    pub id_token: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authorization endpoint URL for a new login.
    fn authorization_url(&self, state: &str, code_challenge: &str, redirect_uri: &Url) -> Url;

    /// Exchange an authorization code for verified identity claims.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &Url,
    ) -> Result<IdpExchange, IdpError>;

    /// Browser destination that ends the user's IdP session and then sends
    /// the browser on to `return_to`. `None` when the provider has no
    /// browser-facing end-session endpoint.
    fn end_session_redirect(&self, _id_token_hint: Option<&str>, _return_to: &Url) -> Option<Url> {
        None
    }

    /// Server-side session termination, for providers that offer one.
    /// Used when [`end_session_redirect`](Self::end_session_redirect) is `None`.
    async fn federated_logout(&self, _id_token_hint: Option<&str>) -> Result<(), IdpError> {
        Ok(())
    }

    /// Whether the broker session has completed an IdP login.
    fn is_authenticated(&self, session: &Session) -> bool {
        session.is_authenticated()
    }
}
