//! # keyway_api
//!
//! HTTP surface of the Keyway SSO broker.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use keyway_core::auth::jwt::{TokenMinter, TokenValidator};
use keyway_core::config::BrokerConfig;
use keyway_core::cookies::CookiePolicy;
use keyway_core::handoff::HandoffLedger;
use keyway_core::idp::IdentityProvider;
use keyway_core::session::SessionStore;
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{auth, handoff, health, session};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broker configuration.
    pub config: Arc<BrokerConfig>,
    /// Cookie scope policy derived from `config`.
    pub cookies: Arc<CookiePolicy>,
    pub minter: TokenMinter,
    pub validator: TokenValidator,
    /// Browser session persistence.
    pub sessions: Arc<dyn SessionStore>,
    /// Identity provider capability.
    pub idp: Arc<dyn IdentityProvider>,
    /// Outstanding back-channel handoff tickets.
    pub handoff: Arc<HandoffLedger>,
    /// Client for broker-to-product calls.
    pub http: reqwest::Client,
}

impl AppState {
    /// Wire every component from one configuration object.
    pub fn new(
        config: BrokerConfig,
        sessions: Arc<dyn SessionStore>,
        idp: Arc<dyn IdentityProvider>,
        handoff: Arc<HandoffLedger>,
    ) -> Self {
        let secret = config.signing_secret.as_bytes();
        let minter = TokenMinter::new(secret, config.issuer.clone(), config.token_ttl_secs);
        let validator = TokenValidator::new(secret, config.issuer.clone());
        let cookies = CookiePolicy::from_config(&config);
        Self {
            config: Arc::new(config),
            cookies: Arc::new(cookies),
            minter,
            validator,
            sessions,
            idp,
            handoff,
            http: reqwest::Client::new(),
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/health", get(health::health_handler))
        .route("/auth/login", get(auth::login_handler))
        .route("/auth/callback", get(auth::callback_handler))
        .route(
            "/auth/logout",
            get(auth::logout_handler).post(auth::logout_handler),
        )
        .route("/auth/handoff/redeem", post(handoff::redeem_handler))
        .route("/auth/verify", get(session::verify_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route("/auth/me", get(session::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
