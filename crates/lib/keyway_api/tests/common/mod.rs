//! Shared harness: a broker router wired to a scripted IdP, plus a mock
//! back-channel product on an ephemeral port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::extract::cookie::Cookie;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use keyway_api::AppState;
use keyway_core::config::{BrokerConfig, parse_products};
use keyway_core::handoff::HandoffLedger;
use keyway_core::idp::{IdentityProvider, IdpError, IdpExchange};
use keyway_core::models::IdentityClaims;
use keyway_core::session::{MemorySessionStore, SessionStore};
use sha2::{Digest, Sha256};
use tower::ServiceExt;
use url::Url;

pub const SIGNING_SECRET: &str = "test-signing-secret-0123456789abcdef";
pub const PRODUCT_B_SECRET: &str = "product-b-shared-secret";
pub const GOOD_CODE: &str = "good-code";

/// IdP double that accepts [`GOOD_CODE`] and records what it was asked.
///
/// Like a real IdP it refuses a verifier that does not hash to a challenge
/// it handed out.
#[derive(Default)]
pub struct MockIdp {
    pub fail_logout: bool,
    /// Delay before the server-side logout answers.
    pub logout_delay: Option<Duration>,
    /// Offer a browser end-session endpoint.
    pub end_session: bool,
    pub challenges: Mutex<Vec<String>>,
    pub verifiers: Mutex<Vec<String>>,
    pub logout_hints: Mutex<Vec<Option<String>>>,
    pub logout_calls: AtomicUsize,
}

fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[async_trait]
impl IdentityProvider for MockIdp {
    fn authorization_url(&self, state: &str, code_challenge: &str, redirect_uri: &Url) -> Url {
        self.challenges.lock().unwrap().push(code_challenge.to_string());
        let mut url = Url::parse("https://idp.test/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("redirect_uri", redirect_uri.as_str());
        url
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        _redirect_uri: &Url,
    ) -> Result<IdpExchange, IdpError> {
        self.verifiers.lock().unwrap().push(code_verifier.to_string());
        if code != GOOD_CODE {
            return Err(IdpError::Rejected("invalid_grant".into()));
        }
        if !code_verifier.is_empty()
            && !self.challenges.lock().unwrap().contains(&s256(code_verifier))
        {
            return Err(IdpError::Rejected("pkce verification failed".into()));
        }
        Ok(IdpExchange {
            claims: IdentityClaims {
                sub: "auth0|42".into(),
                email: Some("ada@example.com".into()),
                name: Some("Ada".into()),
                picture: None,
                roles: vec!["admin".into()],
                permissions: vec!["read:reports".into()],
            },
            id_token: Some("idt-1".into()),
        })
    }

    fn end_session_redirect(&self, id_token_hint: Option<&str>, return_to: &Url) -> Option<Url> {
        if !self.end_session {
            return None;
        }
        let mut url = Url::parse("https://idp.test/v2/logout").unwrap();
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token_hint.unwrap_or_default())
            .append_pair("returnTo", return_to.as_str());
        Some(url)
    }

    async fn federated_logout(&self, id_token_hint: Option<&str>) -> Result<(), IdpError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logout_hints
            .lock()
            .unwrap()
            .push(id_token_hint.map(str::to_string));
        if let Some(delay) = self.logout_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_logout {
            Err(IdpError::Unreachable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

/// What the mock product's session endpoint saw.
#[derive(Debug, Clone)]
pub struct ProductCall {
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

/// Start a mock back-channel product answering with `status`.
pub async fn spawn_product(status: StatusCode) -> (Url, Arc<Mutex<Vec<ProductCall>>>) {
    spawn_product_with_delay(status, Duration::ZERO).await
}

/// Like [`spawn_product`], but the session endpoint takes `delay` to answer.
pub async fn spawn_product_with_delay(
    status: StatusCode,
    delay: Duration,
) -> (Url, Arc<Mutex<Vec<ProductCall>>>) {
    let calls: Arc<Mutex<Vec<ProductCall>>> = Arc::default();
    let recorded = Arc::clone(&calls);
    let app = Router::new().route(
        "/internal/sso/session",
        post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
            let recorded = Arc::clone(&recorded);
            async move {
                recorded.lock().unwrap().push(ProductCall {
                    authorization: headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    body,
                });
                tokio::time::sleep(delay).await;
                status
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let endpoint = Url::parse(&format!("http://{addr}/internal/sso/session")).unwrap();
    (endpoint, calls)
}

/// Broker under test plus handles to its shared state.
pub struct Harness {
    pub app: Router,
    pub state: AppState,
    pub idp: Arc<MockIdp>,
    pub sessions: Arc<MemorySessionStore>,
    pub ledger: Arc<HandoffLedger>,
}

pub fn config(session_endpoint: &Url) -> BrokerConfig {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("KEYWAY_SIGNING_SECRET", SIGNING_SECRET),
        ("KEYWAY_CALLBACK_URL", "https://sso.example.com/auth/callback"),
        ("KEYWAY_DEFAULT_REDIRECT", "https://portal.example.com/"),
        ("KEYWAY_ERROR_REDIRECT", "https://sso.example.com/error"),
        ("KEYWAY_ROOT_DOMAIN", "example.com"),
        ("KEYWAY_HANDOFF_TIMEOUT_SECS", "2"),
        ("KEYWAY_IDP_TIMEOUT_SECS", "2"),
        ("OIDC_ISSUER_URL", "https://idp.test/"),
        ("OIDC_CLIENT_ID", "client"),
        ("OIDC_CLIENT_SECRET", "secret"),
    ]);
    let mut config = BrokerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
    config.products = parse_products(&format!(
        r#"
products:
  - id: productA
    delivery: direct
    callbackUrl: https://a.example/auth/sso-callback
    cookieDomain: .a.example
    clientCookie: true
    cookieAliases: [productA_token]
  - id: productB
    delivery: back-channel
    callbackUrl: https://b.example/auth/callback
    sessionEndpoint: {session_endpoint}
    sharedSecret: {PRODUCT_B_SECRET}
"#
    ))
    .unwrap();
    config
}

pub fn harness(config: BrokerConfig, idp: MockIdp) -> Harness {
    let idp = Arc::new(idp);
    let sessions = Arc::new(MemorySessionStore::default());
    let ledger = Arc::new(HandoffLedger::new());
    let state = AppState::new(
        config,
        Arc::clone(&sessions) as Arc<dyn SessionStore>,
        Arc::clone(&idp) as Arc<dyn IdentityProvider>,
        Arc::clone(&ledger),
    );
    Harness {
        app: keyway_api::router(state.clone()),
        state,
        idp,
        sessions,
        ledger,
    }
}

/// Parsed response: status, `Location`, and every `Set-Cookie`.
pub struct Reply {
    pub status: StatusCode,
    pub location: Option<Url>,
    pub cookies: Vec<Cookie<'static>>,
    pub body: serde_json::Value,
}

impl Reply {
    pub fn cookie(&self, name: &str, domain: Option<&str>) -> Option<&Cookie<'static>> {
        self.cookies
            .iter()
            .find(|c| c.name() == name && c.domain() == domain)
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.location
            .as_ref()?
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

impl Harness {
    pub async fn send(&self, req: Request<Body>) -> Reply {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let location = resp
            .headers()
            .get(LOCATION)
            .map(|v| Url::parse(v.to_str().unwrap()).unwrap());
        let cookies = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
            .collect();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        Reply {
            status,
            location,
            cookies,
            body,
        }
    }

    pub async fn get(&self, uri: &str, sid: Option<&str>) -> Reply {
        let mut req = Request::builder().uri(uri);
        if let Some(sid) = sid {
            req = req.header("cookie", format!("keyway_sid={sid}"));
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    /// Run login then callback; returns the callback reply and the session
    /// id the browser holds afterwards.
    pub async fn login(&self, query: &str) -> (Reply, String) {
        let started = self.get(&format!("/auth/login?{query}"), None).await;
        assert_eq!(started.status, StatusCode::FOUND);
        let sid = started
            .cookie("keyway_sid", None)
            .expect("session cookie")
            .value()
            .to_string();
        let state = started.query("state").expect("state param");
        let reply = self
            .get(
                &format!("/auth/callback?code={GOOD_CODE}&state={state}"),
                Some(&sid),
            )
            .await;
        let sid = reply
            .cookie("keyway_sid", None)
            .map(|c| c.value().to_string())
            .unwrap_or(sid);
        (reply, sid)
    }
}
