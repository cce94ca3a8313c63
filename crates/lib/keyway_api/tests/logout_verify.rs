//! Logout teardown and token verification endpoints.

mod common;

use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use common::{MockIdp, SIGNING_SECRET, harness, spawn_product};
use keyway_core::auth::jwt::TokenMinter;
use keyway_core::models::IdentityClaims;
use keyway_core::session::SessionStore;
use serde_json::json;
use time::OffsetDateTime;
use tokio::time::Instant;

#[tokio::test]
async fn global_logout_clears_everything_even_when_idp_fails() {
    let (endpoint, _) = spawn_product(StatusCode::OK).await;
    let idp = MockIdp {
        fail_logout: true,
        ..MockIdp::default()
    };
    let h = harness(common::config(&endpoint), idp);
    let (_, sid) = h.login("productId=productA").await;

    let reply = h
        .get(
            "/auth/logout?global=true&returnTo=https://a.example/bye",
            Some(&sid),
        )
        .await;

    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(reply.location.clone().unwrap().as_str(), "https://a.example/bye");
    assert_eq!(h.idp.logout_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.idp.logout_hints.lock().unwrap().as_slice(),
        [Some("idt-1".to_string())]
    );
    assert!(h.sessions.get(&sid).await.unwrap().is_none());

    let expected = h.state.cookies.logout_placements().len() + 1;
    assert_eq!(reply.cookies.len(), expected);
    for cookie in &reply.cookies {
        assert_eq!(cookie.value(), "", "{cookie}");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO), "{cookie}");
        assert_eq!(cookie.expires_datetime(), Some(OffsetDateTime::UNIX_EPOCH));
    }
    for (name, domain) in [
        ("keyway_token", Some("example.com")),
        ("keyway_token", Some("a.example")),
        ("keyway_token", None),
        ("keyway_token_client", Some("a.example")),
        ("productA_token", Some("example.com")),
        ("keyway_sid", None),
    ] {
        assert!(reply.cookie(name, domain).is_some(), "{name} on {domain:?}");
    }
}

#[tokio::test]
async fn global_flag_accepts_numeric_and_tolerates_junk() {
    let (endpoint, _) = spawn_product(StatusCode::OK).await;
    let h = harness(common::config(&endpoint), MockIdp::default());

    let (_, sid) = h.login("productId=productA").await;
    let reply = h
        .get("/auth/logout?global=1&returnTo=https://a.example/bye", Some(&sid))
        .await;
    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(reply.location.clone().unwrap().as_str(), "https://a.example/bye");
    assert!(reply.cookie("keyway_token", Some("example.com")).is_some());
    assert!(h.sessions.get(&sid).await.unwrap().is_none());
    assert_eq!(h.idp.logout_calls.load(Ordering::SeqCst), 1);

    // Empty, unknown and repeated values fall back to a local logout.
    for query in ["global=", "global=maybe", "global=1&global=0"] {
        let (_, sid) = h.login("").await;
        let reply = h.get(&format!("/auth/logout?{query}"), Some(&sid)).await;
        assert_eq!(reply.status, StatusCode::FOUND, "{query}");
        assert!(!reply.cookies.is_empty(), "{query}");
        assert!(h.sessions.get(&sid).await.unwrap().is_none(), "{query}");
    }
    assert_eq!(h.idp.logout_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn global_logout_hands_browser_to_idp_end_session() {
    let (endpoint, _) = spawn_product(StatusCode::OK).await;
    let idp = MockIdp {
        end_session: true,
        ..MockIdp::default()
    };
    let h = harness(common::config(&endpoint), idp);
    let (_, sid) = h.login("productId=productA").await;

    let reply = h
        .get(
            "/auth/logout?global=true&returnTo=https://a.example/bye",
            Some(&sid),
        )
        .await;

    assert_eq!(reply.status, StatusCode::FOUND);
    let location = reply.location.clone().unwrap();
    assert_eq!(location.host_str(), Some("idp.test"));
    assert_eq!(reply.query("returnTo").as_deref(), Some("https://a.example/bye"));
    assert_eq!(reply.query("id_token_hint").as_deref(), Some("idt-1"));
    // The browser carries the IdP cookie there; no server-side call.
    assert_eq!(h.idp.logout_calls.load(Ordering::SeqCst), 0);
    assert!(h.sessions.get(&sid).await.unwrap().is_none());
    assert_eq!(
        reply.cookies.len(),
        h.state.cookies.logout_placements().len() + 1
    );
}

#[tokio::test]
async fn hanging_idp_logout_is_cut_off() {
    let (endpoint, _) = spawn_product(StatusCode::OK).await;
    let idp = MockIdp {
        logout_delay: Some(std::time::Duration::from_secs(10)),
        ..MockIdp::default()
    };
    let h = harness(common::config(&endpoint), idp);
    let (_, sid) = h.login("productId=productA").await;

    let started = Instant::now();
    let reply = h
        .get(
            "/auth/logout?global=true&returnTo=https://a.example/bye",
            Some(&sid),
        )
        .await;
    let elapsed = started.elapsed();

    // KEYWAY_IDP_TIMEOUT_SECS is 2 in the harness.
    assert!(elapsed < std::time::Duration::from_secs(5), "took {elapsed:?}");
    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(reply.location.clone().unwrap().as_str(), "https://a.example/bye");
    assert_eq!(h.idp.logout_calls.load(Ordering::SeqCst), 1);
    assert!(h.sessions.get(&sid).await.unwrap().is_none());
    assert!(!reply.cookies.is_empty());
}

#[tokio::test]
async fn local_logout_skips_idp_and_survives_bad_return_to() {
    let (endpoint, _) = spawn_product(StatusCode::OK).await;
    let h = harness(common::config(&endpoint), MockIdp::default());
    let (_, sid) = h.login("").await;

    let req = Request::builder()
        .method("POST")
        .uri("/auth/logout?returnTo=not-a-url")
        .header("cookie", format!("keyway_sid={sid}"))
        .body(Body::empty())
        .unwrap();
    let reply = h.send(req).await;

    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(
        reply.location.clone().unwrap().as_str(),
        "https://portal.example.com/"
    );
    assert_eq!(h.idp.logout_calls.load(Ordering::SeqCst), 0);
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn logout_without_session_still_redirects() {
    let (endpoint, _) = spawn_product(StatusCode::OK).await;
    let h = harness(common::config(&endpoint), MockIdp::default());

    let reply = h.get("/auth/logout?global=true", None).await;

    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(
        h.idp.logout_hints.lock().unwrap().as_slice(),
        [None::<String>]
    );
    assert!(!reply.cookies.is_empty());
}

fn identity() -> IdentityClaims {
    IdentityClaims {
        sub: "auth0|7".into(),
        email: None,
        name: None,
        picture: None,
        roles: vec!["viewer".into()],
        permissions: vec![],
    }
}

async fn verify(h: &common::Harness, req: Request<Body>) -> common::Reply {
    h.send(req).await
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().uri(uri)
}

#[tokio::test]
async fn verify_reports_failure_kinds() {
    let (endpoint, _) = spawn_product(StatusCode::OK).await;
    let h = harness(common::config(&endpoint), MockIdp::default());

    let missing = verify(&h, get("/auth/verify").body(Body::empty()).unwrap()).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.body["error"], json!("token_missing"));

    let malformed = verify(
        &h,
        get("/auth/verify")
            .header("authorization", "Bearer not.a.jwt")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(malformed.body["error"], json!("token_malformed"));

    let minter = TokenMinter::new(SIGNING_SECRET.as_bytes(), "keyway", 60);
    let (expired, _) = minter
        .mint_at(&identity(), None, None, Utc::now() - Duration::hours(1))
        .unwrap();
    let expired = verify(
        &h,
        get(&format!("/auth/verify?token={expired}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(expired.body["error"], json!("token_expired"));

    let forged = TokenMinter::new(b"another-secret-another-secret-000", "keyway", 60);
    let (forged, _) = forged.mint(&identity(), None, None).unwrap();
    let forged = verify(
        &h,
        get("/auth/verify")
            .header("cookie", format!("keyway_token={forged}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(forged.body["error"], json!("token_signature_invalid"));

    let foreign = TokenMinter::new(SIGNING_SECRET.as_bytes(), "someone-else", 60);
    let (foreign, _) = foreign.mint(&identity(), None, None).unwrap();
    let foreign = verify(
        &h,
        get("/auth/verify")
            .header("authorization", format!("Bearer {foreign}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(foreign.body["error"], json!("token_invalid_issuer"));
}

#[tokio::test]
async fn verify_and_me_accept_cookie_token() {
    let (endpoint, _) = spawn_product(StatusCode::OK).await;
    let h = harness(common::config(&endpoint), MockIdp::default());
    let (token, _) = h.state.minter.mint(&identity(), None, None).unwrap();

    let ok = verify(
        &h,
        get("/auth/verify")
            .header("cookie", format!("keyway_token={token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["valid"], json!(true));
    assert_eq!(ok.body["claims"]["sub"], json!("auth0|7"));

    let me = verify(
        &h,
        get("/auth/me")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["roles"], json!(["viewer"]));

    let anonymous = verify(&h, get("/auth/me").body(Body::empty()).unwrap()).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn product_scoped_token_is_not_a_broker_credential() {
    let (endpoint, _) = spawn_product(StatusCode::OK).await;
    let h = harness(common::config(&endpoint), MockIdp::default());
    let (scoped, _) = h
        .state
        .minter
        .mint(&identity(), Some("productB"), Some("productB"))
        .unwrap();
    let bearer = format!("Bearer {scoped}");

    let broker = verify(
        &h,
        get("/auth/verify")
            .header("authorization", &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(broker.status, StatusCode::UNAUTHORIZED);
    assert_eq!(broker.body["error"], json!("token_invalid_audience"));

    let me = verify(
        &h,
        get("/auth/me")
            .header("authorization", &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);

    let own = verify(
        &h,
        get("/auth/verify?audience=productB")
            .header("authorization", &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.body["claims"]["aud"], json!("productB"));

    let other = verify(
        &h,
        get("/auth/verify?audience=productA")
            .header("authorization", &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(other.body["error"], json!("token_invalid_audience"));
}

#[tokio::test]
async fn health_reports_version() {
    let (endpoint, _) = spawn_product(StatusCode::OK).await;
    let h = harness(common::config(&endpoint), MockIdp::default());

    let reply = h.get("/health", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], json!("ok"));
    assert_eq!(reply.body["version"], json!(keyway_core::version()));
}
