//! Cookie rendering: turns core cookie scopes into `Set-Cookie` headers.
//!
//! The same name is routinely written under several domains in one response,
//! so cookies are appended as individual headers rather than through a
//! name-keyed jar.

use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use keyway_core::cookies::{CookiePolicy, CookieScope, SESSION_COOKIE, SameSitePolicy};
use time::{Duration, OffsetDateTime};
use tracing::error;
use url::Url;

fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Strict => SameSite::Strict,
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::None => SameSite::None,
    }
}

fn scoped(name: &str, value: String, scope: &CookieScope) -> Cookie<'static> {
    let mut cookie = Cookie::build((name.to_string(), value))
        .path(scope.path.clone())
        .http_only(scope.http_only)
        .secure(scope.secure)
        .same_site(same_site(scope.same_site))
        .build();
    if let Some(domain) = &scope.domain {
        cookie.set_domain(domain.clone());
    }
    cookie
}

/// Build a cookie carrying `value` under `scope`.
pub fn set_cookie(name: &str, value: &str, scope: &CookieScope) -> Cookie<'static> {
    let mut cookie = scoped(name, value.to_string(), scope);
    cookie.set_max_age(Duration::seconds(scope.max_age_secs));
    cookie
}

/// Build the expiring counterpart of [`set_cookie`] for the same scope.
pub fn clear_cookie(name: &str, scope: &CookieScope) -> Cookie<'static> {
    let mut cookie = scoped(name, String::new(), scope);
    cookie.set_max_age(Duration::ZERO);
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}

/// Broker session cookie.
pub fn session_cookie(policy: &CookiePolicy, session_id: &str) -> Cookie<'static> {
    set_cookie(SESSION_COOKIE, session_id, &policy.session_scope())
}

pub fn clear_session_cookie(policy: &CookiePolicy) -> Cookie<'static> {
    clear_cookie(SESSION_COOKIE, &policy.session_scope())
}

/// Read a cookie value from the request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Append each cookie as its own `Set-Cookie` header.
pub fn append_cookies(headers: &mut HeaderMap, cookies: &[Cookie<'static>]) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => error!(name = cookie.name(), error = %e, "unencodable cookie dropped"),
        }
    }
}

/// A `302 Found` to `location` that also writes `cookies`.
#[derive(Debug, Clone)]
pub struct RedirectWithCookies {
    pub location: Url,
    pub cookies: Vec<Cookie<'static>>,
}

impl RedirectWithCookies {
    pub fn to(location: Url) -> Self {
        Self {
            location,
            cookies: Vec::new(),
        }
    }

    pub fn with_cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies.push(cookie);
        self
    }
}

impl IntoResponse for RedirectWithCookies {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(self.location.as_str()) {
            Ok(location) => {
                headers.insert(LOCATION, location);
            }
            Err(e) => {
                error!(error = %e, "redirect location is not a valid header value");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
        append_cookies(&mut headers, &self.cookies);
        (StatusCode::FOUND, headers).into_response()
    }
}
