//! Broker configuration.
//!
//! Built once at startup and injected into every component. Missing or
//! invalid values are fatal: they surface as [`ConfigError`] before the
//! listener binds.

use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::auth::jwt::{DEFAULT_TOKEN_TTL_SECS, MIN_SECRET_LEN};

/// Upper bound for token and session lifetimes: one year.
pub const MAX_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// Upper bound for outbound call timeouts.
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("Product registry: {0}")]
    Products(String),
}

/// How a product receives the credential after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    /// Cookie on a shared domain plus `?token=` on the product callback.
    Direct,
    /// Server-to-server session establishment; browser only sees `?code=`.
    BackChannel,
}

/// One product the broker can deliver credentials to.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductConfig {
    pub id: String,
    pub delivery: DeliveryMode,
    /// Browser-facing callback (`/auth/sso-callback` or `/auth/callback`).
    pub callback_url: Url,
    /// Cookie domain for direct delivery, without a leading dot.
    #[serde(default)]
    pub cookie_domain: Option<String>,
    /// Also set a client-readable copy of the token on this product's domain.
    #[serde(default)]
    pub client_cookie: bool,
    /// Extra cookie names this product reads the token from.
    #[serde(default)]
    pub cookie_aliases: Vec<String>,
    /// Back-channel session establishment endpoint.
    #[serde(default)]
    pub session_endpoint: Option<Url>,
    /// Pre-shared broker-to-product secret for the back channel.
    #[serde(default)]
    pub shared_secret: Option<String>,
}

impl fmt::Debug for ProductConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductConfig")
            .field("id", &self.id)
            .field("delivery", &self.delivery)
            .field("callback_url", &self.callback_url.as_str())
            .field("cookie_domain", &self.cookie_domain)
            .field("client_cookie", &self.client_cookie)
            .field("cookie_aliases", &self.cookie_aliases)
            .field("session_endpoint", &self.session_endpoint.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ProductRegistry {
    products: Vec<ProductConfig>,
}

/// Parse and validate a YAML product registry.
///
/// ```yaml
/// products:
///   - id: productA
///     delivery: direct
///     callbackUrl: https://a.example/auth/sso-callback
///     cookieDomain: a.example
///   - id: productB
///     delivery: back-channel
///     callbackUrl: https://b.example/auth/callback
///     sessionEndpoint: https://b.example/internal/sso/session
///     sharedSecret: change-me
/// ```
pub fn parse_products(yaml: &str) -> Result<Vec<ProductConfig>, ConfigError> {
    let registry: ProductRegistry =
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Products(e.to_string()))?;

    let mut products = registry.products;
    for (i, product) in products.iter_mut().enumerate() {
        if product.id.trim().is_empty() {
            return Err(ConfigError::Products(format!("product #{i} has an empty id")));
        }
        if let Some(domain) = product.cookie_domain.take() {
            product.cookie_domain = Some(normalize_domain(&domain));
        }
        if product.delivery == DeliveryMode::BackChannel {
            if product.session_endpoint.is_none() {
                return Err(ConfigError::Products(format!(
                    "{} uses back-channel delivery but has no sessionEndpoint",
                    product.id
                )));
            }
            if product.shared_secret.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::Products(format!(
                    "{} uses back-channel delivery but has no sharedSecret",
                    product.id
                )));
            }
        }
    }
    for (i, product) in products.iter().enumerate() {
        if products[..i].iter().any(|p| p.id == product.id) {
            return Err(ConfigError::Products(format!("duplicate product id {}", product.id)));
        }
    }
    Ok(products)
}

/// Cookie domains are stored without a leading dot and lower-cased.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// OpenID Connect client settings.
#[derive(Clone)]
pub struct OidcConfig {
    pub issuer_url: Url,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: Url,
    pub token_url: Url,
    pub userinfo_url: Url,
    /// Federated logout endpoint; `None` disables federated logout.
    pub end_session_url: Option<Url>,
    pub scopes: Vec<String>,
    /// Userinfo claim carrying roles (custom namespaced claims are common).
    pub roles_claim: String,
    pub permissions_claim: String,
}

impl fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcConfig")
            .field("issuer_url", &self.issuer_url.as_str())
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Cookie emission settings.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// Root domain shared by the broker and co-hosted products. `None` means
    /// host-only cookies (local development).
    pub root_domain: Option<String>,
    /// Production mode: `Secure` + `SameSite=None` on every token scope.
    pub secure: bool,
}

/// Complete broker configuration.
#[derive(Clone)]
pub struct BrokerConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3200").
    pub bind_addr: String,
    pub signing_secret: String,
    pub issuer: String,
    pub token_ttl_secs: i64,
    /// Pre-registered IdP redirect URI pointing at `/auth/callback`.
    pub callback_url: Url,
    pub default_redirect: Url,
    pub error_redirect: Url,
    pub cookies: CookieSettings,
    pub session_ttl_secs: i64,
    pub handoff_timeout: Duration,
    pub idp_timeout: Duration,
    pub allowed_redirect_hosts: Vec<String>,
    pub products: Vec<ProductConfig>,
    pub oidc: OidcConfig,
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("issuer", &self.issuer)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("callback_url", &self.callback_url.as_str())
            .field("cookies", &self.cookies)
            .field("products", &self.products)
            .field("oidc", &self.oidc)
            .finish_non_exhaustive()
    }
}

impl BrokerConfig {
    /// Reads configuration from process environment variables.
    ///
    /// | Variable                        | Default                          |
    /// |---------------------------------|----------------------------------|
    /// | `BIND_ADDR`                     | `127.0.0.1:3200`                 |
    /// | `KEYWAY_SIGNING_SECRET`         | required, at least 32 bytes      |
    /// | `KEYWAY_ISSUER`                 | `keyway`                         |
    /// | `KEYWAY_TOKEN_TTL_SECS`         | `86400`                          |
    /// | `KEYWAY_CALLBACK_URL`           | required                         |
    /// | `KEYWAY_DEFAULT_REDIRECT`       | origin of the callback URL       |
    /// | `KEYWAY_ERROR_REDIRECT`         | default redirect                 |
    /// | `KEYWAY_ROOT_DOMAIN`            | unset (host-only cookies)        |
    /// | `KEYWAY_SECURE_COOKIES`         | `true`                           |
    /// | `KEYWAY_SESSION_TTL_SECS`       | `86400`                          |
    /// | `KEYWAY_HANDOFF_TIMEOUT_SECS`   | `5`                              |
    /// | `KEYWAY_IDP_TIMEOUT_SECS`       | `10`                             |
    /// | `KEYWAY_ALLOWED_REDIRECT_HOSTS` | unset (any absolute URL)         |
    /// | `KEYWAY_PRODUCTS_FILE`          | unset (no products)              |
    /// | `OIDC_ISSUER_URL`               | required                         |
    /// | `OIDC_CLIENT_ID`                | required                         |
    /// | `OIDC_CLIENT_SECRET`            | required                         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let signing_secret =
            get("KEYWAY_SIGNING_SECRET").ok_or(ConfigError::Missing("KEYWAY_SIGNING_SECRET"))?;
        if signing_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                var: "KEYWAY_SIGNING_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }

        let callback_url = parse_url(
            "KEYWAY_CALLBACK_URL",
            get("KEYWAY_CALLBACK_URL").ok_or(ConfigError::Missing("KEYWAY_CALLBACK_URL"))?,
        )?;
        let default_redirect = match get("KEYWAY_DEFAULT_REDIRECT") {
            Some(v) => parse_url("KEYWAY_DEFAULT_REDIRECT", v)?,
            None => {
                let mut origin = callback_url.clone();
                origin.set_path("/");
                origin.set_query(None);
                origin
            }
        };
        let error_redirect = match get("KEYWAY_ERROR_REDIRECT") {
            Some(v) => parse_url("KEYWAY_ERROR_REDIRECT", v)?,
            None => default_redirect.clone(),
        };

        let products = match get("KEYWAY_PRODUCTS_FILE") {
            Some(path) => load_products(Path::new(&path))?,
            None => Vec::new(),
        };

        let mut issuer_url = parse_url(
            "OIDC_ISSUER_URL",
            get("OIDC_ISSUER_URL").ok_or(ConfigError::Missing("OIDC_ISSUER_URL"))?,
        )?;
        // Endpoint defaults are joined relative to the issuer.
        if !issuer_url.path().ends_with('/') {
            let path = format!("{}/", issuer_url.path());
            issuer_url.set_path(&path);
        }
        let endpoint = |var: &'static str, path: &str| -> Result<Url, ConfigError> {
            match get(var) {
                Some(v) => parse_url(var, v),
                None => issuer_url.join(path).map_err(|e| ConfigError::Invalid {
                    var,
                    reason: e.to_string(),
                }),
            }
        };
        let oidc = OidcConfig {
            client_id: get("OIDC_CLIENT_ID").ok_or(ConfigError::Missing("OIDC_CLIENT_ID"))?,
            client_secret: get("OIDC_CLIENT_SECRET")
                .ok_or(ConfigError::Missing("OIDC_CLIENT_SECRET"))?,
            authorize_url: endpoint("OIDC_AUTHORIZE_URL", "authorize")?,
            token_url: endpoint("OIDC_TOKEN_URL", "oauth/token")?,
            userinfo_url: endpoint("OIDC_USERINFO_URL", "userinfo")?,
            end_session_url: Some(endpoint("OIDC_END_SESSION_URL", "v2/logout")?),
            scopes: get("OIDC_SCOPES")
                .map(|s| split_list(&s))
                .unwrap_or_else(|| vec!["openid".into(), "profile".into(), "email".into()]),
            roles_claim: get("OIDC_ROLES_CLAIM").unwrap_or_else(|| "roles".into()),
            permissions_claim: get("OIDC_PERMISSIONS_CLAIM")
                .unwrap_or_else(|| "permissions".into()),
            issuer_url,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3200".into()),
            signing_secret,
            issuer: get("KEYWAY_ISSUER").unwrap_or_else(|| "keyway".into()),
            token_ttl_secs: parse_bounded(
                "KEYWAY_TOKEN_TTL_SECS",
                get("KEYWAY_TOKEN_TTL_SECS"),
                DEFAULT_TOKEN_TTL_SECS,
                1..=MAX_TTL_SECS,
            )?,
            callback_url,
            default_redirect,
            error_redirect,
            cookies: CookieSettings {
                root_domain: get("KEYWAY_ROOT_DOMAIN").map(|d| normalize_domain(&d)),
                secure: parse_bool("KEYWAY_SECURE_COOKIES", get("KEYWAY_SECURE_COOKIES"), true)?,
            },
            session_ttl_secs: parse_bounded(
                "KEYWAY_SESSION_TTL_SECS",
                get("KEYWAY_SESSION_TTL_SECS"),
                24 * 60 * 60,
                1..=MAX_TTL_SECS,
            )?,
            handoff_timeout: Duration::from_secs(parse_bounded(
                "KEYWAY_HANDOFF_TIMEOUT_SECS",
                get("KEYWAY_HANDOFF_TIMEOUT_SECS"),
                5,
                1..=MAX_TIMEOUT_SECS,
            )?),
            idp_timeout: Duration::from_secs(parse_bounded(
                "KEYWAY_IDP_TIMEOUT_SECS",
                get("KEYWAY_IDP_TIMEOUT_SECS"),
                10,
                1..=MAX_TIMEOUT_SECS,
            )?),
            allowed_redirect_hosts: get("KEYWAY_ALLOWED_REDIRECT_HOSTS")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            products,
            oidc,
        })
    }

    /// Look up a configured product by id.
    pub fn product(&self, id: &str) -> Option<&ProductConfig> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Hosts a `returnTo` may point at. Empty means "any absolute URL".
    ///
    /// Product callback hosts are always added to a non-empty allowlist.
    pub fn redirect_allowlist(&self) -> Vec<String> {
        if self.allowed_redirect_hosts.is_empty() {
            return Vec::new();
        }
        let mut hosts = self.allowed_redirect_hosts.clone();
        hosts.extend(
            self.products
                .iter()
                .filter_map(|p| p.callback_url.host_str().map(str::to_string)),
        );
        hosts
    }
}

fn load_products(path: &Path) -> Result<Vec<ProductConfig>, ConfigError> {
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Products(format!("{}: {e}", path.display())))?;
    parse_products(&yaml)
}

fn parse_url(var: &'static str, value: String) -> Result<Url, ConfigError> {
    Url::parse(&value).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn parse_num<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match value {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bounded<T>(
    var: &'static str,
    value: Option<String>,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + fmt::Display,
    T::Err: fmt::Display,
{
    let n = parse_num(var, value, default)?;
    if range.contains(&n) {
        Ok(n)
    } else {
        Err(ConfigError::Invalid {
            var,
            reason: format!("must be between {} and {}, got {n}", range.start(), range.end()),
        })
    }
}

fn parse_bool(var: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes") => Ok(true),
        Some("0" | "false" | "no") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
