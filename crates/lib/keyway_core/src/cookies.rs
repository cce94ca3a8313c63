//! Cookie scope policy.
//!
//! Decides which cookie names go under which (domain, path, flags) scopes.
//! Rendering to `Set-Cookie` headers lives in the API crate; this module is
//! pure so the policy can be reasoned about and tested on its own.
//!
//! Browsers only honour a clear request whose domain/path match the cookie
//! being cleared, so clearing always reuses the scope a cookie was set with.

use crate::config::{BrokerConfig, DeliveryMode, ProductConfig};

/// Cookie carrying the token, unreadable from scripts.
pub const TOKEN_COOKIE: &str = "keyway_token";
/// Client-readable copy of the token for products that need it in JS.
pub const CLIENT_TOKEN_COOKIE: &str = "keyway_token_client";
/// Broker browser-session identifier.
pub const SESSION_COOKIE: &str = "keyway_sid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

/// Whether scripts on the page may read the cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    HttpOnly,
    Client,
}

/// The (domain, path, flags) tuple a cookie is attached under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieScope {
    /// `None` is a host-only cookie (no `Domain` attribute).
    pub domain: Option<String>,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSitePolicy,
    pub max_age_secs: i64,
}

/// A single cookie write: name plus the scope it goes under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePlacement {
    pub name: String,
    pub scope: CookieScope,
}

/// Static cookie policy derived from configuration.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    root_domain: Option<String>,
    secure: bool,
    token_max_age_secs: i64,
    session_max_age_secs: i64,
    products: Vec<ProductCookies>,
}

#[derive(Debug, Clone)]
struct ProductCookies {
    id: String,
    domain: Option<String>,
    client_cookie: bool,
    aliases: Vec<String>,
    direct: bool,
}

impl CookiePolicy {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(
            config.cookies.root_domain.clone(),
            config.cookies.secure,
            config.token_ttl_secs,
            config.session_ttl_secs,
            &config.products,
        )
    }

    pub fn new(
        root_domain: Option<String>,
        secure: bool,
        token_max_age_secs: i64,
        session_max_age_secs: i64,
        products: &[ProductConfig],
    ) -> Self {
        Self {
            root_domain,
            secure,
            token_max_age_secs,
            session_max_age_secs,
            products: products
                .iter()
                .map(|p| ProductCookies {
                    id: p.id.clone(),
                    domain: p.cookie_domain.clone(),
                    client_cookie: p.client_cookie,
                    aliases: p.cookie_aliases.clone(),
                    direct: p.delivery == DeliveryMode::Direct,
                })
                .collect(),
        }
    }

    /// Token scope for `domain` with the given visibility.
    ///
    /// Production scopes are `SameSite=None; Secure` because products on
    /// other registrable domains read them; development falls back to
    /// `Lax` without `Secure` so plain-http localhost works.
    pub fn scope(&self, domain: Option<&str>, visibility: Visibility) -> CookieScope {
        CookieScope {
            domain: domain.map(str::to_string),
            path: "/".into(),
            http_only: visibility == Visibility::HttpOnly,
            secure: self.secure,
            same_site: if self.secure {
                SameSitePolicy::None
            } else {
                SameSitePolicy::Lax
            },
            max_age_secs: self.token_max_age_secs,
        }
    }

    /// The http-only and client-readable scope pair for one domain.
    pub fn scopes_for(&self, domain: Option<&str>) -> [CookieScope; 2] {
        [
            self.scope(domain, Visibility::HttpOnly),
            self.scope(domain, Visibility::Client),
        ]
    }

    /// Session cookie scope: host-only on the broker, never cross-site.
    pub fn session_scope(&self) -> CookieScope {
        CookieScope {
            domain: None,
            path: "/".into(),
            http_only: true,
            secure: self.secure,
            same_site: SameSitePolicy::Lax,
            max_age_secs: self.session_max_age_secs,
        }
    }

    /// Every domain this broker may have written a token cookie on:
    /// root, each product domain, and the host-only fallback, deduplicated.
    pub fn known_domains(&self) -> Vec<Option<String>> {
        let mut domains: Vec<Option<String>> = Vec::new();
        let candidates = self
            .root_domain
            .iter()
            .chain(self.products.iter().filter_map(|p| p.domain.as_ref()))
            .cloned()
            .map(Some)
            .chain(std::iter::once(None));
        for d in candidates {
            if !domains.contains(&d) {
                domains.push(d);
            }
        }
        domains
    }

    /// Every scope across every known domain.
    pub fn all_scopes(&self) -> Vec<CookieScope> {
        self.known_domains()
            .iter()
            .flat_map(|d| self.scopes_for(d.as_deref()))
            .collect()
    }

    /// Every token cookie name ever issued: base names plus product aliases.
    pub fn all_names(&self) -> Vec<String> {
        let mut names = vec![TOKEN_COOKIE.to_string(), CLIENT_TOKEN_COOKIE.to_string()];
        for alias in self.products.iter().flat_map(|p| p.aliases.iter()) {
            if !names.contains(alias) {
                names.push(alias.clone());
            }
        }
        names
    }

    /// Cookies to write after a successful login.
    ///
    /// The root (or host-only) http-only token cookie is always written.
    /// A direct-delivery product with its own domain additionally gets the
    /// token under its http-only scope (base name and aliases) and, when it
    /// opted in, a client-readable copy.
    pub fn login_placements(&self, product_id: Option<&str>) -> Vec<CookiePlacement> {
        let root = self.root_domain.as_deref();
        let mut placements = vec![CookiePlacement {
            name: TOKEN_COOKIE.into(),
            scope: self.scope(root, Visibility::HttpOnly),
        }];

        let Some(product) = product_id.and_then(|id| self.products.iter().find(|p| p.id == id))
        else {
            return placements;
        };
        if !product.direct {
            return placements;
        }

        let domain = product.domain.as_deref().or(root);
        for name in std::iter::once(TOKEN_COOKIE).chain(product.aliases.iter().map(String::as_str))
        {
            let placement = CookiePlacement {
                name: name.to_string(),
                scope: self.scope(domain, Visibility::HttpOnly),
            };
            if !placements.contains(&placement) {
                placements.push(placement);
            }
        }
        if product.client_cookie {
            placements.push(CookiePlacement {
                name: CLIENT_TOKEN_COOKIE.into(),
                scope: self.scope(domain, Visibility::Client),
            });
        }
        placements
    }

    /// Cookies to clear on logout: every name under every scope.
    pub fn logout_placements(&self) -> Vec<CookiePlacement> {
        let names = self.all_names();
        self.all_scopes()
            .into_iter()
            .flat_map(|scope| {
                names.iter().map(move |name| CookiePlacement {
                    name: name.clone(),
                    scope: scope.clone(),
                })
            })
            .collect()
    }
}
