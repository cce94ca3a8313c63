//! Redirect target validation and query building.

use thiserror::Error;
use url::Url;

/// Reasons a `returnTo` value is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedirectError {
    #[error("returnTo must be an absolute URL: {0}")]
    NotAbsolute(String),

    #[error("returnTo scheme must be http or https")]
    Scheme,

    #[error("returnTo host is not allowed: {0}")]
    HostNotAllowed(String),
}

/// Validate a caller-supplied `returnTo`.
///
/// The value must parse as an absolute `http`/`https` URL. When
/// `allowed_hosts` is non-empty the host must match one of its entries
/// exactly or be a subdomain of one.
pub fn validate_return_to(raw: &str, allowed_hosts: &[String]) -> Result<Url, RedirectError> {
    let url = Url::parse(raw).map_err(|e| RedirectError::NotAbsolute(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RedirectError::Scheme);
    }
    let host = url
        .host_str()
        .ok_or_else(|| RedirectError::NotAbsolute(raw.to_string()))?
        .to_ascii_lowercase();
    if allowed_hosts.is_empty() || allowed_hosts.iter().any(|h| host_matches(&host, h)) {
        Ok(url)
    } else {
        Err(RedirectError::HostNotAllowed(host))
    }
}

fn host_matches(host: &str, allowed: &str) -> bool {
    let allowed = allowed.trim_start_matches('.').to_ascii_lowercase();
    host == allowed || host.ends_with(&format!(".{allowed}"))
}

/// Return `base` with `key=value` appended to its query string.
pub fn with_query_param(base: &Url, key: &str, value: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair(key, value);
    url
}
