//! Broker domain models.
//!
//! `IdentityClaims` is what the identity provider asserts about a user;
//! `InternalClaims` is the payload of the broker-signed token derived from it.

use serde::{Deserialize, Serialize};

/// Identity facts as received from the IdP. Never mutated by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaims {
    /// IdP subject identifier.
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// JWT claims embedded in broker-issued tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalClaims {
    /// IdP user ID (standard JWT `sub` claim).
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    /// Product the login was initiated for, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Always the broker's own identity.
    pub iss: String,
    /// Set only on product-scoped handoff tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Unique token id; makes every issuance distinct.
    pub jti: String,
}

impl InternalClaims {
    /// The identity subset of these claims, as originally projected.
    pub fn identity(&self) -> IdentityClaims {
        IdentityClaims {
            sub: self.sub.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
            roles: self.roles.clone(),
            permissions: self.permissions.clone(),
        }
    }

    /// Placeholder role check. Not an authorization engine.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> InternalClaims {
        InternalClaims {
            sub: "auth0|42".into(),
            email: Some("ada@example.com".into()),
            name: Some("Ada".into()),
            picture: None,
            roles: vec!["admin".into()],
            permissions: vec!["read:reports".into()],
            product_id: None,
            iss: "https://sso.example.com".into(),
            aud: None,
            iat: 1_700_000_000,
            exp: 1_700_086_400,
            jti: "jti-1".into(),
        }
    }

    #[test]
    fn serializes_camel_case_and_skips_empty_optionals() {
        let json = serde_json::to_value(claims()).unwrap();
        assert!(json.get("productId").is_none());
        assert!(json.get("aud").is_none());
        assert_eq!(json["sub"], "auth0|42");
        assert_eq!(json["roles"][0], "admin");
    }

    #[test]
    fn has_role_matches_exactly() {
        let c = claims();
        assert!(c.has_role("admin"));
        assert!(!c.has_role("adm"));
    }

    #[test]
    fn identity_returns_projected_subset() {
        let identity = claims().identity();
        assert_eq!(identity.sub, "auth0|42");
        assert_eq!(identity.permissions, vec!["read:reports".to_string()]);
    }
}
