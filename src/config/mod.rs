//! Authentication configuration types.
//!
//! This module defines the engine's configuration including:
//! - Static key (base64 HMAC secret or PEM public key) and JWK URL support
//! - Explicit signing-algorithm override with family inference otherwise
//! - Token carrier lists (headers, query parameters, cookies)
//! - User-claim candidates and meta claim projection rules
//! - Issuer/audience whitelists and claim-value predicates
//!
//! # Key material
//!
//! Exactly one key source must be configured: either `sign_key` (static)
//! or `jwk_urls` (dynamic). `sign_key` is tried as a standard-base64
//! HMAC secret first and as a PEM public key otherwise.
//!
//! # Validation
//!
//! [`AuthConfig::validate()`] is idempotent and independent of request
//! handling; hosts should call it (or [`Authenticator::new`]) at startup
//! so misconfiguration fails before the first request.
//!
//! [`Authenticator::new`]: crate::auth::Authenticator::new

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::keys::StaticKey;
use crate::error::AuthError;

/// Signing algorithms accepted as an explicit `sign_alg` override.
pub const SUPPORTED_ALGORITHMS: &[&str] = &[
    "HS256", "HS384", "HS512", "RS256", "RS384", "RS512", "ES256", "ES384",
];

/// Header searched when no carrier list is configured at all.
pub const DEFAULT_TOKEN_HEADER: &str = "Authorization";

/// Claim used to resolve the user ID when `user_claims` is empty.
pub const DEFAULT_USER_CLAIM: &str = "sub";

fn default_jwk_refresh_interval_secs() -> u64 {
    3600
}

fn default_jwk_fetch_timeout_secs() -> u64 {
    30
}

/// Authentication engine configuration.
///
/// Immutable after validation. See the [module-level documentation](self)
/// for key resolution and validation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static key material: a standard-base64 HMAC secret or a PEM
    /// public key. Mutually exclusive with `jwk_urls`.
    pub sign_key: String,
    /// Explicit signing algorithm. Inferred from the key shape when
    /// absent (symmetric -> HMAC family, PEM -> RSA/EC family).
    pub sign_alg: Option<String>,
    /// URLs each serving a JWK or JWK Set for dynamic key validation.
    pub jwk_urls: Vec<String>,
    /// JWK cache refresh interval in seconds (default: 3600).
    pub jwk_refresh_interval_secs: u64,
    /// Per-fetch timeout in seconds for JWK endpoints (default: 30).
    pub jwk_fetch_timeout_secs: u64,
    /// Header names searched for the token, in order. The `Bearer `
    /// prefix is stripped from header values only.
    pub from_header: Vec<String>,
    /// Query parameter names searched after headers, in order.
    pub from_query: Vec<String>,
    /// Cookie names searched after query parameters, in order.
    pub from_cookies: Vec<String>,
    /// Candidate claims for the user ID, scanned in order (default: sub).
    pub user_claims: Vec<String>,
    /// Claim dot-path -> metadata key projection rules.
    pub meta_claims: HashMap<String, String>,
    /// Accepted `iss` values (exact, case-sensitive). Empty = no check.
    pub issuer_whitelist: Vec<String>,
    /// Accepted `aud` values; a list-typed audience passes when any
    /// element matches. Empty = no check.
    pub audience_whitelist: Vec<String>,
    /// Claim name -> required string value. String claims are compared
    /// case-insensitively; list claims pass on any matching element.
    pub verify_claims: HashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            sign_key: String::new(),
            sign_alg: None,
            jwk_urls: Vec::new(),
            jwk_refresh_interval_secs: default_jwk_refresh_interval_secs(),
            jwk_fetch_timeout_secs: default_jwk_fetch_timeout_secs(),
            from_header: Vec::new(),
            from_query: Vec::new(),
            from_cookies: Vec::new(),
            user_claims: Vec::new(),
            meta_claims: HashMap::new(),
            issuer_whitelist: Vec::new(),
            audience_whitelist: Vec::new(),
            verify_claims: HashMap::new(),
        }
    }
}

impl AuthConfig {
    /// True when key material comes from JWK endpoints rather than a
    /// static key.
    pub fn using_jwk(&self) -> bool {
        !self.jwk_urls.is_empty()
    }

    /// Check internal consistency. Fails fast at setup time rather than
    /// at first request; network-backed checks (the initial JWK fetch)
    /// happen in [`Authenticator::new`].
    ///
    /// [`Authenticator::new`]: crate::auth::Authenticator::new
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.sign_key.is_empty() && !self.using_jwk() {
            return Err(AuthError::MissingKeys);
        }

        if let Some(alg) = self.sign_alg.as_deref() {
            if !SUPPORTED_ALGORITHMS.contains(&alg) {
                return Err(AuthError::InvalidSignAlgorithm(alg.to_string()));
            }
        }

        // Static keys must parse now, not on the first request.
        if !self.sign_key.is_empty() {
            StaticKey::parse(&self.sign_key, self.sign_alg.as_deref())?;
        }

        let mut destinations: Vec<&str> = Vec::with_capacity(self.meta_claims.len());
        for (source, destination) in &self.meta_claims {
            if destination.is_empty() {
                return Err(AuthError::InvalidMetaClaim(source.clone()));
            }
            if destinations.contains(&destination.as_str()) {
                return Err(AuthError::InvalidMetaClaim(format!(
                    "{} (duplicate destination {:?})",
                    source, destination
                )));
            }
            destinations.push(destination);
        }

        Ok(())
    }

    /// Header names to search, falling back to the default carrier when
    /// no list is configured.
    pub fn header_names(&self) -> Vec<String> {
        if self.from_header.is_empty() && self.from_query.is_empty() && self.from_cookies.is_empty()
        {
            vec![DEFAULT_TOKEN_HEADER.to_string()]
        } else {
            self.from_header.clone()
        }
    }

    /// User-claim candidates, defaulting to the standard subject claim.
    pub fn user_claim_names(&self) -> Vec<String> {
        if self.user_claims.is_empty() {
            vec![DEFAULT_USER_CLAIM.to_string()]
        } else {
            self.user_claims.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Base64 of "NFL5*0Bc#9U6E@tnmC&E7SUN6GwHfLmY"
    const TEST_SIGN_KEY: &str = "TkZMNSowQmMjOVU2RUB0bm1DJkU3U1VONkd3SGZMbVk=";

    #[test]
    fn test_validate_missing_keys() {
        let config = AuthConfig::default();
        assert!(matches!(config.validate(), Err(AuthError::MissingKeys)));
    }

    #[test]
    fn test_validate_with_sign_key() {
        let config = AuthConfig {
            sign_key: TEST_SIGN_KEY.to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_is_idempotent() {
        let config = AuthConfig {
            sign_key: TEST_SIGN_KEY.to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_sign_alg() {
        let config = AuthConfig {
            sign_key: TEST_SIGN_KEY.to_string(),
            sign_alg: Some("ABC".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidSignAlgorithm(alg)) if alg == "ABC"
        ));
    }

    #[test]
    fn test_validate_jwk_urls_satisfy_key_requirement() {
        let config = AuthConfig {
            jwk_urls: vec!["https://auth.example.com/keys".to_string()],
            ..Default::default()
        };
        assert!(config.using_jwk());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_meta_claims() {
        let config = AuthConfig {
            sign_key: TEST_SIGN_KEY.to_string(),
            meta_claims: [("IsAdmin".to_string(), "".to_string())].into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid meta claim"));
    }

    #[test]
    fn test_validate_duplicate_meta_claim_destination() {
        let config = AuthConfig {
            sign_key: TEST_SIGN_KEY.to_string(),
            meta_claims: [
                ("settings.role".to_string(), "role".to_string()),
                ("role".to_string(), "role".to_string()),
            ]
            .into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid meta claim"));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_invalid_public_key() {
        let config = AuthConfig {
            sign_key: "-----BEGIN PUBLIC KEY-----\nMIIBIjANBgkqhkiG9w0BAQEFAA ... invalid\n-----END PUBLIC KEY-----".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidPublicKey)
        ));
    }

    #[test]
    fn test_header_names_default_when_no_carrier_configured() {
        let config = AuthConfig::default();
        assert_eq!(config.header_names(), vec!["Authorization".to_string()]);
    }

    #[test]
    fn test_header_names_empty_when_other_carriers_configured() {
        let config = AuthConfig {
            from_query: vec!["access_token".to_string()],
            ..Default::default()
        };
        assert!(config.header_names().is_empty());
    }

    #[test]
    fn test_user_claim_names_default() {
        let config = AuthConfig::default();
        assert_eq!(config.user_claim_names(), vec!["sub".to_string()]);

        let config = AuthConfig {
            user_claims: vec!["user_id".to_string(), "uid".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.user_claim_names(),
            vec!["user_id".to_string(), "uid".to_string()]
        );
    }

    #[test]
    fn test_config_minimal_yaml() {
        let yaml = r#"
sign_key: "TkZMNSowQmMjOVU2RUB0bm1DJkU3U1VONkd3SGZMbVk="
"#;
        let config: AuthConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.sign_key, TEST_SIGN_KEY);
        assert!(config.sign_alg.is_none());
        assert!(config.jwk_urls.is_empty());
        assert_eq!(config.jwk_refresh_interval_secs, 3600);
        assert_eq!(config.jwk_fetch_timeout_secs, 30);
        assert!(config.from_header.is_empty());
        assert!(config.meta_claims.is_empty());
    }

    #[test]
    fn test_config_full_yaml() {
        let yaml = r#"
sign_key: "TkZMNSowQmMjOVU2RUB0bm1DJkU3U1VONkd3SGZMbVk="
sign_alg: "HS256"
from_header: ["X-Api-Token"]
from_query: ["access_token", "token"]
from_cookies: ["user_session"]
user_claims: ["user_id", "uid"]
meta_claims:
  "settings.role": "role"
  "IsAdmin": "is_admin"
issuer_whitelist:
  - "https://api.example.com"
audience_whitelist:
  - "https://api.codelet.io"
verify_claims:
  role: "test"
"#;
        let config: AuthConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.sign_alg.as_deref(), Some("HS256"));
        assert_eq!(config.from_query, vec!["access_token", "token"]);
        assert_eq!(config.from_cookies, vec!["user_session"]);
        assert_eq!(config.user_claims, vec!["user_id", "uid"]);
        assert_eq!(config.meta_claims["settings.role"], "role");
        assert_eq!(config.issuer_whitelist, vec!["https://api.example.com"]);
        assert_eq!(config.verify_claims["role"], "test");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_jwk_yaml() {
        let yaml = r#"
jwk_urls:
  - "https://auth.example.com/.well-known/jwks.json"
jwk_refresh_interval_secs: 1800
"#;
        let config: AuthConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(
            config.jwk_urls,
            vec!["https://auth.example.com/.well-known/jwks.json".to_string()]
        );
        assert_eq!(config.jwk_refresh_interval_secs, 1800);
    }
}
