// Authentication module

pub mod jwks;
pub mod keys;
pub mod validators;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::claims::ClaimSet;
use crate::config::AuthConfig;
use crate::error::AuthError;
use keys::KeyStore;
use validators::{ClaimMatchesString, ClaimPredicate};

/// The authenticated identity handed to the caller. Never constructed
/// from a partially verified token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    /// Primary identifier, non-empty on success.
    pub id: String,
    /// Flat projection of configured claims; empty string means the
    /// claim was absent or not stringifiable.
    pub metadata: HashMap<String, String>,
}

/// The request-side surface the engine reads tokens from. Header lookup
/// is expected to be case-insensitive, matching HTTP semantics.
pub trait AuthRequest {
    fn header(&self, name: &str) -> Option<String>;
    fn query_param(&self, name: &str) -> Option<String>;
    fn cookie(&self, name: &str) -> Option<String>;
}

/// Ready-made [`AuthRequest`] backed by hash maps, for hosts that have
/// already collected their request data and for tests.
#[derive(Debug, Clone, Default)]
pub struct SimpleRequest {
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl SimpleRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_query_param(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }
}

impl AuthRequest for SimpleRequest {
    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    fn query_param(&self, name: &str) -> Option<String> {
        self.query.get(name).cloned()
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }
}

/// Collect every candidate token in carrier order: headers first, then
/// query parameters, then cookies, each list in configured order.
///
/// Only header values have the `Bearer ` prefix stripped (the header may
/// also carry the bare token). Empty values are skipped. More than one
/// candidate is possible; the engine tries each through verification.
pub fn locate_tokens(
    request: &impl AuthRequest,
    header_names: &[String],
    query_names: &[String],
    cookie_names: &[String],
) -> Vec<String> {
    let mut candidates = Vec::new();

    for name in header_names {
        if let Some(raw) = request.header(name) {
            let raw = raw.trim();
            let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
            if !token.is_empty() {
                candidates.push(token.to_string());
            }
        }
    }
    for name in query_names {
        if let Some(raw) = request.query_param(name) {
            let token = raw.trim();
            if !token.is_empty() {
                candidates.push(token.to_string());
            }
        }
    }
    for name in cookie_names {
        if let Some(raw) = request.cookie(name) {
            let token = raw.trim();
            if !token.is_empty() {
                candidates.push(token.to_string());
            }
        }
    }

    candidates
}

/// Mask the middle of a token before logging it: short tokens (<= 6
/// chars) pass through, otherwise a third of the length (capped at 16)
/// is kept from each end around an ellipsis. Log-scraping tooling
/// depends on this exact shape.
pub fn desensitized_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let size = chars.len();
    if size <= 6 {
        return token.to_string();
    }
    let keep = (size / 3).min(16);
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[size - keep..].iter().collect();
    format!("{}…{}", head, tail)
}

/// The token verification engine.
///
/// Built once per configuration via [`Authenticator::new`], then invoked
/// concurrently from request handlers. The only shared mutable state is
/// the JWK cache inside [`KeyStore`].
pub struct Authenticator {
    header_names: Vec<String>,
    query_names: Vec<String>,
    cookie_names: Vec<String>,
    user_claims: Vec<String>,
    meta_claims: Vec<(String, String)>,
    issuer_whitelist: Vec<String>,
    audience_whitelist: Vec<String>,
    predicates: Vec<Box<dyn ClaimPredicate>>,
    keys: KeyStore,
}

impl Authenticator {
    /// Validate the configuration and resolve key material. For JWK
    /// configurations this performs the initial fetch, so endpoint
    /// misconfiguration fails here rather than on the first request.
    pub async fn new(config: AuthConfig) -> Result<Self, AuthError> {
        config.validate()?;
        let keys = KeyStore::from_config(&config).await?;

        let predicates = config
            .verify_claims
            .iter()
            .map(|(claim, value)| {
                Box::new(ClaimMatchesString {
                    claim: claim.clone(),
                    value: value.clone(),
                }) as Box<dyn ClaimPredicate>
            })
            .collect();

        Ok(Self {
            header_names: config.header_names(),
            query_names: config.from_query.clone(),
            cookie_names: config.from_cookies.clone(),
            user_claims: config.user_claim_names(),
            meta_claims: config.meta_claims.clone().into_iter().collect(),
            issuer_whitelist: config.issuer_whitelist.clone(),
            audience_whitelist: config.audience_whitelist.clone(),
            predicates,
            keys,
        })
    }

    /// Authenticate a request against the current time.
    pub async fn authenticate(&self, request: &impl AuthRequest) -> Result<User, AuthError> {
        self.authenticate_at(request, Utc::now()).await
    }

    /// Authenticate a request against an explicit verification time.
    ///
    /// Candidates are tried in carrier order through full verification;
    /// the first one that verifies wins, so an invalid token in an
    /// earlier carrier does not shadow a valid one in a later carrier.
    /// When every candidate fails, the last failure is returned.
    pub async fn authenticate_at(
        &self,
        request: &impl AuthRequest,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let candidates = locate_tokens(
            request,
            &self.header_names,
            &self.query_names,
            &self.cookie_names,
        );
        if candidates.is_empty() {
            tracing::debug!("no token found in configured carriers");
            return Err(AuthError::TokenNotFound);
        }

        let mut last_error = AuthError::TokenNotFound;
        for token in &candidates {
            match self.verify_token(token, now).await {
                Ok(user) => {
                    tracing::debug!(
                        token = %desensitized_token(token),
                        user_id = %user.id,
                        "token verified"
                    );
                    return Ok(user);
                }
                Err(e) => {
                    tracing::debug!(
                        token = %desensitized_token(token),
                        error = %e,
                        "token rejected"
                    );
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Verify one candidate end to end: signature, temporal claims,
    /// whitelists, configured predicates, identity projection.
    async fn verify_token(&self, token: &str, now: DateTime<Utc>) -> Result<User, AuthError> {
        let header = decode_header(token)?;

        let (decoding_key, algorithms): (DecodingKey, Vec<Algorithm>) = match &self.keys {
            KeyStore::Static(key) => (key.decoding_key.clone(), key.algorithms.clone()),
            KeyStore::Remote(cache) => {
                let kid = header.kid.as_deref().ok_or_else(|| {
                    AuthError::InvalidToken("token header carries no key ID".to_string())
                })?;
                let (key, algorithm) = cache.resolve(kid).await?;
                (key, vec![algorithm])
            }
        };

        let mut validation = Validation::new(algorithms[0]);
        validation.algorithms = algorithms;
        // Temporal and audience checks run below against the injected
        // clock; the library's wall-clock pass stays off.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Map<String, Value>>(token, &decoding_key, &validation)?;
        let claims = ClaimSet::new(data.claims);

        self.check_temporal(&claims, now)?;
        self.check_issuer(&claims)?;
        self.check_audience(&claims)?;
        for predicate in &self.predicates {
            predicate
                .evaluate(&claims)
                .map_err(|e| AuthError::ClaimNotSatisfied(e.to_string()))?;
        }

        self.project_user(&claims)
    }

    /// exp must be in the future; iat and nbf must not be.
    fn check_temporal(&self, claims: &ClaimSet, now: DateTime<Utc>) -> Result<(), AuthError> {
        let now_secs = now.timestamp() as f64;

        if let Some(value) = claims.get("exp") {
            let exp = value.as_f64().ok_or_else(|| {
                AuthError::InvalidToken("exp claim is not a number".to_string())
            })?;
            if exp <= now_secs {
                return Err(AuthError::InvalidToken("token expired (exp)".to_string()));
            }
        }
        if let Some(value) = claims.get("iat") {
            let iat = value.as_f64().ok_or_else(|| {
                AuthError::InvalidToken("iat claim is not a number".to_string())
            })?;
            if iat > now_secs {
                return Err(AuthError::InvalidToken(
                    "token issued in the future (iat)".to_string(),
                ));
            }
        }
        if let Some(value) = claims.get("nbf") {
            let nbf = value.as_f64().ok_or_else(|| {
                AuthError::InvalidToken("nbf claim is not a number".to_string())
            })?;
            if nbf > now_secs {
                return Err(AuthError::InvalidToken(
                    "token not yet valid (nbf)".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// iss must exactly match a whitelist entry (case-sensitive).
    fn check_issuer(&self, claims: &ClaimSet) -> Result<(), AuthError> {
        if self.issuer_whitelist.is_empty() {
            return Ok(());
        }
        let issuer = claims.get("iss").and_then(Value::as_str);
        match issuer {
            Some(iss) if self.issuer_whitelist.iter().any(|w| w == iss) => Ok(()),
            _ => Err(AuthError::ClaimNotSatisfied(
                "iss not on the issuer whitelist".to_string(),
            )),
        }
    }

    /// A string audience must equal a whitelist entry; a list audience
    /// passes when at least one element matches.
    fn check_audience(&self, claims: &ClaimSet) -> Result<(), AuthError> {
        if self.audience_whitelist.is_empty() {
            return Ok(());
        }
        let accepted = match claims.get("aud") {
            Some(Value::String(aud)) => self.audience_whitelist.iter().any(|w| w == aud),
            Some(Value::Array(items)) => items.iter().any(|item| {
                item.as_str()
                    .is_some_and(|aud| self.audience_whitelist.iter().any(|w| w == aud))
            }),
            _ => false,
        };
        if accepted {
            Ok(())
        } else {
            Err(AuthError::ClaimNotSatisfied(
                "aud not on the audience whitelist".to_string(),
            ))
        }
    }

    /// Resolve the user ID from the candidate claims (first non-empty
    /// stringification wins) and project the configured meta claims.
    fn project_user(&self, claims: &ClaimSet) -> Result<User, AuthError> {
        let mut id = String::new();
        for name in &self.user_claims {
            let candidate = claims.stringify_path(name);
            if !candidate.is_empty() {
                id = candidate;
                break;
            }
        }
        if id.is_empty() {
            return Err(AuthError::EmptyUserId);
        }

        let mut metadata = HashMap::with_capacity(self.meta_claims.len());
        for (source, destination) in &self.meta_claims {
            metadata.insert(destination.clone(), claims.stringify_path(source));
        }

        Ok(User { id, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("", "")]
    #[case("abc", "abc")]
    #[case("abcdef", "abcdef")]
    #[case("abcdefg", "ab…fg")]
    #[case("abcdefeijk", "abc…ijk")]
    #[case("abcdefghijklmnopqrstuvwxyz", "abcdefgh…stuvwxyz")]
    #[case(
        "abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuv",
        "abcdefghijklmnop…ghijklmnopqrstuv"
    )]
    #[case(
        "abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyz",
        "abcdefghijklmnop…klmnopqrstuvwxyz"
    )]
    #[case(
        "abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyz",
        "abcdefghijklmnop…klmnopqrstuvwxyz"
    )]
    fn test_desensitized_token(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(desensitized_token(input), expected);
    }

    #[test]
    fn test_locate_strips_bearer_prefix_from_headers_only() {
        let request = SimpleRequest::new()
            .with_header("Authorization", "Bearer header-token")
            .with_query_param("token", "Bearer query-token")
            .with_cookie("sess", "Bearer cookie-token");

        let candidates = locate_tokens(
            &request,
            &names(&["Authorization"]),
            &names(&["token"]),
            &names(&["sess"]),
        );

        assert_eq!(
            candidates,
            vec!["header-token", "Bearer query-token", "Bearer cookie-token"]
        );
    }

    #[test]
    fn test_locate_passes_bare_header_value_through() {
        let request = SimpleRequest::new().with_header("X-Api-Token", "bare-token");
        let candidates = locate_tokens(&request, &names(&["X-Api-Token"]), &[], &[]);
        assert_eq!(candidates, vec!["bare-token"]);
    }

    #[test]
    fn test_locate_header_lookup_is_case_insensitive() {
        let request = SimpleRequest::new().with_header("x-api-token", "lowercase-header");
        let candidates = locate_tokens(&request, &names(&["X-Api-Token"]), &[], &[]);
        assert_eq!(candidates, vec!["lowercase-header"]);
    }

    #[test]
    fn test_locate_scans_headers_then_query_then_cookies() {
        let request = SimpleRequest::new()
            .with_header("X-Api-Token", "from-header")
            .with_query_param("access_token", "from-access-token")
            .with_query_param("token", "from-token")
            .with_cookie("sess", "from-cookie");

        let candidates = locate_tokens(
            &request,
            &names(&["X-Api-Token"]),
            &names(&["access_token", "token"]),
            &names(&["sess"]),
        );

        assert_eq!(
            candidates,
            vec!["from-header", "from-access-token", "from-token", "from-cookie"]
        );
    }

    #[test]
    fn test_locate_skips_empty_and_whitespace_values() {
        let request = SimpleRequest::new()
            .with_header("Authorization", "Bearer ")
            .with_query_param("token", "   ")
            .with_cookie("sess", "");

        let candidates = locate_tokens(
            &request,
            &names(&["Authorization"]),
            &names(&["token"]),
            &names(&["sess"]),
        );
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_locate_nothing_configured_finds_nothing() {
        let request = SimpleRequest::new().with_header("Authorization", "Bearer tok");
        assert!(locate_tokens(&request, &[], &[], &[]).is_empty());
    }
}
