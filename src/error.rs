// Error types module

use thiserror::Error;

/// Centralized error type for the authentication engine.
///
/// Errors fall into three categories: configuration errors (fatal at
/// setup, the engine must not serve requests), key-resolution errors,
/// and verification errors (always per-request, never fatal). Hosts
/// should collapse anything non-config into a uniform "not
/// authenticated" response; the variant detail is for their own logs.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Neither a static sign key nor any JWK URL is configured.
    #[error("missing keys: sign_key or jwk_urls must be configured")]
    MissingKeys,

    /// An explicit sign algorithm is unrecognized or does not match the
    /// configured key material.
    #[error("invalid sign algorithm: {0}")]
    InvalidSignAlgorithm(String),

    /// The static sign key is neither decodable base64 nor parseable PEM.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// A meta claim rule is malformed (empty or duplicate destination).
    #[error("invalid meta claim: {0}")]
    InvalidMetaClaim(String),

    /// The initial fetch produced no usable key from any configured URL.
    #[error("no usable key fetched from any JWK URL")]
    AllJwkUrlsFailed,

    /// The token's key ID is absent from the key cache, even after a
    /// forced refresh.
    #[error("key {0:?} not found in JWK cache")]
    KeyNotFound(String),

    /// No configured carrier produced a token. A normal outcome for
    /// unauthenticated traffic, not a server-side problem.
    #[error("token not found in request")]
    TokenNotFound,

    /// The token failed to parse, its signature did not verify, or a
    /// temporal claim is out of range.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// A configured claim predicate was not satisfied.
    #[error("claim not satisfied: {0}")]
    ClaimNotSatisfied(String),

    /// Verification passed but no user-claim candidate stringified to a
    /// non-empty ID.
    #[error("no user identity found in token claims")]
    EmptyUserId,

    /// A JWK endpoint fetch failed (network, HTTP status, or body shape).
    #[error("JWK fetch failed: {0}")]
    JwkFetch(String),
}

impl AuthError {
    /// True for errors that must abort setup rather than fail a request.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AuthError::MissingKeys
                | AuthError::InvalidSignAlgorithm(_)
                | AuthError::InvalidPublicKey
                | AuthError::InvalidMetaClaim(_)
                | AuthError::AllJwkUrlsFailed
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(e.to_string())
    }
}
