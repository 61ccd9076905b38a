//! JWK (JSON Web Key) support
//!
//! Wire types for the keys served by JWK endpoints (RFC 7517) and their
//! conversion into `jsonwebtoken` decoding keys. An endpoint body may be
//! either a full key set (`{"keys": [...]}`) or a single bare key.

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for JWK key conversion.
#[derive(Debug, Error)]
pub enum JwkError {
    /// Missing required parameter for the key type.
    #[error("missing required JWK parameter: {0}")]
    MissingParameter(String),
    /// Unsupported key type or algorithm.
    #[error("unsupported JWK key type: {0}")]
    UnsupportedKeyType(String),
    /// Failed to create a decoding key from the components.
    #[error("failed to create decoding key: {0}")]
    KeyCreationFailed(String),
}

/// A set of JWK keys as served by an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// A single public key record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key Type (e.g., "RSA", "EC")
    pub kty: String,

    /// Key ID - selects this key via the token's `kid` header
    #[serde(default)]
    pub kid: Option<String>,

    /// Public Key Use ("sig" for signature, "enc" for encryption)
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Algorithm intended for use with the key (e.g., "RS256", "ES256")
    #[serde(default)]
    pub alg: Option<String>,

    // RSA key parameters (RFC 7518)
    /// RSA modulus (base64url-encoded)
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url-encoded)
    #[serde(default)]
    pub e: Option<String>,

    // EC key parameters (RFC 7518)
    /// EC curve name (e.g., "P-256", "P-384")
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate (base64url-encoded)
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url-encoded)
    #[serde(default)]
    pub y: Option<String>,
}

impl Jwk {
    /// Algorithm name, inferred from the key shape if not declared.
    pub fn algorithm_name(&self) -> Option<&str> {
        self.alg.as_deref().or(match self.kty.as_str() {
            "RSA" => Some("RS256"),
            "EC" => match self.crv.as_deref() {
                Some("P-256") => Some("ES256"),
                Some("P-384") => Some("ES384"),
                _ => None,
            },
            _ => None,
        })
    }

    /// The `jsonwebtoken` algorithm to verify with.
    pub fn algorithm(&self) -> Result<Algorithm, JwkError> {
        let name = self
            .algorithm_name()
            .ok_or_else(|| JwkError::UnsupportedKeyType(self.kty.clone()))?;
        match name {
            "RS256" => Ok(Algorithm::RS256),
            "RS384" => Ok(Algorithm::RS384),
            "RS512" => Ok(Algorithm::RS512),
            "ES256" => Ok(Algorithm::ES256),
            "ES384" => Ok(Algorithm::ES384),
            other => Err(JwkError::UnsupportedKeyType(format!(
                "unsupported algorithm: {}",
                other
            ))),
        }
    }

    /// Convert to a `DecodingKey` for signature verification.
    pub fn decoding_key(&self) -> Result<DecodingKey, JwkError> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self
                    .n
                    .as_ref()
                    .ok_or_else(|| JwkError::MissingParameter("n (modulus)".to_string()))?;
                let e = self
                    .e
                    .as_ref()
                    .ok_or_else(|| JwkError::MissingParameter("e (exponent)".to_string()))?;

                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| JwkError::KeyCreationFailed(e.to_string()))
            }
            "EC" => {
                let x = self
                    .x
                    .as_ref()
                    .ok_or_else(|| JwkError::MissingParameter("x (coordinate)".to_string()))?;
                let y = self
                    .y
                    .as_ref()
                    .ok_or_else(|| JwkError::MissingParameter("y (coordinate)".to_string()))?;

                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| JwkError::KeyCreationFailed(e.to_string()))
            }
            other => Err(JwkError::UnsupportedKeyType(other.to_string())),
        }
    }
}

/// Parse an endpoint body as a JWK Set, falling back to a single JWK.
/// Any other content is an error.
pub fn parse_jwk_body(body: &str) -> Result<Vec<Jwk>, serde_json::Error> {
    match serde_json::from_str::<JwkSet>(body) {
        Ok(set) => Ok(set.keys),
        Err(_) => serde_json::from_str::<Jwk>(body).map(|key| vec![key]),
    }
}
