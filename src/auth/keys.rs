//! Key material resolution.
//!
//! Two mutually exclusive providers back signature verification:
//!
//! - [`StaticKey`]: the configured `sign_key` string, tried first as a
//!   standard-base64 HMAC secret and otherwise parsed as a PEM public
//!   key (RSA, then EC).
//! - [`JwkCache`]: public keys fetched from one or more JWK endpoints,
//!   merged by key ID and cached in memory. The cache is refetched
//!   lazily once it is older than the refresh interval, and refreshed on
//!   demand (at most once per verification attempt) when a token carries
//!   an unknown key ID, to tolerate key rotation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::RwLock;

use super::jwks::{parse_jwk_body, Jwk};
use crate::config::AuthConfig;
use crate::error::AuthError;

const HMAC_FAMILY: &[Algorithm] = &[Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
const RSA_FAMILY: &[Algorithm] = &[Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];
const EC_FAMILY: &[Algorithm] = &[Algorithm::ES256, Algorithm::ES384];

fn algorithm_from_name(name: &str) -> Result<Algorithm, AuthError> {
    match name {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        other => Err(AuthError::InvalidSignAlgorithm(other.to_string())),
    }
}

/// The algorithms the key may verify: the explicit override when given
/// (it must belong to the key's family), the whole family otherwise.
fn allowed_algorithms(
    explicit: Option<&str>,
    family: &[Algorithm],
) -> Result<Vec<Algorithm>, AuthError> {
    match explicit {
        None => Ok(family.to_vec()),
        Some(name) => {
            let alg = algorithm_from_name(name)?;
            if family.contains(&alg) {
                Ok(vec![alg])
            } else {
                Err(AuthError::InvalidSignAlgorithm(name.to_string()))
            }
        }
    }
}

/// Statically configured key material.
pub struct StaticKey {
    pub(crate) decoding_key: DecodingKey,
    pub(crate) algorithms: Vec<Algorithm>,
}

impl StaticKey {
    /// Parse a configured `sign_key` string: base64 symmetric secret
    /// bytes first, PEM public key otherwise.
    pub fn parse(sign_key: &str, sign_alg: Option<&str>) -> Result<Self, AuthError> {
        if let Ok(secret) = BASE64_STANDARD.decode(sign_key) {
            return Ok(Self {
                decoding_key: DecodingKey::from_secret(&secret),
                algorithms: allowed_algorithms(sign_alg, HMAC_FAMILY)?,
            });
        }

        if let Ok(key) = DecodingKey::from_rsa_pem(sign_key.as_bytes()) {
            return Ok(Self {
                decoding_key: key,
                algorithms: allowed_algorithms(sign_alg, RSA_FAMILY)?,
            });
        }

        if let Ok(key) = DecodingKey::from_ec_pem(sign_key.as_bytes()) {
            return Ok(Self {
                decoding_key: key,
                algorithms: allowed_algorithms(sign_alg, EC_FAMILY)?,
            });
        }

        Err(AuthError::InvalidPublicKey)
    }
}

/// Cached key set with its fetch timestamp.
struct CachedKeys {
    keys: Vec<Jwk>,
    fetched_at: Instant,
}

/// In-memory cache of public keys fetched from JWK endpoints.
///
/// One instance per configuration, shared by all in-flight requests.
/// Readers take a short read lock; refreshes are serialized by an async
/// mutex and never hold a lock across the network call.
pub struct JwkCache {
    urls: Vec<String>,
    refresh_interval: Duration,
    fetch_timeout: Duration,
    cached: Arc<RwLock<Option<CachedKeys>>>,
    refresh_serializer: tokio::sync::Mutex<()>,
}

impl JwkCache {
    pub fn new(urls: Vec<String>, refresh_interval: Duration, fetch_timeout: Duration) -> Self {
        Self {
            urls,
            refresh_interval,
            fetch_timeout,
            cached: Arc::new(RwLock::new(None)),
            refresh_serializer: tokio::sync::Mutex::new(()),
        }
    }

    /// Populate the cache at setup time so total endpoint failure is a
    /// startup error, not a surprise on the first request.
    pub async fn initial_fetch(&self) -> Result<(), AuthError> {
        self.refresh_unless_updated_since(Instant::now()).await
    }

    fn is_fresh(&self) -> bool {
        self.cached
            .read()
            .as_ref()
            .map(|c| c.fetched_at.elapsed() < self.refresh_interval)
            .unwrap_or(false)
    }

    fn lookup(&self, kid: &str) -> Option<Jwk> {
        self.cached
            .read()
            .as_ref()
            .and_then(|c| c.keys.iter().find(|k| k.kid.as_deref() == Some(kid)))
            .cloned()
    }

    /// Resolve the verification key for a token's key ID.
    ///
    /// Refreshes a stale cache first, then retries an unknown key ID
    /// with one forced refresh. Concurrent attempts collapse: a refresh
    /// that completed after this attempt began satisfies the forced
    /// refresh without another fetch.
    pub async fn resolve(&self, kid: &str) -> Result<(DecodingKey, Algorithm), AuthError> {
        let attempt_started = Instant::now();

        if !self.is_fresh() {
            if let Err(e) = self.refresh_unless_updated_since(attempt_started).await {
                tracing::warn!(error = %e, "JWK refresh failed, falling back to cached keys");
            }
        }

        if let Some(key) = self.lookup(kid) {
            return convert_key(kid, &key);
        }

        self.refresh_unless_updated_since(attempt_started).await?;

        match self.lookup(kid) {
            Some(key) => convert_key(kid, &key),
            None => Err(AuthError::KeyNotFound(kid.to_string())),
        }
    }

    /// Refetch all endpoints unless another refresh already completed
    /// after `started`.
    ///
    /// The fetch runs in a spawned task that owns a handle to the cache:
    /// cancelling the request that triggered the refresh must not abort
    /// a fetch that other in-flight requests may still need.
    async fn refresh_unless_updated_since(&self, started: Instant) -> Result<(), AuthError> {
        let _guard = self.refresh_serializer.lock().await;

        if let Some(c) = self.cached.read().as_ref() {
            if c.fetched_at > started {
                return Ok(());
            }
        }

        let urls = self.urls.clone();
        let timeout = self.fetch_timeout;
        let cache = Arc::clone(&self.cached);
        let fetch = tokio::spawn(async move {
            let keys = fetch_all(&urls, timeout).await?;
            tracing::info!(key_count = keys.len(), "JWK cache refreshed");
            *cache.write() = Some(CachedKeys {
                keys,
                fetched_at: Instant::now(),
            });
            Ok::<(), AuthError>(())
        });

        fetch
            .await
            .map_err(|e| AuthError::JwkFetch(format!("fetch task failed: {}", e)))?
    }
}

fn convert_key(kid: &str, key: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
    let decoding_key = key
        .decoding_key()
        .map_err(|e| AuthError::JwkFetch(format!("key {:?} unusable: {}", kid, e)))?;
    let algorithm = key
        .algorithm()
        .map_err(|e| AuthError::JwkFetch(format!("key {:?} unusable: {}", kid, e)))?;
    Ok((decoding_key, algorithm))
}

/// Fetch every configured URL, tolerating individual failures. Keys are
/// merged by key ID; on duplicates the earlier configured URL wins.
/// Zero usable keys across all URLs is an error.
async fn fetch_all(urls: &[String], timeout: Duration) -> Result<Vec<Jwk>, AuthError> {
    let mut merged: Vec<Jwk> = Vec::new();

    for url in urls {
        let keys = match fetch_one(url, timeout).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "JWK endpoint fetch failed");
                continue;
            }
        };
        for key in keys {
            match key.kid.as_deref() {
                None => {
                    tracing::debug!(url = %url, "skipping JWK without a key ID");
                }
                Some(kid) if merged.iter().any(|k| k.kid.as_deref() == Some(kid)) => {
                    tracing::debug!(url = %url, kid = %kid, "skipping duplicate key ID");
                }
                Some(_) => merged.push(key),
            }
        }
    }

    if merged.is_empty() {
        return Err(AuthError::AllJwkUrlsFailed);
    }
    Ok(merged)
}

async fn fetch_one(url: &str, timeout: Duration) -> Result<Vec<Jwk>, AuthError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::JwkFetch(format!("failed to create HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                AuthError::JwkFetch("request timed out".to_string())
            } else if e.is_connect() {
                AuthError::JwkFetch(format!("connection failed: {}", e))
            } else {
                AuthError::JwkFetch(format!("request failed: {}", e))
            }
        })?;

    if !response.status().is_success() {
        return Err(AuthError::JwkFetch(format!(
            "HTTP {} response",
            response.status()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| AuthError::JwkFetch(format!("failed to read body: {}", e)))?;

    parse_jwk_body(&body).map_err(|e| AuthError::JwkFetch(format!("invalid JWK body: {}", e)))
}

/// The key provider selected at setup time.
pub(crate) enum KeyStore {
    Static(StaticKey),
    Remote(JwkCache),
}

impl KeyStore {
    pub(crate) async fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.using_jwk() {
            let cache = JwkCache::new(
                config.jwk_urls.clone(),
                Duration::from_secs(config.jwk_refresh_interval_secs),
                Duration::from_secs(config.jwk_fetch_timeout_secs),
            );
            cache.initial_fetch().await?;
            Ok(KeyStore::Remote(cache))
        } else {
            Ok(KeyStore::Static(StaticKey::parse(
                &config.sign_key,
                config.sign_alg.as_deref(),
            )?))
        }
    }
}
