//! Bearer-token authentication.
//!
//! Callers present a JWT issued by the identity provider in the `Authorization` header. Tokens
//! are verified against the provider's published JWK set, which is fetched lazily and cached.
//! The set is refetched when a token names a key id the cache does not know, at most once per
//! refetch interval. Concurrent misses wait for the same fetch.

use async_trait::async_trait;
use consult_core::ConsultError;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Minimum time between two key set fetches triggered by unknown key ids.
pub const DEFAULT_MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(10);

/// Claims the service relies on.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Subject: the identity provider's user id.
    pub sub: String,
    pub exp: u64,
    /// Authorised party, when the provider sets it.
    #[serde(default)]
    pub azp: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("not authenticated")]
    MissingCredentials,
    #[error("invalid authentication scheme")]
    InvalidScheme,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("no signing key matches kid {0}")]
    UnknownKey(String),
    #[error("failed to fetch signing keys: {0}")]
    KeySetFetch(String),
}

impl From<AuthError> for ConsultError {
    fn from(err: AuthError) -> Self {
        ConsultError::Authentication(err.to_string())
    }
}

/// Extract the credential from an `Authorization` header value.
///
/// The scheme is matched case-insensitively and surrounding whitespace is ignored.
///
/// # Errors
/// Returns:
/// - `AuthError::MissingCredentials` if the header is absent or carries no token, or
/// - `AuthError::InvalidScheme` if the scheme is not `Bearer`.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let value = authorization
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingCredentials)?;

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidScheme);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}

/// Verifies bearer credentials.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// Verifies JWTs against a remote JWK set.
pub struct JwksVerifier {
    client: reqwest::Client,
    jwks_url: String,
    algorithms: Vec<Algorithm>,
    min_refetch_interval: Duration,
    keys: RwLock<KeyCache>,
}

#[derive(Default)]
struct KeyCache {
    set: Option<JwkSet>,
    fetched_at: Option<Instant>,
}

impl KeyCache {
    fn find(&self, kid: &str) -> Option<Jwk> {
        self.set.as_ref().and_then(|set| set.find(kid)).cloned()
    }
}

impl JwksVerifier {
    /// Create a verifier that accepts RS256 tokens signed by keys published at `jwks_url`.
    ///
    /// Nothing is fetched until the first token is verified.
    pub fn new(client: reqwest::Client, jwks_url: impl Into<String>) -> Self {
        Self {
            client,
            jwks_url: jwks_url.into(),
            algorithms: vec![Algorithm::RS256],
            min_refetch_interval: DEFAULT_MIN_REFETCH_INTERVAL,
            keys: RwLock::new(KeyCache::default()),
        }
    }

    /// Replace the set of accepted signing algorithms.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Replace the minimum time between refetches caused by unknown key ids.
    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch_interval = interval;
        self
    }

    async fn find_key(&self, kid: &str) -> Result<Jwk, AuthError> {
        if let Some(jwk) = self.keys.read().await.find(kid) {
            return Ok(jwk);
        }

        let mut cache = self.keys.write().await;
        // Another request may have refreshed the set while this one waited for the lock.
        if let Some(jwk) = cache.find(kid) {
            return Ok(jwk);
        }
        if cache
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.min_refetch_interval)
        {
            tracing::debug!(kid, "unknown signing key, key set fetched recently");
            return Err(AuthError::UnknownKey(kid.to_string()));
        }

        tracing::debug!(kid, "signing key not cached, fetching key set");
        let fresh = self.fetch_key_set().await?;
        let found = fresh.find(kid).cloned();
        cache.set = Some(fresh);
        cache.fetched_at = Some(Instant::now());

        found.ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    async fn fetch_key_set(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AuthError::KeySetFetch(e.to_string()))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeySetFetch(e.to_string()))
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if !self.algorithms.contains(&header.alg) {
            return Err(AuthError::InvalidToken(format!(
                "algorithm {:?} is not accepted",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token header has no kid".into()))?;

        let jwk = self.find_key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        // The identity provider does not issue an audience claim by default.
        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(data.claims)
    }
}
