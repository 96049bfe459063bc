// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing key resolution backed by the issuer's JWKS endpoint.
//!
//! ## Caching
//!
//! - Keys are cached by `kid` for the lifetime of the resolver. A key never
//!   changes under a stable `kid`, so there is no TTL.
//! - A cache miss fetches the whole key set and caches every usable key in it.
//! - A `kid` still absent after a successful fetch is remembered for a short
//!   window so a flood of tokens with the same unknown `kid` costs one fetch.
//! - A failed fetch leaves previously cached keys untouched.
//!
//! ## Usage
//!
//! Construct one `KeyResolver` at startup and hand it to the `TokenVerifier`.
//! Tests substitute the `KeySource`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

/// Default bound on a single key-set fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default window during which a confirmed-absent `kid` is not refetched.
pub const DEFAULT_MISS_TTL: Duration = Duration::from_secs(60);

/// Failure to obtain the key set from its source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyFetchError {
    #[error("key set request failed: {0}")]
    Network(String),

    #[error("HTTP {0} from key set endpoint")]
    Status(u16),

    #[error("key set document is invalid: {0}")]
    InvalidDocument(String),

    #[error("key set fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure to resolve a specific key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyResolveError {
    #[error("signing key not found: {kid}")]
    KeyNotFound { kid: String },

    #[error("signing key {kid} unavailable: {source}")]
    Fetch {
        kid: String,
        #[source]
        source: KeyFetchError,
    },
}

/// Key set document with entries left unparsed.
#[derive(Deserialize)]
struct RawKeySet {
    #[serde(default)]
    keys: Vec<serde_json::Value>,
}

/// Parse a published key set, skipping entries that are not valid JWKs
/// (unknown `kty`, missing parameters) instead of rejecting the whole set.
pub fn parse_key_set(body: &[u8]) -> Result<JwkSet, KeyFetchError> {
    let raw: RawKeySet =
        serde_json::from_slice(body).map_err(|e| KeyFetchError::InvalidDocument(e.to_string()))?;
    let keys = raw
        .keys
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Jwk>(entry) {
            Ok(jwk) => Some(jwk),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable key set entry");
                None
            }
        })
        .collect();
    Ok(JwkSet { keys })
}

/// Where the key set comes from.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the full current key set.
    async fn fetch_key_set(&self) -> Result<JwkSet, KeyFetchError>;
}

/// Fetches the key set over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpKeySource {
    url: String,
    client: reqwest::Client,
}

impl HttpKeySource {
    /// Create a source for `url`, bounding each request by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, KeyFetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyFetchError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Get the key set URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch_key_set(&self) -> Result<JwkSet, KeyFetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| KeyFetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeyFetchError::Status(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| KeyFetchError::Network(e.to_string()))?;
        parse_key_set(&body)
    }
}

/// A public key usable for RS256 verification.
#[derive(Clone)]
pub struct SigningKey {
    key_id: String,
    material: DecodingKey,
}

impl SigningKey {
    /// Build a signing key from a JWK entry.
    ///
    /// Returns `None` for entries that cannot verify RS256 signatures: non-RSA
    /// keys, keys not declared for signing, other declared algorithms, or
    /// entries without a `kid`.
    pub fn from_jwk(jwk: &Jwk) -> Option<Self> {
        let AlgorithmParameters::RSA(rsa) = &jwk.algorithm else {
            return None;
        };
        if jwk
            .common
            .key_algorithm
            .as_ref()
            .is_some_and(|alg| !matches!(alg, KeyAlgorithm::RS256))
        {
            return None;
        }
        if jwk
            .common
            .public_key_use
            .as_ref()
            .is_some_and(|key_use| !matches!(key_use, PublicKeyUse::Signature))
        {
            return None;
        }
        let key_id = jwk.common.key_id.as_ref().filter(|kid| !kid.is_empty())?;
        let material = DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok()?;
        Some(Self {
            key_id: key_id.clone(),
            material,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn material(&self) -> &DecodingKey {
        &self.material
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Caching resolver from `kid` to [`SigningKey`].
pub struct KeyResolver {
    source: Arc<dyn KeySource>,
    keys: RwLock<HashMap<String, Arc<SigningKey>>>,
    misses: RwLock<HashMap<String, Instant>>,
    /// Serializes key-set fetches so concurrent misses share one request.
    fetch_lock: Mutex<()>,
    fetch_timeout: Duration,
    miss_ttl: Duration,
}

impl KeyResolver {
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self {
            source,
            keys: RwLock::new(HashMap::new()),
            misses: RwLock::new(HashMap::new()),
            fetch_lock: Mutex::new(()),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            miss_ttl: DEFAULT_MISS_TTL,
        }
    }

    /// Bound each key-set fetch.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set how long a confirmed-absent `kid` is remembered.
    pub fn with_miss_ttl(mut self, ttl: Duration) -> Self {
        self.miss_ttl = ttl;
        self
    }

    /// Resolve the key for `kid`, fetching the key set on a cache miss.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyResolveError> {
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }
        if self.recently_missing(kid).await {
            tracing::debug!(kid, "kid recently confirmed absent, skipping fetch");
            return Err(KeyResolveError::KeyNotFound { kid: kid.to_string() });
        }

        let _fetching = self.fetch_lock.lock().await;

        // Another task may have populated the cache while we waited.
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }
        if self.recently_missing(kid).await {
            return Err(KeyResolveError::KeyNotFound { kid: kid.to_string() });
        }

        match self.fetch().await {
            Ok(key_set) => {
                let added = self.populate(&key_set).await;
                tracing::debug!(kid, added, "key set fetched");
                match self.cached(kid).await {
                    Some(key) => Ok(key),
                    None => {
                        self.record_miss(kid).await;
                        tracing::warn!(kid, "kid not present in fetched key set");
                        Err(KeyResolveError::KeyNotFound { kid: kid.to_string() })
                    }
                }
            }
            Err(source) => {
                tracing::warn!(kid, error = %source, "key set fetch failed");
                Err(KeyResolveError::Fetch {
                    kid: kid.to_string(),
                    source,
                })
            }
        }
    }

    /// Fetch the key set now and cache every key in it.
    ///
    /// Returns the number of keys cached after the fetch.
    pub async fn prime(&self) -> Result<usize, KeyFetchError> {
        let _fetching = self.fetch_lock.lock().await;
        let key_set = self.fetch().await?;
        self.populate(&key_set).await;
        Ok(self.keys.read().await.len())
    }

    /// Fetch the key set and replace the cache with it.
    ///
    /// The cache is swapped only after the fetch succeeds; a failed reload
    /// keeps every previously cached key. Returns the number of keys cached.
    pub async fn reload(&self) -> Result<usize, KeyFetchError> {
        let _fetching = self.fetch_lock.lock().await;
        let key_set = self.fetch().await?;
        let fresh: HashMap<String, Arc<SigningKey>> = key_set
            .keys
            .iter()
            .filter_map(SigningKey::from_jwk)
            .map(|key| (key.key_id().to_string(), Arc::new(key)))
            .collect();
        let count = fresh.len();
        *self.keys.write().await = fresh;
        self.misses.write().await.clear();
        tracing::info!(keys = count, "signing key cache reloaded");
        Ok(count)
    }

    /// Drop every cached key and remembered miss.
    pub async fn bust(&self) {
        self.keys.write().await.clear();
        self.misses.write().await.clear();
        tracing::info!("signing key cache cleared");
    }

    /// Key ids currently cached, sorted.
    pub async fn cached_key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Check if at least one key is cached.
    pub async fn is_populated(&self) -> bool {
        !self.keys.read().await.is_empty()
    }

    async fn cached(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.read().await.get(kid).cloned()
    }

    async fn recently_missing(&self, kid: &str) -> bool {
        self.misses
            .read()
            .await
            .get(kid)
            .is_some_and(|at| at.elapsed() < self.miss_ttl)
    }

    async fn record_miss(&self, kid: &str) {
        let mut misses = self.misses.write().await;
        misses.retain(|_, at| at.elapsed() < self.miss_ttl);
        misses.insert(kid.to_string(), Instant::now());
    }

    async fn fetch(&self) -> Result<JwkSet, KeyFetchError> {
        tokio::time::timeout(self.fetch_timeout, self.source.fetch_key_set())
            .await
            .map_err(|_| KeyFetchError::Timeout(self.fetch_timeout))?
    }

    /// Cache every usable key. Existing entries are never replaced.
    async fn populate(&self, key_set: &JwkSet) -> usize {
        let fresh: Vec<SigningKey> = key_set.keys.iter().filter_map(SigningKey::from_jwk).collect();
        let mut added = 0;
        {
            let mut keys = self.keys.write().await;
            for key in fresh {
                if !keys.contains_key(key.key_id()) {
                    keys.insert(key.key_id().to_string(), Arc::new(key));
                    added += 1;
                }
            }
        }
        let keys = self.keys.read().await;
        self.misses.write().await.retain(|kid, _| !keys.contains_key(kid));
        added
    }
}
