// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS fetching and key caching.
//!
//! Keys are converted to `DecodingKey`s once per fetch and served from
//! memory until the TTL lapses. A token whose `kid` is unknown triggers an
//! early refetch so rotated keys are picked up, at most once per
//! `refetch_interval`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;

use super::error::AuthError;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_REFETCH_INTERVAL: Duration = Duration::from_secs(30);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct VerificationKey {
    kid: Option<String>,
    key: DecodingKey,
    algorithm: Algorithm,
}

struct KeyCache {
    keys: Vec<VerificationKey>,
    fetched_at: Instant,
}

/// Identity provider keys used to verify bearer tokens.
#[derive(Clone)]
pub struct JwksManager {
    jwks_url: String,
    cache_ttl: Duration,
    refetch_interval: Duration,
    cache: Arc<RwLock<Option<KeyCache>>>,
    client: reqwest::Client,
}

impl JwksManager {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            jwks_url: jwks_url.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            refetch_interval: DEFAULT_REFETCH_INTERVAL,
            cache: Arc::new(RwLock::new(None)),
            client,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Minimum age of the cache before an unknown `kid` forces a refetch.
    pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = interval;
        self
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Whether keys are cached and within their TTL.
    pub async fn is_cached(&self) -> bool {
        self.cache
            .read()
            .await
            .as_ref()
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
    }

    /// Fetch the key set now, replacing the cache.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        self.refetch().await.map(|_| ())
    }

    /// Key and algorithm for the token's `kid`.
    pub async fn get_decoding_key(&self, kid: &str) -> Result<(DecodingKey, Algorithm), AuthError> {
        let (keys, age) = self.current_keys().await?;
        if let Some(found) = find_kid(&keys, kid) {
            return Ok(found);
        }
        if age < self.refetch_interval {
            return Err(AuthError::NoMatchingKey);
        }

        tracing::debug!(kid = %kid, "Unknown key id, refetching JWKS");
        let keys = self.refetch().await?;
        find_kid(&keys, kid).ok_or(AuthError::NoMatchingKey)
    }

    /// First usable key, for tokens without a `kid`.
    pub async fn get_any_decoding_key(&self) -> Result<(DecodingKey, Algorithm), AuthError> {
        let (keys, _) = self.current_keys().await?;
        keys.into_iter()
            .next()
            .map(|k| (k.key, k.algorithm))
            .ok_or(AuthError::NoMatchingKey)
    }

    async fn current_keys(&self) -> Result<(Vec<VerificationKey>, Duration), AuthError> {
        if let Some(entry) = self.cache.read().await.as_ref() {
            let age = entry.fetched_at.elapsed();
            if age < self.cache_ttl {
                return Ok((entry.keys.clone(), age));
            }
        }
        Ok((self.refetch().await?, Duration::ZERO))
    }

    async fn refetch(&self) -> Result<Vec<VerificationKey>, AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::JwksFetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }
        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        let keys: Vec<VerificationKey> = set
            .keys
            .iter()
            .filter_map(|jwk| match verification_key(jwk) {
                Ok(key) => Some(key),
                Err(reason) => {
                    tracing::warn!(kid = ?jwk.common.key_id, %reason, "Skipping JWKS key");
                    None
                }
            })
            .collect();
        tracing::debug!(keys = keys.len(), "JWKS refreshed");

        *self.cache.write().await = Some(KeyCache {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }
}

fn find_kid(keys: &[VerificationKey], kid: &str) -> Option<(DecodingKey, Algorithm)> {
    keys.iter()
        .find(|k| k.kid.as_deref() == Some(kid))
        .map(|k| (k.key.clone(), k.algorithm))
}

fn verification_key(jwk: &Jwk) -> Result<VerificationKey, String> {
    let (key, algorithm) = match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|e| e.to_string())?;
            let algorithm = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                _ => Algorithm::RS256,
            };
            (key, algorithm)
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y).map_err(|e| e.to_string())?;
            let algorithm = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };
            (key, algorithm)
        }
        _ => return Err("unsupported key type".to_string()),
    };
    Ok(VerificationKey {
        kid: jwk.common.key_id.clone(),
        key,
        algorithm,
    })
}
