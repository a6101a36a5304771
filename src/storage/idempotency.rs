// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache of recently seen webhook idempotency keys.
//!
//! The notification service may retry a delivery; a key seen within the
//! TTL is reported as a duplicate and not pushed again.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Default retention window for idempotency keys.
pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(10 * 60);
/// Default number of keys kept in memory.
pub const DEFAULT_IDEMPOTENCY_CAPACITY: usize = 10_000;

/// In-process cache of processed idempotency keys.
pub struct IdempotencyCache {
    cache: Mutex<LruCache<String, Instant>>,
    ttl: Duration,
}

impl IdempotencyCache {
    /// Create a new cache with the given capacity and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Record `key` and report whether it was already seen within the TTL.
    ///
    /// Returns `true` for a duplicate. An expired entry is refreshed and
    /// treated as new.
    pub fn check_and_insert(&self, key: &str) -> bool {
        let Ok(mut cache) = self.cache.lock() else {
            return false;
        };
        if let Some(seen_at) = cache.get(key) {
            if seen_at.elapsed() < self.ttl {
                return true;
            }
        }
        cache.put(key.to_string(), Instant::now());
        false
    }

    /// Forget a key so a retry is processed again.
    pub fn remove(&self, key: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(key);
        }
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(DEFAULT_IDEMPOTENCY_CAPACITY, DEFAULT_IDEMPOTENCY_TTL)
    }
}
