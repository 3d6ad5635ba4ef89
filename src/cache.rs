//! Generic typed cache-aside wrapper.
//!
//! A cache entry is always a derived copy of durable state: losing one can
//! only cost a refetch, never corrupt the system of record. Read-path
//! failures (store down, corrupt payload) therefore degrade to cache misses
//! instead of surfacing errors, and write-path failures report `false`
//! without touching the caller's hot path.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

use crate::providers::KvStore;
use crate::serialize::{JsonSerializer, Serializer};

/// Default SCAN batch size for pattern deletion.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 100;

/// Typed cache-aside manager over a [`KvStore`].
///
/// Stateless: all state lives in the shared store, so any number of
/// instances can run against the same backend.
#[derive(Debug, Clone)]
pub struct CacheManager<S, Z = JsonSerializer> {
    store: S,
    codec: Z,
    scan_batch_size: usize,
}

impl<S: KvStore> CacheManager<S> {
    /// Create a cache manager with the default JSON codec.
    pub fn new(store: S) -> Self {
        Self {
            store,
            codec: JsonSerializer,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }
}

impl<S: KvStore, Z: Serializer> CacheManager<S, Z> {
    /// Create a cache manager with an explicit codec.
    pub fn with_serializer(store: S, codec: Z) -> Self {
        Self {
            store,
            codec,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }

    /// Override the SCAN batch size used by [`delete_by_pattern`](Self::delete_by_pattern).
    #[must_use]
    pub fn scan_batch_size(mut self, batch_size: usize) -> Self {
        self.scan_batch_size = batch_size.max(1);
        self
    }

    /// Fetch and decode a cached value.
    ///
    /// Fail-open: store failures and corrupt payloads are logged and
    /// reported as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match self.codec.decode(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Corrupt cache payload, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Encode and store a value with a TTL.
    ///
    /// Returns `false` on store or encoding failure; never errors.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let bytes = match self.codec.encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache encode failed");
                return false;
            }
        };
        match self.store.set(key, &bytes, ttl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Fetch a cached value, or produce, store, and return it on a miss.
    ///
    /// The producer is only invoked on a miss and its result is stored
    /// best-effort. Concurrent callers on the same cold key may each invoke
    /// the producer (cache stampede is tolerated, not eliminated): producers
    /// are expected to be idempotent reads whose results are equivalent.
    ///
    /// # Errors
    ///
    /// Propagates the producer's error unchanged; cache failures never
    /// surface here.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(hit) = self.get(key).await {
            tracing::debug!(key = %key, "Cache hit");
            return Ok(hit);
        }
        tracing::debug!(key = %key, "Cache miss, invoking producer");
        let produced = producer().await?;
        self.set(key, &produced, ttl).await;
        Ok(produced)
    }

    /// Delete a key. Returns `true` if it existed; `false` on failure or
    /// absence.
    pub async fn delete(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(existed) => existed,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    /// Delete all keys matching a glob pattern, in bounded scan batches.
    /// Returns the number deleted (0 on store failure).
    pub async fn delete_by_pattern(&self, pattern: &str) -> u64 {
        match self
            .store
            .delete_by_pattern(pattern, self.scan_batch_size)
            .await
        {
            Ok(count) => {
                tracing::debug!(pattern = %pattern, deleted = count, "Pattern invalidation");
                count
            }
            Err(e) => {
                tracing::error!(pattern = %pattern, error = %e, "Pattern invalidation failed");
                0
            }
        }
    }

    /// Remaining TTL for a key; `None` if absent, without expiry, or on
    /// store failure.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        match self.store.ttl(key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache TTL lookup failed");
                None
            }
        }
    }

    /// Shared access to the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }
}
