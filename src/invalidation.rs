//! Pattern-based cache invalidation triggered by domain mutations.
//!
//! Named invalidation operations run synchronously after a durable mutation
//! commits and before success is returned to the caller, so readers never
//! observe stale availability for longer than the cache TTL plus this
//! latency. Each operation also best-effort publishes the cleared pattern on
//! the bus so other instances can react (e.g. push a UI refresh).

use chrono::NaiveDate;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::providers::{KvStore, MessageBus};

/// Channel carrying invalidation signals.
pub const INVALIDATION_CHANNEL: &str = "cache.invalidated";

/// Cache key for a resource's availability on a date. Read paths populate
/// this key via the cache manager; the invalidator clears it on mutation.
#[must_use]
pub fn availability_cache_key(resource: &str, date: NaiveDate) -> String {
    format!("availability:{resource}:{date}")
}

/// Named bulk-invalidation operations over a [`CacheManager`].
#[derive(Clone)]
pub struct CacheInvalidator<S> {
    cache: CacheManager<S>,
    bus: Option<Arc<dyn MessageBus>>,
}

impl<S: KvStore> CacheInvalidator<S> {
    /// Create an invalidator without cross-instance signaling.
    pub fn new(store: S) -> Self {
        Self {
            cache: CacheManager::new(store),
            bus: None,
        }
    }

    /// Attach a bus for cross-instance invalidation signals.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Clear cached availability for one resource on one date. Returns the
    /// number of entries removed.
    pub async fn invalidate_availability(&self, resource: &str, date: NaiveDate) -> u64 {
        let pattern = format!("{}*", availability_cache_key(resource, date));
        self.invalidate_pattern(&pattern).await
    }

    /// Clear every cached read for a resource (availability on all dates,
    /// profile-style caches).
    pub async fn invalidate_resource(&self, resource: &str) -> u64 {
        let availability = format!("availability:{resource}:*");
        let profile = format!("resource:{resource}:*");
        self.invalidate_pattern(&availability).await + self.invalidate_pattern(&profile).await
    }

    /// Clear every per-user cache entry.
    pub async fn invalidate_user(&self, user_id: &str) -> u64 {
        let pattern = format!("user:{user_id}:*");
        self.invalidate_pattern(&pattern).await
    }

    /// Clear the entire cache.
    ///
    /// The escape hatch for any coordination bug: the cache is never the
    /// source of truth, so flushing it can only cost refetch latency.
    pub async fn invalidate_all(&self) -> u64 {
        self.invalidate_pattern("*").await
    }

    async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        let deleted = self.cache.delete_by_pattern(pattern).await;
        tracing::info!(pattern = %pattern, deleted, "Invalidated cache pattern");
        if let Some(bus) = &self.bus {
            if let Err(e) = bus.publish(INVALIDATION_CHANNEL, pattern.as_bytes()).await {
                tracing::warn!(pattern = %pattern, error = %e, "Invalidation signal not published");
            }
        }
        deleted
    }
}

#[cfg(all(test, feature = "test-utils"))]
mod tests {
    use super::*;
    use crate::mocks::{MockKvStore, MockMessageBus};
    use futures::StreamExt;
    use std::time::Duration;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default()
    }

    #[tokio::test]
    async fn availability_invalidation_is_scoped() {
        let store = MockKvStore::new();
        let cache = CacheManager::new(store.clone());
        let ttl = Duration::from_secs(60);

        cache.set(&availability_cache_key("venue-1", date()), &1u32, ttl).await;
        cache.set("availability:venue-1:2024-06-02", &2u32, ttl).await;
        cache.set(&availability_cache_key("venue-2", date()), &3u32, ttl).await;

        let invalidator = CacheInvalidator::new(store);
        let deleted = invalidator.invalidate_availability("venue-1", date()).await;
        assert_eq!(deleted, 1);

        let other_date: Option<u32> = cache.get("availability:venue-1:2024-06-02").await;
        let other_resource: Option<u32> = cache.get(&availability_cache_key("venue-2", date())).await;
        assert_eq!(other_date, Some(2));
        assert_eq!(other_resource, Some(3));
    }

    #[tokio::test]
    async fn user_invalidation_clears_all_user_keys() {
        let store = MockKvStore::new();
        let cache = CacheManager::new(store.clone());
        let ttl = Duration::from_secs(60);
        cache.set("user:u1:profile", &1u32, ttl).await;
        cache.set("user:u1:bookings", &2u32, ttl).await;
        cache.set("user:u2:profile", &3u32, ttl).await;

        let deleted = CacheInvalidator::new(store).invalidate_user("u1").await;
        assert_eq!(deleted, 2);
        let untouched: Option<u32> = cache.get("user:u2:profile").await;
        assert_eq!(untouched, Some(3));
    }

    #[tokio::test]
    async fn invalidate_all_flushes_everything() {
        let store = MockKvStore::new();
        let cache = CacheManager::new(store.clone());
        let ttl = Duration::from_secs(60);
        cache.set("a", &1u32, ttl).await;
        cache.set("b", &2u32, ttl).await;

        assert_eq!(CacheInvalidator::new(store).invalidate_all().await, 2);
        let gone: Option<u32> = cache.get("a").await;
        assert_eq!(gone, None);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn invalidation_signal_reaches_subscribers() {
        let bus = Arc::new(MockMessageBus::new());
        let mut signals = bus.subscribe(&[INVALIDATION_CHANNEL]).await.unwrap();

        let invalidator = CacheInvalidator::new(MockKvStore::new()).with_bus(bus);
        invalidator.invalidate_availability("venue-1", date()).await;

        let message = tokio::time::timeout(Duration::from_secs(1), signals.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.channel, INVALIDATION_CHANNEL);
        assert_eq!(message.payload, b"availability:venue-1:2024-06-01*");
    }
}
