//! Redis implementation of the key-value store adapter.
//!
//! Uses a [`ConnectionManager`] for pooling and reconnection. The two
//! atomic primitives map to Redis as:
//! - set-if-absent-with-expiry → `SET key value NX PX ms`
//! - compare-and-delete → a Lua script (GET, compare, DEL server-side)
//!
//! Pattern deletion walks the keyspace with cursor-based `SCAN` in bounded
//! batches so large keyspaces never block the store.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

use crate::error::{CoordinationError, Result};
use crate::providers::KvStore;

/// Atomic compare-then-delete. Prevents a stale lock holder from deleting a
/// successor's lock after lease expiry.
const COMPARE_AND_DELETE: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    else
        return 0
    end
"#;

/// Redis-backed [`KvStore`].
#[derive(Clone)]
pub struct RedisKvStore {
    conn_manager: ConnectionManager,
}

impl RedisKvStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::StoreUnavailable`] if the client or
    /// connection manager cannot be created.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            CoordinationError::StoreUnavailable(format!("Failed to create Redis client: {e}"))
        })?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CoordinationError::StoreUnavailable(format!(
                "Failed to create Redis connection manager: {e}"
            ))
        })?;
        Ok(Self { conn_manager })
    }

    #[allow(clippy::cast_possible_truncation)] // TTLs are seconds/hours, far below u64::MAX ms
    const fn ttl_ms(ttl: Duration) -> u64 {
        ttl.as_millis() as u64
    }
}

impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(Self::ttl_ms(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        // SET ... NX returns OK on success and nil when the key exists.
        let outcome: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(Self::ttl_ms(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(outcome.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let script = redis::Script::new(COMPARE_AND_DELETE);
        let removed: u64 = script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn_manager.clone();
        let ttl_ms: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        // -2: key absent, -1: no expiry.
        match ttl_ms {
            ms if ms > 0 => {
                #[allow(clippy::cast_sign_loss)]
                Ok(Some(Duration::from_millis(ms as u64)))
            }
            _ => Ok(None),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let applied: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(Self::ttl_ms(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(applied)
    }

    async fn delete_by_pattern(&self, pattern: &str, batch_size: usize) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(batch_size)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let removed: u64 = conn.del(&keys).await?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(deleted)
    }

    async fn zadd(&self, key: &str, member: &str, score: u64) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let count: u64 = conn.zcard(key).await?;
        Ok(count)
    }

    async fn zremove_below(&self, key: &str, min_score: u64) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        // Exclusive upper bound: strictly below min_score.
        let removed: u64 = conn
            .zrembyscore(key, "-inf", format!("({min_score}"))
            .await?;
        Ok(removed)
    }

    async fn zoldest_score(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.conn_manager.clone();
        let oldest: Vec<(String, u64)> = conn.zrange_withscores(key, 0, 0).await?;
        Ok(oldest.first().map(|(_, score)| *score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis instance:
    // docker run -d -p 6379:6379 redis:7-alpine

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    fn unique(prefix: &str) -> String {
        format!("{prefix}:{}", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn string_round_trip_with_ttl() {
        let store = RedisKvStore::connect(REDIS_URL).await.unwrap();
        let key = unique("test:kv");

        store
            .set(&key, b"value", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(b"value".to_vec()));
        assert!(store.exists(&key).await.unwrap());
        assert!(store.ttl(&key).await.unwrap().is_some());

        assert!(store.delete(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn set_if_absent_is_exclusive() {
        let store = RedisKvStore::connect(REDIS_URL).await.unwrap();
        let key = unique("test:nx");

        assert!(
            store
                .set_if_absent(&key, b"first", Duration::from_secs(30))
                .await
                .unwrap()
        );
        assert!(
            !store
                .set_if_absent(&key, b"second", Duration::from_secs(30))
                .await
                .unwrap()
        );
        assert_eq!(store.get(&key).await.unwrap(), Some(b"first".to_vec()));

        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn compare_and_delete_checks_the_value() {
        let store = RedisKvStore::connect(REDIS_URL).await.unwrap();
        let key = unique("test:cad");

        store
            .set(&key, b"token-a", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(!store.compare_and_delete(&key, b"token-b").await.unwrap());
        assert!(store.exists(&key).await.unwrap());
        assert!(store.compare_and_delete(&key, b"token-a").await.unwrap());
        assert!(!store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn pattern_delete_scans_in_batches() {
        let store = RedisKvStore::connect(REDIS_URL).await.unwrap();
        let prefix = unique("test:pattern");

        for i in 0..25 {
            store
                .set(&format!("{prefix}:{i}"), b"x", Duration::from_secs(30))
                .await
                .unwrap();
        }
        let deleted = store
            .delete_by_pattern(&format!("{prefix}:*"), 10)
            .await
            .unwrap();
        assert_eq!(deleted, 25);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn sorted_set_window_primitives() {
        let store = RedisKvStore::connect(REDIS_URL).await.unwrap();
        let key = unique("test:zset");

        store.zadd(&key, "a", 100).await.unwrap();
        store.zadd(&key, "b", 200).await.unwrap();
        store.zadd(&key, "c", 300).await.unwrap();
        assert_eq!(store.zcard(&key).await.unwrap(), 3);
        assert_eq!(store.zoldest_score(&key).await.unwrap(), Some(100));

        assert_eq!(store.zremove_below(&key, 200).await.unwrap(), 1);
        assert_eq!(store.zoldest_score(&key).await.unwrap(), Some(200));

        store.delete(&key).await.unwrap();
    }
}
