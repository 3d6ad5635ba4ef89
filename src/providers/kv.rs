//! Key-value store adapter trait.
//!
//! Thin seam over the shared store's primitives. Every higher component
//! (cache, sessions, rate limiter, lock) is generic over this trait, so it
//! runs identically against Redis in production and the in-memory mock in
//! tests.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Operations the shared key-value service must provide.
///
/// Atomicity requirements:
/// - [`set_if_absent`](Self::set_if_absent) is an atomic
///   set-if-not-exists-with-expiry (lock acquisition).
/// - [`compare_and_delete`](Self::compare_and_delete) is an atomic
///   compare-then-delete (owner-checked lock release). Any store with
///   transactions or server-side scripting can implement it.
pub trait KvStore: Send + Sync {
    /// Fetch raw bytes for a key, `None` if absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store bytes under a key with a TTL.
    fn set(&self, key: &str, value: &[u8], ttl: Duration)
    -> impl Future<Output = Result<()>> + Send;

    /// Store bytes with a TTL only if the key does not exist. Returns `true`
    /// if the write happened.
    fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Delete a key. Returns `true` if it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Atomically delete a key only if its current value equals `expected`.
    /// Returns `true` if the delete happened.
    fn compare_and_delete(
        &self,
        key: &str,
        expected: &[u8],
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Whether a key exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Remaining TTL for a key; `None` if absent or without expiry.
    fn ttl(&self, key: &str) -> impl Future<Output = Result<Option<Duration>>> + Send;

    /// Set or refresh a key's TTL. Returns `false` if the key is absent.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<bool>> + Send;

    /// Delete all keys matching a glob pattern, scanning in batches of
    /// `batch_size` so the store is never blocked on large keyspaces.
    /// Returns the number of keys deleted.
    fn delete_by_pattern(
        &self,
        pattern: &str,
        batch_size: usize,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Add a member to a sorted set with the given score.
    fn zadd(&self, key: &str, member: &str, score: u64)
    -> impl Future<Output = Result<()>> + Send;

    /// Number of members in a sorted set.
    fn zcard(&self, key: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Remove all members with score strictly below `min_score`. Returns the
    /// number removed.
    fn zremove_below(&self, key: &str, min_score: u64)
    -> impl Future<Output = Result<u64>> + Send;

    /// Score of the lowest-scored member, `None` if the set is empty.
    fn zoldest_score(&self, key: &str) -> impl Future<Output = Result<Option<u64>>> + Send;
}
