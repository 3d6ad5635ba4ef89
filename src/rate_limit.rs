//! Sliding-window rate limiter on the store's sorted-set primitive.
//!
//! Each identifier (IP, API key, account id) owns a sorted set of
//! `(timestamp, nonce)` members. A check prunes members older than the
//! trailing window, counts the survivors, and admits the request only while
//! the count is below the policy's maximum. The key carries its own expiry
//! so abandoned identifiers are reclaimed.
//!
//! Failure policy: if the store is unreachable the limiter **fails open**
//! (the request is allowed) and logs — availability beats strict throttling
//! for this non-critical-path control. Double bookings cannot result; only
//! abuse throttling degrades.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::RateLimitPolicy;
use crate::error::{CoordinationError, Result};
use crate::providers::KvStore;
use crate::state::RateLimitDecision;

/// Sliding-window rate limiter over a [`KvStore`].
#[derive(Debug, Clone)]
pub struct RateLimiter<S> {
    store: S,
}

impl<S: KvStore> RateLimiter<S> {
    /// Create a rate limiter.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    fn rate_key(identifier: &str) -> String {
        format!("rate_limit:{identifier}")
    }

    #[allow(clippy::cast_possible_truncation)] // Timestamps fit in u64 until year 584556019
    fn current_timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }

    /// Check whether `identifier` may make another request, recording it if
    /// admitted.
    ///
    /// Never errors: store failures fail open with a full-allowance
    /// decision.
    pub async fn check_limit(
        &self,
        identifier: &str,
        max_requests: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let now_ms = Self::current_timestamp_ms();
        #[allow(clippy::cast_possible_truncation)] // Windows are minutes/hours
        let window_ms = window.as_millis() as u64;

        match self
            .try_check(identifier, max_requests, window_ms, now_ms)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(
                    identifier = %identifier,
                    error = %e,
                    "Rate limit store failure, failing open"
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: max_requests.saturating_sub(1),
                    reset_at_ms: now_ms + window_ms,
                }
            }
        }
    }

    /// Check against a named policy.
    pub async fn check_policy(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> RateLimitDecision {
        self.check_limit(identifier, policy.max_requests, policy.window())
            .await
    }

    /// Like [`check_limit`](Self::check_limit), but surfaces a rejection as
    /// a typed error carrying the retry-after delay.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::RateLimited`] when the window is full.
    pub async fn enforce(
        &self,
        identifier: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        let decision = self.check_limit(identifier, max_requests, window).await;
        if decision.allowed {
            Ok(decision)
        } else {
            let now_ms = Self::current_timestamp_ms();
            Err(CoordinationError::RateLimited {
                retry_after: Duration::from_millis(decision.reset_at_ms.saturating_sub(now_ms)),
            })
        }
    }

    /// Forget all recorded requests for an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::StoreUnavailable`] if the delete fails.
    pub async fn reset(&self, identifier: &str) -> Result<()> {
        let key = Self::rate_key(identifier);
        self.store.delete(&key).await?;
        tracing::info!(identifier = %identifier, "Reset rate limit");
        Ok(())
    }

    async fn try_check(
        &self,
        identifier: &str,
        max_requests: u32,
        window_ms: u64,
        now_ms: u64,
    ) -> Result<RateLimitDecision> {
        let key = Self::rate_key(identifier);
        let window_start = now_ms.saturating_sub(window_ms);

        // Lazily prune entries that slid out of the window.
        self.store.zremove_below(&key, window_start).await?;

        let count = self.store.zcard(&key).await?;
        if count >= u64::from(max_requests) {
            let oldest = self.store.zoldest_score(&key).await?.unwrap_or(now_ms);
            tracing::warn!(
                rate_limit_exceeded = true,
                identifier = %identifier,
                count,
                max_requests,
                window_ms,
                "Rate limit exceeded"
            );
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at_ms: oldest + window_ms,
            });
        }

        // Timestamp plus nonce so two requests in the same millisecond
        // cannot collide on the member.
        let member = format!("{now_ms}-{:08x}", rand::random::<u32>());
        self.store.zadd(&key, &member, now_ms).await?;
        self.store
            .expire(&key, Duration::from_secs(window_ms.div_ceil(1000)))
            .await?;

        #[allow(clippy::cast_possible_truncation)] // count < max_requests: u32
        let remaining = max_requests - count as u32 - 1;
        tracing::debug!(
            identifier = %identifier,
            admitted = count + 1,
            max_requests,
            "Rate limit check passed"
        );
        Ok(RateLimitDecision {
            allowed: true,
            remaining,
            reset_at_ms: now_ms + window_ms,
        })
    }
}
