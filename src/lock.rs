//! Distributed mutual-exclusion lock with a bounded lease.
//!
//! Acquisition is an atomic set-if-not-exists-with-expiry storing a fresh
//! random token; contention is handled with bounded sleep-and-retry, never
//! indefinite blocking. Release is an atomic compare-token-then-delete, so a
//! holder whose lease expired can never remove a successor's lock.
//!
//! The lease bounds worst-case hold time if a holder crashes: liveness is
//! preserved at the cost of a bounded unsafe window where a new holder may
//! start before the crashed holder's critical section truly finished.
//! Critical sections must therefore be re-checked against durable state,
//! which the booking conflict resolver does with its verify step.

use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CoordinationError, Result};
use crate::providers::KvStore;

/// Proof of lock ownership: the key plus the random token stored under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    key: String,
    token: String,
}

impl LockGuard {
    /// The locked resource key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The owner-unique token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Distributed lock over a [`KvStore`].
#[derive(Debug, Clone)]
pub struct DistributedLock<S> {
    store: S,
}

impl<S: KvStore> DistributedLock<S> {
    /// Create a lock manager.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Try to acquire `lock_key` for `lease`, retrying up to `max_retries`
    /// times with `retry_delay` between attempts.
    ///
    /// Returns `None` when the retry budget is exhausted: a normal
    /// contention outcome, not an error. Store failures during an attempt
    /// count as a failed attempt (fail closed) and are logged.
    pub async fn acquire(
        &self,
        lock_key: &str,
        lease: Duration,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Option<LockGuard> {
        let token = Uuid::new_v4().to_string();

        for attempt in 0..=max_retries {
            match self
                .store
                .set_if_absent(lock_key, token.as_bytes(), lease)
                .await
            {
                Ok(true) => {
                    tracing::debug!(lock_key = %lock_key, attempt, "Acquired lock");
                    return Some(LockGuard {
                        key: lock_key.to_string(),
                        token,
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        lock_key = %lock_key,
                        attempt,
                        error = %e,
                        "Lock attempt failed against store"
                    );
                }
            }
            if attempt < max_retries {
                tokio::time::sleep(retry_delay).await;
            }
        }

        tracing::debug!(
            lock_key = %lock_key,
            max_retries,
            "Lock retry budget exhausted"
        );
        None
    }

    /// Release a held lock. Returns `true` if this call removed the lock.
    ///
    /// Owner-checked: if the lease already expired and another holder took
    /// the key, the compare-and-delete is a no-op and this returns `false`.
    pub async fn release(&self, guard: &LockGuard) -> bool {
        match self
            .store
            .compare_and_delete(&guard.key, guard.token.as_bytes())
            .await
        {
            Ok(true) => {
                tracing::debug!(lock_key = %guard.key, "Released lock");
                true
            }
            Ok(false) => {
                tracing::warn!(
                    lock_key = %guard.key,
                    "Release skipped: token no longer holds the lock"
                );
                false
            }
            Err(e) => {
                tracing::error!(lock_key = %guard.key, error = %e, "Lock release failed");
                false
            }
        }
    }

    /// Run `critical` while holding `lock_key`, releasing on every exit
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::LockContention`] when the retry budget is
    /// exhausted; otherwise propagates the critical section's error after
    /// releasing the lock.
    pub async fn with_lock<T, F, Fut>(
        &self,
        lock_key: &str,
        lease: Duration,
        max_retries: u32,
        retry_delay: Duration,
        critical: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(guard) = self.acquire(lock_key, lease, max_retries, retry_delay).await else {
            return Err(CoordinationError::LockContention {
                lock_key: lock_key.to_string(),
            });
        };
        let result = critical().await;
        self.release(&guard).await;
        result
    }
}
