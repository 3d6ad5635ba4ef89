//! Cache-backed session lifecycle.
//!
//! Sessions live entirely in the shared store under `session:{id}` with a
//! TTL (default: the daily tier). A session is owned by whichever request
//! created it, mutated only by the holder of its id, and destroyed on logout
//! or expiry. Updates refresh the TTL (sliding window), so active sessions
//! stay alive.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::cache::CacheManager;
use crate::error::{CoordinationError, Result};
use crate::providers::KvStore;
use crate::state::{SessionId, SessionRecord};

/// Session store over a [`CacheManager`].
#[derive(Debug, Clone)]
pub struct SessionStore<S> {
    cache: CacheManager<S>,
    default_ttl: Duration,
}

impl<S: KvStore> SessionStore<S> {
    /// Create a session store with the given default TTL.
    pub fn new(store: S, default_ttl: Duration) -> Self {
        Self {
            cache: CacheManager::new(store),
            default_ttl,
        }
    }

    fn session_key(session_id: SessionId) -> String {
        format!("session:{session_id}")
    }

    /// Expiry saturates at the far future, so an oversized TTL can only make
    /// a session outlive its store entry, never hand out a born-expired one.
    fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Create a session holding `data`, expiring after `ttl` (or the default
    /// when `None`). Returns the fresh session id.
    ///
    /// Unlike cache reads, creation is fail-closed: a session id must never
    /// be handed out unless the record is actually stored.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::StoreUnavailable`] if the write fails.
    pub async fn create(
        &self,
        data: serde_json::Map<String, serde_json::Value>,
        ttl: Option<Duration>,
    ) -> Result<SessionId> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let now = Utc::now();
        let record = SessionRecord {
            session_id: SessionId::new(),
            data,
            created_at: now,
            expires_at: Self::expiry_after(now, ttl),
        };
        let key = Self::session_key(record.session_id);
        if !self.cache.set(&key, &record, ttl).await {
            return Err(CoordinationError::StoreUnavailable(
                "session create not stored".into(),
            ));
        }
        tracing::info!(session_id = %record.session_id, ttl_secs = ttl.as_secs(), "Created session");
        Ok(record.session_id)
    }

    /// Fetch a session.
    ///
    /// The store's TTL normally removes expired sessions, but `expires_at`
    /// is re-checked application-side to guard against clock skew and TTL
    /// manipulation.
    ///
    /// # Errors
    ///
    /// [`CoordinationError::SessionNotFound`] if absent,
    /// [`CoordinationError::SessionExpired`] if past its recorded expiry.
    pub async fn get(&self, session_id: SessionId) -> Result<SessionRecord> {
        let key = Self::session_key(session_id);
        let record: SessionRecord = self
            .cache
            .get(&key)
            .await
            .ok_or(CoordinationError::SessionNotFound)?;

        if record.expires_at < Utc::now() {
            tracing::warn!(
                session_id = %session_id,
                expires_at = %record.expires_at,
                "Session past expiry despite store TTL"
            );
            return Err(CoordinationError::SessionExpired);
        }
        Ok(record)
    }

    /// Replace a session's payload and refresh its TTL to the default
    /// (sliding window).
    ///
    /// # Errors
    ///
    /// Propagates [`get`](Self::get) errors; returns
    /// [`CoordinationError::StoreUnavailable`] if the rewrite fails.
    pub async fn update(
        &self,
        session_id: SessionId,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let mut record = self.get(session_id).await?;
        record.data = data;
        self.store_refreshed(record, self.default_ttl).await
    }

    /// Extend a session's lifetime to `ttl` from now without touching its
    /// payload.
    ///
    /// # Errors
    ///
    /// Propagates [`get`](Self::get) errors; returns
    /// [`CoordinationError::StoreUnavailable`] if the rewrite fails.
    pub async fn extend(&self, session_id: SessionId, ttl: Duration) -> Result<()> {
        let record = self.get(session_id).await?;
        self.store_refreshed(record, ttl).await
    }

    /// Destroy a session. Destroying an absent session is not an error.
    pub async fn destroy(&self, session_id: SessionId) {
        let key = Self::session_key(session_id);
        if self.cache.delete(&key).await {
            tracing::info!(session_id = %session_id, "Destroyed session");
        }
    }

    async fn store_refreshed(&self, mut record: SessionRecord, ttl: Duration) -> Result<()> {
        record.expires_at = Self::expiry_after(Utc::now(), ttl);
        let key = Self::session_key(record.session_id);
        if !self.cache.set(&key, &record, ttl).await {
            return Err(CoordinationError::StoreUnavailable(
                "session update not stored".into(),
            ));
        }
        tracing::debug!(
            session_id = %record.session_id,
            ttl_secs = ttl.as_secs(),
            "Refreshed session TTL"
        );
        Ok(())
    }
}
