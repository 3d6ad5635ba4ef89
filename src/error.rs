//! Error types for coordination-layer operations.

use thiserror::Error;

use crate::state::SlotInterval;

/// Result type alias for coordination operations.
pub type Result<T> = std::result::Result<T, CoordinationError>;

/// Error taxonomy for the coordination layer.
///
/// Conflict-class variants (`LockContention`, `SlotConflict`, `RateLimited`)
/// are expected outcomes, not failures: callers should map them to a
/// "try again" response. Only `Database` errors raised during a reservation
/// commit are internal failures from the caller's point of view.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoordinationError {
    /// The shared key-value store could not be reached or refused the
    /// operation.
    ///
    /// Cache and rate-limiter paths swallow this (fail open); lock and
    /// booking paths surface it as "not acquired" / "rejected" (fail closed).
    #[error("Key-value store unavailable: {0}")]
    StoreUnavailable(String),

    /// A cached payload could not be encoded or decoded.
    ///
    /// On the read path this is treated as a cache miss, never propagated to
    /// the caller.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Durable-storage operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Session not found.
    #[error("Session not found")]
    SessionNotFound,

    /// Session exists but its recorded expiry has passed.
    #[error("Session has expired")]
    SessionExpired,

    /// Too many requests within the sliding window.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Duration to wait before the window admits another request.
        retry_after: std::time::Duration,
    },

    /// The lock could not be acquired within the retry budget.
    #[error("Lock contention on '{lock_key}'")]
    LockContention {
        /// The contested lock key.
        lock_key: String,
    },

    /// Another booking already occupies an overlapping interval.
    #[error("Slot conflict on '{resource}': overlaps {conflicting}")]
    SlotConflict {
        /// Resource whose calendar is contested.
        resource: String,
        /// The interval already booked.
        conflicting: SlotInterval,
    },

    /// The requested interval is malformed (e.g. start >= end).
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// Pub/sub publish or subscribe failed.
    #[error("Message bus error: {0}")]
    Bus(String),

    /// The reservation deadline elapsed before verify/commit finished.
    #[error("Reservation deadline exceeded")]
    DeadlineExceeded,
}

impl CoordinationError {
    /// Returns `true` if this error is an expected contention outcome that
    /// callers should present as "try again" (HTTP 409-equivalent).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::LockContention { .. } | Self::SlotConflict { .. } | Self::RateLimited { .. }
        )
    }

    /// Returns `true` if retrying later may succeed without any caller-side
    /// change.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::DeadlineExceeded | Self::Bus(_)
        )
    }
}

impl From<redis::RedisError> for CoordinationError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<sqlx::Error> for CoordinationError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn interval() -> SlotInterval {
        SlotInterval {
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default(),
            start: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default(),
        }
    }

    #[test]
    fn conflict_classification() {
        assert!(
            CoordinationError::LockContention {
                lock_key: "k".into()
            }
            .is_conflict()
        );
        assert!(
            CoordinationError::SlotConflict {
                resource: "venue-1".into(),
                conflicting: interval(),
            }
            .is_conflict()
        );
        assert!(!CoordinationError::SessionNotFound.is_conflict());
    }

    #[test]
    fn transient_classification() {
        assert!(CoordinationError::StoreUnavailable("down".into()).is_transient());
        assert!(CoordinationError::DeadlineExceeded.is_transient());
        assert!(!CoordinationError::SessionExpired.is_transient());
    }
}
