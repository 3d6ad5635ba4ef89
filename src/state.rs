//! Domain types shared across the coordination layer.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoordinationError, Result};

/// Unique identifier for a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub Uuid);

impl BookingId {
    /// Generate a fresh booking id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A half-open `[start, end)` time window on a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInterval {
    /// Calendar date of the slot.
    pub date: NaiveDate,
    /// Inclusive start time.
    pub start: NaiveTime,
    /// Exclusive end time.
    pub end: NaiveTime,
}

impl SlotInterval {
    /// Build an interval, rejecting empty or inverted windows.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::InvalidInterval`] if `start >= end`.
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if start >= end {
            return Err(CoordinationError::InvalidInterval(format!(
                "start {start} must precede end {end}"
            )));
        }
        Ok(Self { date, start, end })
    }

    /// Whether two intervals occupy any common instant.
    ///
    /// Back-to-back slots (`a.end == b.start`) do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.date == other.date && self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for SlotInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}-{}", self.date, self.start, self.end)
    }
}

/// Lifecycle status of a booking slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    /// Reserved but not yet confirmed; still blocks the calendar.
    Pending,
    /// Confirmed booking.
    Confirmed,
    /// Cancelled; no longer blocks the calendar.
    Cancelled,
}

impl SlotStatus {
    /// Storage representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Database`] for unknown status strings.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoordinationError::Database(format!(
                "unknown slot status '{other}'"
            ))),
        }
    }

    /// Whether a slot in this status blocks overlapping reservations.
    #[must_use]
    pub const fn blocks_calendar(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

/// A reserved calendar slot as stored durably.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingSlot {
    /// Owning booking id.
    pub booking_id: BookingId,
    /// Resource whose calendar this slot occupies (e.g. a venue or performer).
    pub resource: String,
    /// Occupied time window.
    pub interval: SlotInterval,
    /// Current lifecycle status.
    pub status: SlotStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Session payload map plus lifecycle metadata, stored cache-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session token.
    pub session_id: SessionId,
    /// Arbitrary caller-owned payload.
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Application-level expiry, re-checked on every read as defense against
    /// clock skew between instances and the store.
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request was admitted.
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// Unix milliseconds at which the window resets.
    pub reset_at_ms: u64,
}

/// Caller-supplied details for a reservation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRequest {
    /// Name of the booking client.
    pub client_name: String,
    /// Contact email of the booking client.
    pub client_email: String,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Deposit amount for the payment-intent stub, in cents.
    pub amount_cents: Option<i64>,
    /// Client-generated idempotency key. When present, retries of the same
    /// logical request replay the first accepted outcome instead of creating
    /// a duplicate pending slot.
    pub idempotency_key: Option<String>,
}

/// Result of a reservation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReservationOutcome {
    /// The slot was reserved; a `pending` booking now holds the interval.
    Accepted {
        /// Id of the created (or idempotently replayed) booking.
        booking_id: BookingId,
    },
    /// The slot could not be reserved.
    Rejected {
        /// Why the attempt lost.
        reason: RejectionReason,
    },
}

impl ReservationOutcome {
    /// Whether the reservation was accepted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Why a reservation attempt was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Another booking holds an overlapping interval, or the lock could not
    /// be acquired within the retry budget. Lock-wait exhaustion is presented
    /// identically to a slot conflict: from the caller's perspective both
    /// mean "try again".
    Conflict {
        /// The already-booked interval, when known.
        conflicting: Option<SlotInterval>,
    },
}

impl RejectionReason {
    /// The already-booked interval behind a conflict, when known.
    #[must_use]
    pub const fn conflicting_interval(&self) -> Option<SlotInterval> {
        match self {
            Self::Conflict { conflicting } => *conflicting,
        }
    }
}

/// A message delivered over the pub/sub bus. At-most-once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    /// Channel the message was published on.
    pub channel: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: (u32, u32), end: (u32, u32)) -> SlotInterval {
        SlotInterval {
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default(),
            start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap_or_default(),
        }
    }

    #[test]
    fn rejects_inverted_interval() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default();
        let start = NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default();
        let end = NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default();
        assert!(matches!(
            SlotInterval::new(date, start, end),
            Err(CoordinationError::InvalidInterval(_))
        ));
        assert!(matches!(
            SlotInterval::new(date, start, start),
            Err(CoordinationError::InvalidInterval(_))
        ));
    }

    #[test]
    fn overlap_is_half_open() {
        let first = iv((20, 0), (23, 0));
        let adjacent = iv((23, 0), (23, 30));
        let nested = iv((21, 0), (22, 0));
        let straddling = iv((22, 30), (23, 30));

        assert!(!first.overlaps(&adjacent));
        assert!(!adjacent.overlaps(&first));
        assert!(first.overlaps(&nested));
        assert!(first.overlaps(&straddling));
        assert!(straddling.overlaps(&first));
    }

    #[test]
    fn different_dates_never_overlap() {
        let mut other = iv((20, 0), (23, 0));
        other.date = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap_or_default();
        assert!(!iv((20, 0), (23, 0)).overlaps(&other));
    }

    #[test]
    fn status_round_trip() {
        for status in [
            SlotStatus::Pending,
            SlotStatus::Confirmed,
            SlotStatus::Cancelled,
        ] {
            assert_eq!(SlotStatus::parse(status.as_str()).ok(), Some(status));
        }
        assert!(SlotStatus::parse("tentative").is_err());
        assert!(SlotStatus::Pending.blocks_calendar());
        assert!(!SlotStatus::Cancelled.blocks_calendar());
    }
}
