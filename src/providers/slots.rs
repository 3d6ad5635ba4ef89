//! Durable booking-slot repository trait.
//!
//! The relational store is the system of record for slots; the cache is only
//! ever a derived copy. The conflict resolver calls these operations inside
//! its critical section, so implementations must be safe to invoke
//! concurrently for distinct resources.

use std::future::Future;

use crate::error::Result;
use crate::state::{BookingId, BookingSlot, ReservationRequest, SlotInterval, SlotStatus};

/// Durable storage for booking slots.
pub trait SlotRepository: Send + Sync {
    /// All `pending` or `confirmed` slots for `resource` whose interval
    /// overlaps `interval`. Cancelled slots never block the calendar.
    fn find_overlapping(
        &self,
        resource: &str,
        interval: &SlotInterval,
    ) -> impl Future<Output = Result<Vec<BookingSlot>>> + Send;

    /// Insert a new `pending` slot plus its dependent records (payment-intent
    /// stub) in one transaction. Returns the new booking id.
    fn insert_reservation(
        &self,
        resource: &str,
        interval: &SlotInterval,
        request: &ReservationRequest,
    ) -> impl Future<Output = Result<BookingId>> + Send;

    /// Transition a booking's status (confirm, cancel).
    fn update_status(
        &self,
        booking_id: BookingId,
        status: SlotStatus,
    ) -> impl Future<Output = Result<()>> + Send;
}
