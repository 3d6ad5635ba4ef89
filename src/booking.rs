//! Race-free booking-slot reservation.
//!
//! The resolver composes the distributed lock, the durable slot repository,
//! and the cache invalidator so that a calendar slot is sold at most once
//! despite concurrent requests across instances:
//!
//! 1. **LockWait** — acquire a named lock for the resource's time window.
//!    Retry exhaustion is reported as a conflict, identical to a slot
//!    conflict from the caller's perspective.
//! 2. **Verify** — holding the lock, re-check durable storage for any
//!    `pending` or `confirmed` slot overlapping the requested interval. The
//!    lock alone is not enough: a previous holder's lease may have expired
//!    mid-write, so durable state is always the arbiter.
//! 3. **Commit** — insert the `pending` slot and its dependent records in
//!    one transaction. Storage failure here is fatal for the request
//!    (fail closed).
//! 4. **Finalize** — release the lock, invalidate cached availability,
//!    best-effort publish `booking.created`.
//!
//! Verify and commit run under a deadline so a hung store call cannot hang
//! the booking request; on expiry the lock is still released before the
//! error returns. Read paths (availability queries) never take the lock.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheManager;
use crate::config::{BookingConfig, LockConfig};
use crate::error::{CoordinationError, Result};
use crate::invalidation::CacheInvalidator;
use crate::lock::DistributedLock;
use crate::providers::{KvStore, MessageBus, SlotRepository};
use crate::state::{
    BookingId, RejectionReason, ReservationOutcome, ReservationRequest, SlotInterval, SlotStatus,
};

/// Channel carrying accepted-reservation events.
pub const BOOKING_CREATED_CHANNEL: &str = "booking.created";

/// Payload published on [`BOOKING_CREATED_CHANNEL`].
#[derive(Debug, Serialize)]
struct BookingCreatedEvent<'a> {
    booking_id: BookingId,
    resource: &'a str,
    interval: &'a SlotInterval,
}

/// The booking conflict resolver.
///
/// First writer to pass the verify step inside the lock wins; all others are
/// rejected regardless of arrival order outside the lock. No queueing or
/// priority is implemented.
#[derive(Clone)]
pub struct BookingConflictResolver<S, R> {
    lock: DistributedLock<S>,
    cache: CacheManager<S>,
    invalidator: CacheInvalidator<S>,
    slots: R,
    bus: Option<Arc<dyn MessageBus>>,
    lock_config: LockConfig,
    booking_config: BookingConfig,
}

impl<S: KvStore + Clone, R: SlotRepository> BookingConflictResolver<S, R> {
    /// Create a resolver over a shared store and a slot repository.
    pub fn new(
        store: S,
        slots: R,
        lock_config: LockConfig,
        booking_config: BookingConfig,
    ) -> Self {
        Self {
            lock: DistributedLock::new(store.clone()),
            cache: CacheManager::new(store.clone()),
            invalidator: CacheInvalidator::new(store),
            slots,
            bus: None,
            lock_config,
            booking_config,
        }
    }

    /// Attach a bus: `booking.created` events and invalidation signals are
    /// published to it after a successful reservation.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.invalidator = self.invalidator.clone().with_bus(Arc::clone(&bus));
        self.bus = Some(bus);
        self
    }

    fn lock_key(resource: &str, interval: &SlotInterval) -> String {
        format!(
            "booking:lock:{resource}:{}:{}",
            interval.date, interval.start
        )
    }

    fn idempotency_key(key: &str) -> String {
        format!("booking:idem:{key}")
    }

    /// Reserve `interval` on `resource` exactly once.
    ///
    /// Returns [`ReservationOutcome::Rejected`] for both slot conflicts and
    /// lock-wait exhaustion: from the caller's perspective both mean "try
    /// again". When the request carries an idempotency key, a retry after a
    /// lost response replays the first accepted outcome instead of creating
    /// a duplicate pending slot.
    ///
    /// # Errors
    ///
    /// [`CoordinationError::InvalidInterval`] for malformed intervals,
    /// [`CoordinationError::Database`] if the commit fails,
    /// [`CoordinationError::DeadlineExceeded`] if verify/commit overrun the
    /// configured deadline. All error paths release the lock first.
    pub async fn reserve(
        &self,
        resource: &str,
        interval: SlotInterval,
        request: ReservationRequest,
    ) -> Result<ReservationOutcome> {
        // Reject malformed intervals before touching any shared state.
        let interval = SlotInterval::new(interval.date, interval.start, interval.end)?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(booking_id) = self.cache.get::<BookingId>(&Self::idempotency_key(key)).await
            {
                tracing::info!(
                    resource = %resource,
                    booking_id = %booking_id.0,
                    "Replaying idempotent reservation"
                );
                return Ok(ReservationOutcome::Accepted { booking_id });
            }
        }

        let lock_key = Self::lock_key(resource, &interval);
        let Some(guard) = self
            .lock
            .acquire(
                &lock_key,
                self.lock_config.lease(),
                self.lock_config.max_retries,
                self.lock_config.retry_delay(),
            )
            .await
        else {
            tracing::info!(
                resource = %resource,
                interval = %interval,
                "Reservation rejected: lock contention"
            );
            return Ok(ReservationOutcome::Rejected {
                reason: RejectionReason::Conflict { conflicting: None },
            });
        };

        let verdict = self
            .verify_and_commit(resource, &interval, &request, self.booking_config.deadline())
            .await;

        // The lock is released on every path, including deadline expiry, so
        // the resource key is never left locked until lease expiry.
        self.lock.release(&guard).await;

        match verdict {
            Ok(booking_id) => {
                self.finalize(resource, &interval, &request, booking_id).await;
                Ok(ReservationOutcome::Accepted { booking_id })
            }
            Err(CoordinationError::SlotConflict { conflicting, .. }) => {
                tracing::info!(
                    resource = %resource,
                    interval = %interval,
                    conflicting = %conflicting,
                    "Reservation rejected: slot conflict"
                );
                Ok(ReservationOutcome::Rejected {
                    reason: RejectionReason::Conflict {
                        conflicting: Some(conflicting),
                    },
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Confirm a pending booking and invalidate the affected availability.
    ///
    /// # Errors
    ///
    /// Propagates repository errors.
    pub async fn confirm(
        &self,
        booking_id: BookingId,
        resource: &str,
        interval: &SlotInterval,
    ) -> Result<()> {
        self.slots
            .update_status(booking_id, SlotStatus::Confirmed)
            .await?;
        self.invalidator
            .invalidate_availability(resource, interval.date)
            .await;
        tracing::info!(booking_id = %booking_id.0, resource = %resource, "Confirmed booking");
        Ok(())
    }

    /// Cancel a booking, freeing its interval, and invalidate the affected
    /// availability.
    ///
    /// # Errors
    ///
    /// Propagates repository errors.
    pub async fn cancel(
        &self,
        booking_id: BookingId,
        resource: &str,
        interval: &SlotInterval,
    ) -> Result<()> {
        self.slots
            .update_status(booking_id, SlotStatus::Cancelled)
            .await?;
        self.invalidator
            .invalidate_availability(resource, interval.date)
            .await;
        tracing::info!(booking_id = %booking_id.0, resource = %resource, "Cancelled booking");
        Ok(())
    }

    async fn verify_and_commit(
        &self,
        resource: &str,
        interval: &SlotInterval,
        request: &ReservationRequest,
        deadline: Duration,
    ) -> Result<BookingId> {
        let phase = async {
            let overlapping = self.slots.find_overlapping(resource, interval).await?;
            if let Some(existing) = overlapping.first() {
                return Err(CoordinationError::SlotConflict {
                    resource: resource.to_string(),
                    conflicting: existing.interval,
                });
            }
            self.slots
                .insert_reservation(resource, interval, request)
                .await
        };

        match tokio::time::timeout(deadline, phase).await {
            Ok(verdict) => verdict,
            Err(_) => {
                tracing::error!(
                    resource = %resource,
                    interval = %interval,
                    deadline_ms = deadline.as_millis() as u64,
                    "Reservation verify/commit overran its deadline"
                );
                Err(CoordinationError::DeadlineExceeded)
            }
        }
    }

    async fn finalize(
        &self,
        resource: &str,
        interval: &SlotInterval,
        request: &ReservationRequest,
        booking_id: BookingId,
    ) {
        self.invalidator
            .invalidate_availability(resource, interval.date)
            .await;

        if let Some(key) = request.idempotency_key.as_deref() {
            self.cache
                .set(
                    &Self::idempotency_key(key),
                    &booking_id,
                    self.booking_config.idempotency_ttl(),
                )
                .await;
        }

        if let Some(bus) = &self.bus {
            let event = BookingCreatedEvent {
                booking_id,
                resource,
                interval,
            };
            match serde_json::to_vec(&event) {
                Ok(payload) => {
                    if let Err(e) = bus.publish(BOOKING_CREATED_CHANNEL, &payload).await {
                        tracing::warn!(error = %e, "booking.created event not published");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "booking.created event not serialized"),
            }
        }

        tracing::info!(
            booking_id = %booking_id.0,
            resource = %resource,
            interval = %interval,
            "Reservation accepted"
        );
    }
}
