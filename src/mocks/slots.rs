//! In-memory slot repository for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::error::{CoordinationError, Result};
use crate::providers::SlotRepository;
use crate::state::{BookingId, BookingSlot, ReservationRequest, SlotInterval, SlotStatus};

/// In-memory [`SlotRepository`]. `fail_inserts(true)` makes commits fail,
/// for exercising rollback and lock-release paths; `stall(true)` makes
/// queries hang, for exercising deadline paths.
#[derive(Debug, Clone, Default)]
pub struct MockSlotRepository {
    slots: Arc<Mutex<Vec<BookingSlot>>>,
    fail_inserts: Arc<AtomicBool>,
    stall: Arc<AtomicBool>,
}

impl MockSlotRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated insert failure.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Toggle simulated query hang: while set, [`SlotRepository`] calls
    /// never complete.
    pub fn stall(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }

    async fn maybe_stall(&self) {
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    /// Number of stored slots, regardless of status.
    pub async fn slot_count(&self) -> usize {
        self.guard().map(|slots| slots.len()).unwrap_or(0)
    }

    /// Look up a slot by booking id.
    pub async fn get(&self, booking_id: BookingId) -> Option<BookingSlot> {
        self.guard()
            .ok()
            .and_then(|slots| slots.iter().find(|s| s.booking_id == booking_id).cloned())
    }

    fn guard(&self) -> Result<MutexGuard<'_, Vec<BookingSlot>>> {
        self.slots
            .lock()
            .map_err(|_| CoordinationError::Database("mutex poisoned".into()))
    }
}

impl SlotRepository for MockSlotRepository {
    async fn find_overlapping(
        &self,
        resource: &str,
        interval: &SlotInterval,
    ) -> Result<Vec<BookingSlot>> {
        self.maybe_stall().await;
        let slots = self.guard()?;
        Ok(slots
            .iter()
            .filter(|slot| {
                slot.resource == resource
                    && slot.status.blocks_calendar()
                    && slot.interval.overlaps(interval)
            })
            .cloned()
            .collect())
    }

    async fn insert_reservation(
        &self,
        resource: &str,
        interval: &SlotInterval,
        _request: &ReservationRequest,
    ) -> Result<BookingId> {
        self.maybe_stall().await;
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(CoordinationError::Database(
                "simulated insert failure".into(),
            ));
        }
        let booking_id = BookingId::new();
        let mut slots = self.guard()?;
        slots.push(BookingSlot {
            booking_id,
            resource: resource.to_string(),
            interval: *interval,
            status: SlotStatus::Pending,
            created_at: Utc::now(),
        });
        Ok(booking_id)
    }

    async fn update_status(&self, booking_id: BookingId, status: SlotStatus) -> Result<()> {
        let mut slots = self.guard()?;
        match slots.iter_mut().find(|s| s.booking_id == booking_id) {
            Some(slot) => {
                slot.status = status;
                Ok(())
            }
            None => Err(CoordinationError::Database(format!(
                "no slot for booking {booking_id}"
            ))),
        }
    }
}
