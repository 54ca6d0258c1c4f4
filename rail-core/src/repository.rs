use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rail_catalog::SeatInventory;

use crate::booking::{Booking, BookingStatus, NewBooking};
use crate::page::Page;
use crate::schedule::{ScheduleDetails, ScheduleSnapshot};
use crate::CoreResult;

/// Outcome of a guarded status change.
#[derive(Debug, Clone, PartialEq)]
pub enum Finalized {
    /// The booking moved out of `Pending` and the ledger change was applied.
    Applied(Booking),
    /// The booking had already left `Pending`; nothing was changed.
    Unchanged(Booking),
}

impl Finalized {
    pub fn booking(&self) -> &Booking {
        match self {
            Finalized::Applied(b) | Finalized::Unchanged(b) => b,
        }
    }

    pub fn into_booking(self) -> Booking {
        match self {
            Finalized::Applied(b) | Finalized::Unchanged(b) => b,
        }
    }

    pub fn applied(&self) -> bool {
        matches!(self, Finalized::Applied(_))
    }
}

/// Read access to the schedule collaborator.
#[async_trait]
pub trait ScheduleCatalog: Send + Sync {
    async fn schedule_snapshot(&self, schedule_id: i64) -> CoreResult<Option<ScheduleSnapshot>>;

    async fn schedule_details(&self, schedule_id: i64) -> CoreResult<Option<ScheduleDetails>>;
}

/// Transactional store owning booking rows and the seat ledger.
///
/// Every mutating method is one atomic unit: booking row and ledger counters
/// change together or not at all.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Hold seats and insert a pending booking.
    ///
    /// Fails with `SeatsUnavailable` when the schedule lacks capacity and with
    /// `DuplicateBookingCode` when the code is taken; neither leaves a hold behind.
    async fn reserve(&self, booking: NewBooking) -> CoreResult<Booking>;

    /// Fetch a booking, including soft-deleted ones.
    async fn get(&self, id: i64) -> CoreResult<Option<Booking>>;

    /// Non-deleted bookings of a user, newest id first, plus their total count.
    async fn list_by_user(&self, user_id: i64, page: Page) -> CoreResult<(Vec<Booking>, u64)>;

    /// Compare-and-set out of `Pending`. `Success` commits the hold; every other
    /// terminal status releases it.
    async fn finalize(&self, id: i64, to: BookingStatus, at: DateTime<Utc>) -> CoreResult<Finalized>;

    /// Pending bookings whose hold deadline is before `now`, oldest deadline first.
    async fn overdue(&self, now: DateTime<Utc>, limit: u32) -> CoreResult<Vec<Booking>>;

    /// Release holds placed before `cutoff` that no booking references.
    async fn release_orphaned_holds(&self, cutoff: DateTime<Utc>) -> CoreResult<u32>;

    async fn inventory(&self, schedule_id: i64) -> CoreResult<Option<SeatInventory>>;
}
