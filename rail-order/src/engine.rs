use chrono::{Duration, Utc};
use rail_catalog::SeatInventory;
use rail_core::code::{CodeGenerator, RandomCodes};
use rail_core::events::{booking_event, BookingEventSink, NoopEvents};
use rail_core::repository::{BookingStore, Finalized, ScheduleCatalog};
use rail_core::{Booking, BookingStatus, CoreError, CoreResult, NewBooking, Page, PaymentOutcome};
use rail_shared::models::BookingEventKind;
use std::sync::Arc;
use tracing::{info, warn};

/// Tunables for the reservation lifecycle.
#[derive(Debug, Clone)]
pub struct ReservationPolicy {
    /// How long a pending booking keeps its seats before it may expire
    pub hold_duration: Duration,
    /// Upper bound for `limit` when listing bookings
    pub max_page_size: u32,
    /// Booking-code regenerations before giving up
    pub code_attempts: u32,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(10),
            max_page_size: 100,
            code_attempts: 8,
        }
    }
}

/// Page of bookings plus the size of the whole user scope.
#[derive(Debug, Clone)]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub total: u64,
    pub page: Page,
}

/// Owns the booking state machine and drives the seat ledger through the store.
#[derive(Clone)]
pub struct ReservationEngine {
    store: Arc<dyn BookingStore>,
    catalog: Arc<dyn ScheduleCatalog>,
    events: Arc<dyn BookingEventSink>,
    codes: Arc<dyn CodeGenerator>,
    policy: ReservationPolicy,
}

impl ReservationEngine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        catalog: Arc<dyn ScheduleCatalog>,
        policy: ReservationPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            events: Arc::new(NoopEvents),
            codes: Arc::new(RandomCodes),
            policy,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn BookingEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_codes(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn policy(&self) -> &ReservationPolicy {
        &self.policy
    }

    /// Hold seats and create a pending booking.
    pub async fn reserve(&self, user_id: i64, schedule_id: i64, seat_count: i64) -> CoreResult<Booking> {
        if user_id < 1 {
            return Err(CoreError::Validation(format!("invalid user_id: {}", user_id)));
        }
        if schedule_id < 1 {
            return Err(CoreError::Validation(format!("invalid schedule_id: {}", schedule_id)));
        }
        if seat_count < 1 {
            return Err(CoreError::Validation(format!(
                "seat_count must be at least 1, got {}",
                seat_count
            )));
        }
        let seat_count = u32::try_from(seat_count)
            .map_err(|_| CoreError::Validation(format!("seat_count out of range: {}", seat_count)))?;

        let snapshot = self
            .catalog
            .schedule_snapshot(schedule_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Schedule {}", schedule_id)))?;

        for attempt in 1..=self.policy.code_attempts {
            let now = Utc::now();
            let request = NewBooking {
                user_id,
                schedule_id,
                seat_count,
                booking_code: self.codes.next_code(),
                price_per_seat: snapshot.price,
                capacity: snapshot.capacity,
                created_at: now,
                hold_deadline: now + self.policy.hold_duration,
            };

            match self.store.reserve(request).await {
                Ok(booking) => {
                    info!(
                        "Booking {} ({}) reserved {} seats on schedule {} for user {}",
                        booking.id, booking.booking_code, seat_count, schedule_id, user_id
                    );
                    self.events
                        .publish(booking_event(BookingEventKind::Reserved, &booking))
                        .await;
                    return Ok(booking);
                }
                Err(CoreError::DuplicateBookingCode(code)) => {
                    warn!("Booking code {} collided (attempt {}), regenerating", code, attempt);
                }
                Err(err @ CoreError::SeatsUnavailable { .. }) => {
                    info!("Reservation rejected for user {}: {}", user_id, err);
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(CoreError::Internal(format!(
            "no unique booking code after {} attempts",
            self.policy.code_attempts
        )))
    }

    /// Apply a payment result. Repeating the callback on a finalized booking
    /// returns the booking unchanged.
    pub async fn confirm(&self, booking_id: i64, user_id: i64, outcome: PaymentOutcome) -> CoreResult<Booking> {
        let booking = self.owned_booking(booking_id, user_id).await?;

        if booking.status.is_terminal() {
            info!(
                "Payment callback for booking {} ignored, already {}",
                booking_id, booking.status
            );
            return Ok(booking);
        }

        match self.store.finalize(booking_id, outcome.status(), Utc::now()).await? {
            Finalized::Applied(booking) => {
                let kind = match outcome {
                    PaymentOutcome::Success => BookingEventKind::Confirmed,
                    PaymentOutcome::Failed => BookingEventKind::Failed,
                };
                info!("Booking {} marked {} via payment callback", booking_id, booking.status);
                self.events.publish(booking_event(kind, &booking)).await;
                Ok(booking)
            }
            Finalized::Unchanged(booking) => {
                info!(
                    "Booking {} left pending concurrently, now {}",
                    booking_id, booking.status
                );
                Ok(booking)
            }
        }
    }

    /// Cancel a pending booking on behalf of its owner and release its seats.
    pub async fn cancel(&self, booking_id: i64, user_id: i64) -> CoreResult<Booking> {
        let booking = self
            .store
            .get(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Booking {}", booking_id)))?;

        if booking.user_id != user_id || booking.status != BookingStatus::Pending {
            return Err(CoreError::NotCancellable(booking_id));
        }

        match self.store.finalize(booking_id, BookingStatus::Cancelled, Utc::now()).await? {
            Finalized::Applied(booking) => {
                info!("Booking {} cancelled by user {}", booking_id, user_id);
                self.events
                    .publish(booking_event(BookingEventKind::Cancelled, &booking))
                    .await;
                Ok(booking)
            }
            Finalized::Unchanged(_) => Err(CoreError::NotCancellable(booking_id)),
        }
    }

    pub async fn get_booking(&self, booking_id: i64) -> CoreResult<Booking> {
        self.store
            .get(booking_id)
            .await?
            .filter(|b| !b.is_deleted())
            .ok_or_else(|| CoreError::NotFound(format!("Booking {}", booking_id)))
    }

    pub async fn list_by_user(&self, user_id: i64, page: i64, limit: i64) -> CoreResult<BookingPage> {
        let page = Page::new(page, limit, self.policy.max_page_size)?;
        let (bookings, total) = self.store.list_by_user(user_id, page).await?;
        Ok(BookingPage { bookings, total, page })
    }

    /// Current seat counters for a schedule.
    pub async fn availability(&self, schedule_id: i64) -> CoreResult<SeatInventory> {
        if let Some(inventory) = self.store.inventory(schedule_id).await? {
            return Ok(inventory);
        }

        // Counters are created by the first reservation.
        let snapshot = self
            .catalog
            .schedule_snapshot(schedule_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Schedule {}", schedule_id)))?;
        Ok(SeatInventory::new(schedule_id, snapshot.capacity))
    }

    async fn owned_booking(&self, booking_id: i64, user_id: i64) -> CoreResult<Booking> {
        self.store
            .get(booking_id)
            .await?
            .filter(|b| b.user_id == user_id)
            .ok_or_else(|| CoreError::NotFound(format!("Booking {}", booking_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCatalog, MemoryStore};
    use std::sync::Mutex;

    struct ScriptedCodes(Mutex<Vec<&'static str>>);

    impl CodeGenerator for ScriptedCodes {
        fn next_code(&self) -> String {
            let mut codes = self.0.lock().unwrap();
            codes.remove(0).to_string()
        }
    }

    fn setup(capacity: u32) -> (ReservationEngine, Arc<MemoryStore>) {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.add_train(1, "Argo Bromo", capacity);
        catalog.add_schedule(10, 1, "Jakarta", "Surabaya", 150_000);
        let store = Arc::new(MemoryStore::new());
        let engine = ReservationEngine::new(store.clone(), catalog, ReservationPolicy::default());
        (engine, store)
    }

    #[tokio::test]
    async fn test_reserve_snapshots_price_and_deadline() {
        let (engine, _) = setup(5);
        let booking = engine.reserve(1, 10, 2).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.price_per_seat, 150_000);
        assert_eq!(booking.total_price, 300_000);
        assert_eq!(booking.hold_deadline - booking.created_at, Duration::minutes(10));
        assert!(rail_core::code::is_valid_booking_code(&booking.booking_code));
    }

    #[tokio::test]
    async fn test_reserve_validation() {
        let (engine, store) = setup(5);
        assert!(matches!(engine.reserve(1, 10, 0).await, Err(CoreError::Validation(_))));
        assert!(matches!(engine.reserve(1, 10, -2).await, Err(CoreError::Validation(_))));
        assert!(matches!(engine.reserve(0, 10, 1).await, Err(CoreError::Validation(_))));
        assert!(matches!(engine.reserve(1, 99, 1).await, Err(CoreError::NotFound(_))));
        assert!(store.inventory(10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_code_collision_regenerates() {
        let (engine, _) = setup(5);
        let engine = engine.with_codes(Arc::new(ScriptedCodes(Mutex::new(vec![
            "BKAAAAAAAA",
            "BKAAAAAAAA",
            "BKBBBBBBBB",
        ]))));

        let first = engine.reserve(1, 10, 1).await.unwrap();
        let second = engine.reserve(2, 10, 1).await.unwrap();
        assert_eq!(first.booking_code, "BKAAAAAAAA");
        assert_eq!(second.booking_code, "BKBBBBBBBB");

        let inv = engine.availability(10).await.unwrap();
        assert_eq!(inv.held, 2);
    }

    #[tokio::test]
    async fn test_confirm_rejects_foreign_user() {
        let (engine, _) = setup(5);
        let booking = engine.reserve(1, 10, 1).await.unwrap();
        assert!(matches!(
            engine.confirm(booking.id, 2, PaymentOutcome::Success).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_payment_releases_seats() {
        let (engine, _) = setup(3);
        let booking = engine.reserve(1, 10, 3).await.unwrap();

        let failed = engine.confirm(booking.id, 1, PaymentOutcome::Failed).await.unwrap();
        assert_eq!(failed.status, BookingStatus::Failed);

        let inv = engine.availability(10).await.unwrap();
        assert_eq!((inv.held, inv.sold), (0, 0));
        assert!(engine.reserve(2, 10, 3).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let (engine, _) = setup(4);
        let booking = engine.reserve(1, 10, 2).await.unwrap();

        assert_eq!(engine.cancel(booking.id, 2).await, Err(CoreError::NotCancellable(booking.id)));
        assert!(matches!(engine.cancel(999, 1).await, Err(CoreError::NotFound(_))));

        let cancelled = engine.cancel(booking.id, 1).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(engine.availability(10).await.unwrap().held, 0);

        assert_eq!(engine.cancel(booking.id, 1).await, Err(CoreError::NotCancellable(booking.id)));
        assert!(matches!(engine.get_booking(booking.id).await, Err(CoreError::NotFound(_))));

        // A late payment callback sees the terminal state.
        let late = engine.confirm(booking.id, 1, PaymentOutcome::Success).await.unwrap();
        assert_eq!(late.status, BookingStatus::Cancelled);
        assert_eq!(engine.availability(10).await.unwrap().sold, 0);
    }

    #[tokio::test]
    async fn test_availability_before_first_reservation() {
        let (engine, _) = setup(7);
        let inv = engine.availability(10).await.unwrap();
        assert_eq!(inv, SeatInventory::new(10, 7));
        assert!(matches!(engine.availability(11).await, Err(CoreError::NotFound(_))));
    }
}
