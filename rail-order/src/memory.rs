use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rail_catalog::{InventoryLedger, SeatInventory};
use rail_core::repository::{BookingStore, Finalized, ScheduleCatalog};
use rail_core::{Booking, BookingStatus, CoreError, CoreResult, NewBooking, Page, ScheduleDetails, ScheduleSnapshot};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Bookings {
    rows: BTreeMap<i64, Booking>,
    codes: HashSet<String>,
}

/// In-process booking store backed by [`InventoryLedger`].
///
/// Booking rows sit behind one lock; seat counters are locked per schedule by
/// the ledger. A status change holds the row lock across the ledger update, so
/// the compare-and-set and the seat movement are observed together.
pub struct MemoryStore {
    ledger: InventoryLedger,
    bookings: RwLock<Bookings>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            ledger: InventoryLedger::new(),
            bookings: RwLock::new(Bookings::default()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    fn read(&self) -> CoreResult<RwLockReadGuard<'_, Bookings>> {
        self.bookings
            .read()
            .map_err(|e| CoreError::Corrupted(format!("booking table poisoned: {}", e)))
    }

    fn write(&self) -> CoreResult<RwLockWriteGuard<'_, Bookings>> {
        self.bookings
            .write()
            .map_err(|e| CoreError::Corrupted(format!("booking table poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn reserve(&self, request: NewBooking) -> CoreResult<Booking> {
        self.ledger.ensure(request.schedule_id, request.capacity)?;
        let hold = self
            .ledger
            .try_hold(request.schedule_id, request.seat_count, request.created_at)?;

        let mut bookings = match self.write() {
            Ok(guard) => guard,
            Err(err) => {
                self.ledger.release(hold)?;
                return Err(err);
            }
        };

        if bookings.codes.contains(&request.booking_code) {
            drop(bookings);
            self.ledger.release(hold)?;
            return Err(CoreError::DuplicateBookingCode(request.booking_code));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if !self.ledger.attach(hold, id)? {
            // Swept as an orphan; its seats are already back in the pool.
            return Err(CoreError::Corrupted(format!(
                "{} was released before booking {} was stored",
                hold, id
            )));
        }

        let booking = request.into_booking(id, hold);
        bookings.codes.insert(booking.booking_code.clone());
        bookings.rows.insert(id, booking.clone());
        Ok(booking)
    }

    async fn get(&self, id: i64) -> CoreResult<Option<Booking>> {
        Ok(self.read()?.rows.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: i64, page: Page) -> CoreResult<(Vec<Booking>, u64)> {
        let bookings = self.read()?;
        let scoped: Vec<&Booking> = bookings
            .rows
            .values()
            .rev()
            .filter(|b| b.user_id == user_id && !b.is_deleted())
            .collect();

        let total = scoped.len() as u64;
        let items = scoped
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn finalize(&self, id: i64, to: BookingStatus, at: DateTime<Utc>) -> CoreResult<Finalized> {
        let mut bookings = self.write()?;
        let booking = bookings
            .rows
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("Booking {}", id)))?;

        if booking.status != BookingStatus::Pending {
            return Ok(Finalized::Unchanged(booking.clone()));
        }

        let next = booking.status.transition(id, to)?;
        let settled = match next {
            BookingStatus::Success => self.ledger.commit(booking.hold_id)?,
            _ => self.ledger.release(booking.hold_id)?,
        };
        if !settled {
            return Err(CoreError::Corrupted(format!(
                "booking {} cannot move to {}: {} was already settled",
                id, next, booking.hold_id
            )));
        }

        booking.apply(next, at)?;
        Ok(Finalized::Applied(booking.clone()))
    }

    async fn overdue(&self, now: DateTime<Utc>, limit: u32) -> CoreResult<Vec<Booking>> {
        let bookings = self.read()?;
        let mut due: Vec<Booking> = bookings
            .rows
            .values()
            .filter(|b| b.is_overdue(now))
            .cloned()
            .collect();
        due.sort_by_key(|b| (b.hold_deadline, b.id));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn release_orphaned_holds(&self, cutoff: DateTime<Utc>) -> CoreResult<u32> {
        let released = self.ledger.release_orphaned(cutoff)?;
        Ok(released.len() as u32)
    }

    async fn inventory(&self, schedule_id: i64) -> CoreResult<Option<SeatInventory>> {
        Ok(self.ledger.snapshot(schedule_id)?)
    }
}

#[derive(Debug, Clone)]
struct TrainRecord {
    name: String,
    capacity: u32,
}

#[derive(Debug, Clone)]
struct ScheduleRecord {
    train_id: i64,
    origin: String,
    destination: String,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    price: i64,
}

/// In-process stand-in for the schedule and train services.
#[derive(Default)]
pub struct MemoryCatalog {
    trains: RwLock<HashMap<i64, TrainRecord>>,
    schedules: RwLock<HashMap<i64, ScheduleRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_train(&self, id: i64, name: &str, capacity: u32) {
        let mut trains = self.trains.write().unwrap_or_else(|e| e.into_inner());
        trains.insert(
            id,
            TrainRecord {
                name: name.to_string(),
                capacity,
            },
        );
    }

    /// Add a schedule departing a day from now.
    pub fn add_schedule(&self, id: i64, train_id: i64, origin: &str, destination: &str, price: i64) {
        let departure = Utc::now() + Duration::days(1);
        self.add_schedule_at(id, train_id, origin, destination, price, departure, departure + Duration::hours(8));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_schedule_at(
        &self,
        id: i64,
        train_id: i64,
        origin: &str,
        destination: &str,
        price: i64,
        departure_time: DateTime<Utc>,
        arrival_time: DateTime<Utc>,
    ) {
        let mut schedules = self.schedules.write().unwrap_or_else(|e| e.into_inner());
        schedules.insert(
            id,
            ScheduleRecord {
                train_id,
                origin: origin.to_string(),
                destination: destination.to_string(),
                departure_time,
                arrival_time,
                price,
            },
        );
    }

    pub fn set_price(&self, schedule_id: i64, price: i64) {
        let mut schedules = self.schedules.write().unwrap_or_else(|e| e.into_inner());
        if let Some(schedule) = schedules.get_mut(&schedule_id) {
            schedule.price = price;
        }
    }

    pub fn remove_schedule(&self, schedule_id: i64) {
        let mut schedules = self.schedules.write().unwrap_or_else(|e| e.into_inner());
        schedules.remove(&schedule_id);
    }

    pub fn remove_train(&self, train_id: i64) {
        let mut trains = self.trains.write().unwrap_or_else(|e| e.into_inner());
        trains.remove(&train_id);
    }

    fn schedule(&self, schedule_id: i64) -> CoreResult<Option<ScheduleRecord>> {
        let schedules = self
            .schedules
            .read()
            .map_err(|e| CoreError::Corrupted(format!("schedule table poisoned: {}", e)))?;
        Ok(schedules.get(&schedule_id).cloned())
    }

    fn train(&self, train_id: i64) -> CoreResult<Option<TrainRecord>> {
        let trains = self
            .trains
            .read()
            .map_err(|e| CoreError::Corrupted(format!("train table poisoned: {}", e)))?;
        Ok(trains.get(&train_id).cloned())
    }
}

#[async_trait]
impl ScheduleCatalog for MemoryCatalog {
    async fn schedule_snapshot(&self, schedule_id: i64) -> CoreResult<Option<ScheduleSnapshot>> {
        let Some(schedule) = self.schedule(schedule_id)? else {
            return Ok(None);
        };
        let Some(train) = self.train(schedule.train_id)? else {
            return Ok(None);
        };

        Ok(Some(ScheduleSnapshot {
            schedule_id,
            price: schedule.price,
            capacity: train.capacity,
        }))
    }

    async fn schedule_details(&self, schedule_id: i64) -> CoreResult<Option<ScheduleDetails>> {
        let Some(schedule) = self.schedule(schedule_id)? else {
            return Ok(None);
        };
        let train_name = self.train(schedule.train_id)?.map(|t| t.name);

        Ok(Some(ScheduleDetails {
            schedule_id,
            origin: schedule.origin,
            destination: schedule.destination,
            departure_time: schedule.departure_time,
            arrival_time: schedule.arrival_time,
            train_name,
        }))
    }
}
