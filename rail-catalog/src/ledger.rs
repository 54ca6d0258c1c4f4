use crate::inventory::{HoldId, InventoryError, SeatHold, SeatInventory};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

/// In-process inventory ledger.
///
/// Each schedule's counters sit behind their own mutex, so reservations only
/// serialise against others for the same schedule. Holds live in a separate
/// registry; commit and release consume the registry entry first, which makes
/// both single-use.
///
/// Lock order is always `holds` then a schedule mutex.
pub struct InventoryLedger {
    schedules: RwLock<HashMap<i64, Arc<Mutex<SeatInventory>>>>,
    holds: Mutex<HashMap<HoldId, SeatHold>>,
    next_hold: AtomicI64,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self {
            schedules: RwLock::new(HashMap::new()),
            holds: Mutex::new(HashMap::new()),
            next_hold: AtomicI64::new(1),
        }
    }

    /// Create counters for a schedule. Capacity is fixed by the first call.
    pub fn ensure(&self, schedule_id: i64, capacity: u32) -> Result<(), InventoryError> {
        if self.counters(schedule_id)?.is_some() {
            return Ok(());
        }

        let mut schedules = self
            .schedules
            .write()
            .map_err(|e| InventoryError::Poisoned(e.to_string()))?;
        schedules
            .entry(schedule_id)
            .or_insert_with(|| Arc::new(Mutex::new(SeatInventory::new(schedule_id, capacity))));
        Ok(())
    }

    /// Get current counters
    pub fn snapshot(&self, schedule_id: i64) -> Result<Option<SeatInventory>, InventoryError> {
        match self.counters(schedule_id)? {
            Some(counters) => {
                let inv = counters
                    .lock()
                    .map_err(|e| InventoryError::Poisoned(e.to_string()))?;
                Ok(Some(*inv))
            }
            None => Ok(None),
        }
    }

    /// Atomically claim `seats` on a schedule.
    pub fn try_hold(
        &self,
        schedule_id: i64,
        seats: u32,
        now: DateTime<Utc>,
    ) -> Result<HoldId, InventoryError> {
        let counters = self
            .counters(schedule_id)?
            .ok_or(InventoryError::NotFound(schedule_id))?;

        {
            let mut inv = counters
                .lock()
                .map_err(|e| InventoryError::Poisoned(e.to_string()))?;
            inv.hold(seats)?;
        }

        let id = HoldId(self.next_hold.fetch_add(1, Ordering::SeqCst));
        let hold = SeatHold {
            id,
            schedule_id,
            seats,
            booking_id: None,
            placed_at: now,
        };

        match self.holds.lock() {
            Ok(mut holds) => {
                holds.insert(id, hold);
                Ok(id)
            }
            Err(e) => {
                // Registry unusable: give the seats back rather than leak them.
                if let Ok(mut inv) = counters.lock() {
                    let _ = inv.release(seats);
                }
                Err(InventoryError::Poisoned(e.to_string()))
            }
        }
    }

    /// Record which booking owns a hold.
    pub fn attach(&self, hold_id: HoldId, booking_id: i64) -> Result<bool, InventoryError> {
        let mut holds = self
            .holds
            .lock()
            .map_err(|e| InventoryError::Poisoned(e.to_string()))?;
        match holds.get_mut(&hold_id) {
            Some(hold) => {
                hold.booking_id = Some(booking_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move a hold's seats to sold. Returns `false` if the hold was already settled.
    pub fn commit(&self, hold_id: HoldId) -> Result<bool, InventoryError> {
        self.settle(hold_id, |inv, seats| inv.commit(seats))
    }

    /// Return a hold's seats. Returns `false` if the hold was already settled.
    pub fn release(&self, hold_id: HoldId) -> Result<bool, InventoryError> {
        self.settle(hold_id, |inv, seats| inv.release(seats))
    }

    /// Release holds placed before `cutoff` that never got a booking attached.
    pub fn release_orphaned(&self, cutoff: DateTime<Utc>) -> Result<Vec<SeatHold>, InventoryError> {
        let mut holds = self
            .holds
            .lock()
            .map_err(|e| InventoryError::Poisoned(e.to_string()))?;

        let orphaned: Vec<HoldId> = holds
            .values()
            .filter(|h| h.booking_id.is_none() && h.placed_at < cutoff)
            .map(|h| h.id)
            .collect();

        let mut released = Vec::with_capacity(orphaned.len());
        for id in orphaned {
            let Some(hold) = holds.remove(&id) else {
                continue;
            };
            let counters = self
                .counters(hold.schedule_id)?
                .ok_or(InventoryError::NotFound(hold.schedule_id))?;
            let mut inv = counters
                .lock()
                .map_err(|e| InventoryError::Poisoned(e.to_string()))?;
            inv.release(hold.seats)?;
            warn!(
                "Released orphaned {} on schedule {} ({} seats)",
                hold.id, hold.schedule_id, hold.seats
            );
            released.push(hold);
        }

        Ok(released)
    }

    /// Number of unsettled holds
    pub fn open_holds(&self) -> Result<usize, InventoryError> {
        let holds = self
            .holds
            .lock()
            .map_err(|e| InventoryError::Poisoned(e.to_string()))?;
        Ok(holds.len())
    }

    fn settle<F>(&self, hold_id: HoldId, apply: F) -> Result<bool, InventoryError>
    where
        F: FnOnce(&mut SeatInventory, u32) -> Result<(), InventoryError>,
    {
        let mut holds = self
            .holds
            .lock()
            .map_err(|e| InventoryError::Poisoned(e.to_string()))?;

        let Some(hold) = holds.get(&hold_id).cloned() else {
            info!("{} already settled, skipping", hold_id);
            return Ok(false);
        };

        let counters = self
            .counters(hold.schedule_id)?
            .ok_or(InventoryError::NotFound(hold.schedule_id))?;
        let mut inv = counters
            .lock()
            .map_err(|e| InventoryError::Poisoned(e.to_string()))?;

        apply(&mut inv, hold.seats)?;
        holds.remove(&hold_id);
        Ok(true)
    }

    fn counters(&self, schedule_id: i64) -> Result<Option<Arc<Mutex<SeatInventory>>>, InventoryError> {
        let schedules = self
            .schedules
            .read()
            .map_err(|e| InventoryError::Poisoned(e.to_string()))?;
        Ok(schedules.get(&schedule_id).cloned())
    }
}

impl Default for InventoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::thread;

    #[test]
    fn test_hold_commit_is_single_use() {
        let ledger = InventoryLedger::new();
        ledger.ensure(1, 10).unwrap();

        let hold = ledger.try_hold(1, 3, Utc::now()).unwrap();
        assert!(ledger.commit(hold).unwrap());
        assert!(!ledger.commit(hold).unwrap());
        assert!(!ledger.release(hold).unwrap());

        let inv = ledger.snapshot(1).unwrap().unwrap();
        assert_eq!(inv.held, 0);
        assert_eq!(inv.sold, 3);
    }

    #[test]
    fn test_release_twice_returns_seats_once() {
        let ledger = InventoryLedger::new();
        ledger.ensure(1, 4).unwrap();

        let a = ledger.try_hold(1, 2, Utc::now()).unwrap();
        let _b = ledger.try_hold(1, 2, Utc::now()).unwrap();

        assert!(ledger.release(a).unwrap());
        assert!(!ledger.release(a).unwrap());

        let inv = ledger.snapshot(1).unwrap().unwrap();
        assert_eq!(inv.held, 2);
        assert_eq!(inv.available(), 2);
    }

    #[test]
    fn test_ensure_keeps_first_capacity() {
        let ledger = InventoryLedger::new();
        ledger.ensure(9, 5).unwrap();
        ledger.ensure(9, 50).unwrap();
        assert_eq!(ledger.snapshot(9).unwrap().unwrap().capacity, 5);
    }

    #[test]
    fn test_unknown_schedule() {
        let ledger = InventoryLedger::new();
        assert_eq!(
            ledger.try_hold(404, 1, Utc::now()),
            Err(InventoryError::NotFound(404))
        );
        assert!(ledger.snapshot(404).unwrap().is_none());
    }

    #[test]
    fn test_orphaned_holds_released_after_cutoff() {
        let ledger = InventoryLedger::new();
        ledger.ensure(1, 10).unwrap();

        let old = Utc::now() - Duration::minutes(20);
        let orphan = ledger.try_hold(1, 2, old).unwrap();
        let owned = ledger.try_hold(1, 3, old).unwrap();
        ledger.attach(owned, 77).unwrap();
        let fresh = ledger.try_hold(1, 1, Utc::now()).unwrap();

        let released = ledger
            .release_orphaned(Utc::now() - Duration::minutes(10))
            .unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, orphan);

        let inv = ledger.snapshot(1).unwrap().unwrap();
        assert_eq!(inv.held, 4);
        assert!(!ledger.release(orphan).unwrap());
        assert!(ledger.release(fresh).unwrap());
    }

    #[test]
    fn test_concurrent_holds_never_oversell() {
        let ledger = Arc::new(InventoryLedger::new());
        ledger.ensure(1, 25).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    let mut won = 0u32;
                    for j in 0..20 {
                        let seats = 1 + ((i + j) % 3) as u32;
                        if let Ok(hold) = ledger.try_hold(1, seats, Utc::now()) {
                            won += seats;
                            if j % 4 == 0 {
                                ledger.release(hold).unwrap();
                                won -= seats;
                            } else if j % 4 == 1 {
                                ledger.commit(hold).unwrap();
                            }
                        }
                        let inv = ledger.snapshot(1).unwrap().unwrap();
                        assert!(inv.held + inv.sold <= inv.capacity);
                    }
                    won
                })
            })
            .collect();

        let claimed: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        let inv = ledger.snapshot(1).unwrap().unwrap();
        assert_eq!(inv.held + inv.sold, claimed);
        assert!(claimed <= 25);
    }
}
