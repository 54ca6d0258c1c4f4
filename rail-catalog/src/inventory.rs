use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seat counters for one schedule.
///
/// `held` counts seats claimed by pending reservations, `sold` counts seats
/// committed by paid ones. `held + sold` never exceeds `capacity`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatInventory {
    pub schedule_id: i64,
    pub capacity: u32,
    pub held: u32,
    pub sold: u32,
}

impl SeatInventory {
    pub fn new(schedule_id: i64, capacity: u32) -> Self {
        Self {
            schedule_id,
            capacity,
            held: 0,
            sold: 0,
        }
    }

    /// Seats neither held nor sold
    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.held + self.sold)
    }

    /// Check-and-increment of `held`. Leaves the counters untouched on failure.
    pub fn hold(&mut self, seats: u32) -> Result<(), InventoryError> {
        if seats == 0 {
            return Err(InventoryError::InvalidSeatCount(seats));
        }

        let available = self.available();
        if available < seats {
            return Err(InventoryError::InsufficientCapacity {
                schedule_id: self.schedule_id,
                requested: seats,
                available,
            });
        }

        self.held += seats;
        Ok(())
    }

    /// Move held seats to sold
    pub fn commit(&mut self, seats: u32) -> Result<(), InventoryError> {
        if self.held < seats {
            return Err(InventoryError::InsufficientHeld {
                schedule_id: self.schedule_id,
                requested: seats,
                held: self.held,
            });
        }

        self.held -= seats;
        self.sold += seats;
        Ok(())
    }

    /// Return held seats to the pool
    pub fn release(&mut self, seats: u32) -> Result<(), InventoryError> {
        if self.held < seats {
            return Err(InventoryError::InsufficientHeld {
                schedule_id: self.schedule_id,
                requested: seats,
                held: self.held,
            });
        }

        self.held -= seats;
        Ok(())
    }

    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            f64::from(self.held + self.sold) / f64::from(self.capacity)
        }
    }
}

/// Single-use reference to a seat hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct HoldId(pub i64);

impl fmt::Display for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hold-{}", self.0)
    }
}

/// A provisional seat claim. Carries the booking id once the booking row exists,
/// so a hold without one can be recognised as orphaned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatHold {
    pub id: HoldId,
    pub schedule_id: i64,
    pub seats: u32,
    pub booking_id: Option<i64>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Inventory not found for schedule {0}")]
    NotFound(i64),

    #[error("Seat count must be positive, got {0}")]
    InvalidSeatCount(u32),

    #[error("Insufficient capacity on schedule {schedule_id}: requested {requested}, available {available}")]
    InsufficientCapacity {
        schedule_id: i64,
        requested: u32,
        available: u32,
    },

    #[error("Insufficient held seats on schedule {schedule_id}: requested {requested}, held {held}")]
    InsufficientHeld {
        schedule_id: i64,
        requested: u32,
        held: u32,
    },

    #[error("Inventory state poisoned: {0}")]
    Poisoned(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_lifecycle() {
        let mut inv = SeatInventory::new(1, 100);

        inv.hold(10).unwrap();
        assert_eq!(inv.held, 10);
        assert_eq!(inv.available(), 90);

        inv.commit(10).unwrap();
        assert_eq!(inv.held, 0);
        assert_eq!(inv.sold, 10);
        assert_eq!(inv.available(), 90);

        let utilization = inv.utilization();
        assert!((utilization - 0.1).abs() < 0.01);
    }

    #[test]
    fn test_hold_over_capacity_leaves_counters() {
        let mut inv = SeatInventory::new(1, 2);
        inv.hold(1).unwrap();

        let err = inv.hold(2).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientCapacity {
                schedule_id: 1,
                requested: 2,
                available: 1
            }
        );
        assert_eq!(inv.held, 1);
        assert_eq!(inv.sold, 0);
    }

    #[test]
    fn test_sold_counts_against_capacity() {
        let mut inv = SeatInventory::new(1, 2);
        inv.hold(2).unwrap();
        inv.commit(2).unwrap();

        assert!(inv.hold(1).is_err());
        assert_eq!(inv.available(), 0);
    }

    #[test]
    fn test_zero_seats_rejected() {
        let mut inv = SeatInventory::new(1, 5);
        assert_eq!(inv.hold(0), Err(InventoryError::InvalidSeatCount(0)));
    }

    #[test]
    fn test_release_more_than_held_fails() {
        let mut inv = SeatInventory::new(1, 5);
        inv.hold(1).unwrap();
        assert!(inv.release(2).is_err());
        assert_eq!(inv.held, 1);
    }
}
