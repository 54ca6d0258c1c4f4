pub mod booking;
pub mod code;
pub mod events;
pub mod page;
pub mod repository;
pub mod schedule;

use rail_catalog::InventoryError;

pub use booking::{Booking, BookingStatus, NewBooking, PaymentOutcome};
pub use page::{Page, PageRequest};
pub use schedule::{ScheduleDetails, ScheduleSnapshot};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Seats unavailable on schedule {schedule_id}: requested {requested}, available {available}")]
    SeatsUnavailable {
        schedule_id: i64,
        requested: u32,
        available: u32,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("Booking {0} cannot be cancelled")]
    NotCancellable(i64),
    #[error("Booking {id} is already {status}")]
    AlreadyFinalized { id: i64, status: BookingStatus },
    #[error("Booking code {0} already in use")]
    DuplicateBookingCode(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Store corrupted: {0}")]
    Corrupted(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Transient failures the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable(_))
    }

    /// Business outcomes, as opposed to system failures.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_)
                | CoreError::SeatsUnavailable { .. }
                | CoreError::NotFound(_)
                | CoreError::NotCancellable(_)
                | CoreError::AlreadyFinalized { .. }
        )
    }
}

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientCapacity {
                schedule_id,
                requested,
                available,
            } => CoreError::SeatsUnavailable {
                schedule_id,
                requested,
                available,
            },
            InventoryError::NotFound(id) => CoreError::NotFound(format!("Inventory for schedule {}", id)),
            InventoryError::InvalidSeatCount(n) => {
                CoreError::Validation(format!("seat_count must be at least 1, got {}", n))
            }
            InventoryError::InsufficientHeld { .. } | InventoryError::Poisoned(_) => {
                CoreError::Corrupted(err.to_string())
            }
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
