use chrono::{DateTime, Utc};
use rail_catalog::HoldId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Booking lifecycle state.
///
/// ```text
/// Pending ──► Success | Failed | Expired | Cancelled
/// ```
///
/// Every state other than `Pending` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Success,
    Failed,
    Expired,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (
                BookingStatus::Pending,
                BookingStatus::Success
                    | BookingStatus::Failed
                    | BookingStatus::Expired
                    | BookingStatus::Cancelled
            )
        )
    }

    /// Validate a transition against the table above.
    pub fn transition(&self, id: i64, next: BookingStatus) -> Result<BookingStatus, CoreError> {
        if self.can_transition_to(next) {
            return Ok(next);
        }
        if self.is_terminal() {
            return Err(CoreError::AlreadyFinalized { id, status: *self });
        }
        Err(CoreError::Validation(format!(
            "invalid transition from {} to {}",
            self, next
        )))
    }

    /// Persisted status code
    pub fn code(&self) -> i16 {
        match self {
            BookingStatus::Cancelled => 0,
            BookingStatus::Pending => 1,
            BookingStatus::Success => 2,
            BookingStatus::Failed => 3,
            BookingStatus::Expired => 4,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(BookingStatus::Cancelled),
            1 => Some(BookingStatus::Pending),
            2 => Some(BookingStatus::Success),
            3 => Some(BookingStatus::Failed),
            4 => Some(BookingStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Success => "success",
            BookingStatus::Failed => "failed",
            BookingStatus::Expired => "expired",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "success" => Ok(BookingStatus::Success),
            "failed" => Ok(BookingStatus::Failed),
            "expired" => Ok(BookingStatus::Expired),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::Validation(format!("unknown booking status: {}", other))),
        }
    }
}

/// Result reported by the payment callback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Success,
    Failed,
}

impl PaymentOutcome {
    pub fn status(&self) -> BookingStatus {
        match self {
            PaymentOutcome::Success => BookingStatus::Success,
            PaymentOutcome::Failed => BookingStatus::Failed,
        }
    }
}

impl TryFrom<BookingStatus> for PaymentOutcome {
    type Error = CoreError;

    fn try_from(status: BookingStatus) -> Result<Self, Self::Error> {
        match status {
            BookingStatus::Success => Ok(PaymentOutcome::Success),
            BookingStatus::Failed => Ok(PaymentOutcome::Failed),
            other => Err(CoreError::Validation(format!(
                "payment status must be success or failed, got {}",
                other
            ))),
        }
    }
}

impl FromStr for PaymentOutcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<BookingStatus>()?.try_into()
    }
}

/// A reservation of seats on one schedule.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub schedule_id: i64,
    pub seat_count: u32,
    pub status: BookingStatus,
    pub booking_code: String,
    #[serde(skip_serializing)]
    pub hold_id: HoldId,
    pub price_per_seat: i64,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
    pub hold_deadline: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending && self.hold_deadline < now
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Apply a validated transition to the in-memory record.
    pub fn apply(&mut self, next: BookingStatus, at: DateTime<Utc>) -> Result<(), CoreError> {
        self.status = self.status.transition(self.id, next)?;
        self.updated_at = at;
        if next == BookingStatus::Cancelled {
            self.deleted_at = Some(at);
        }
        Ok(())
    }
}

/// Everything the store needs to hold seats and insert a pending booking.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub user_id: i64,
    pub schedule_id: i64,
    pub seat_count: u32,
    pub booking_code: String,
    pub price_per_seat: i64,
    pub capacity: u32,
    pub created_at: DateTime<Utc>,
    pub hold_deadline: DateTime<Utc>,
}

impl NewBooking {
    pub fn total_price(&self) -> i64 {
        self.price_per_seat * i64::from(self.seat_count)
    }

    pub fn into_booking(self, id: i64, hold_id: HoldId) -> Booking {
        let total_price = self.total_price();
        Booking {
            id,
            user_id: self.user_id,
            schedule_id: self.schedule_id,
            seat_count: self.seat_count,
            status: BookingStatus::Pending,
            booking_code: self.booking_code,
            hold_id,
            price_per_seat: self.price_per_seat,
            total_price,
            created_at: self.created_at,
            hold_deadline: self.hold_deadline,
            updated_at: self.created_at,
            deleted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Success,
        BookingStatus::Failed,
        BookingStatus::Expired,
        BookingStatus::Cancelled,
    ];

    #[test]
    fn test_transition_table() {
        for next in ALL {
            let allowed = BookingStatus::Pending.can_transition_to(next);
            assert_eq!(allowed, next != BookingStatus::Pending, "pending -> {}", next);
        }

        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for next in ALL {
                assert!(!from.can_transition_to(next), "{} -> {}", from, next);
                assert!(matches!(
                    from.transition(1, next),
                    Err(CoreError::AlreadyFinalized { .. })
                ));
            }
        }
    }

    #[test]
    fn test_pending_to_pending_is_validation_error() {
        assert!(matches!(
            BookingStatus::Pending.transition(1, BookingStatus::Pending),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_status_codes_roundtrip() {
        for status in ALL {
            assert_eq!(BookingStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(BookingStatus::from_code(9), None);
    }

    #[test]
    fn test_payment_outcome_parsing() {
        assert_eq!("SUCCESS".parse::<PaymentOutcome>().unwrap(), PaymentOutcome::Success);
        assert_eq!("failed".parse::<PaymentOutcome>().unwrap(), PaymentOutcome::Failed);
        assert!(matches!(
            "expired".parse::<PaymentOutcome>(),
            Err(CoreError::Validation(_))
        ));
        assert!("bogus".parse::<PaymentOutcome>().is_err());
    }

    #[test]
    fn test_cancel_sets_soft_delete_marker() {
        let now = Utc::now();
        let mut booking = NewBooking {
            user_id: 1,
            schedule_id: 2,
            seat_count: 3,
            booking_code: "BK00000000".to_string(),
            price_per_seat: 150_000,
            capacity: 10,
            created_at: now,
            hold_deadline: now + Duration::minutes(10),
        }
        .into_booking(5, HoldId(1));

        assert_eq!(booking.total_price, 450_000);
        assert!(!booking.is_overdue(now));
        assert!(booking.is_overdue(now + Duration::minutes(11)));

        booking.apply(BookingStatus::Cancelled, now).unwrap();
        assert!(booking.is_deleted());
        assert!(booking.apply(BookingStatus::Success, now).is_err());
        assert_eq!(booking.status, BookingStatus::Cancelled);
    }
}
