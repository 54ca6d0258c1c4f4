use serde::{Deserialize, Serialize};

/// Lifecycle step a booking event reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingEventKind {
    Reserved,
    Confirmed,
    Failed,
    Cancelled,
    Expired,
}

impl BookingEventKind {
    /// Topic the event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            BookingEventKind::Reserved => "booking.reserved",
            BookingEventKind::Confirmed => "booking.confirmed",
            BookingEventKind::Failed => "booking.failed",
            BookingEventKind::Cancelled => "booking.cancelled",
            BookingEventKind::Expired => "booking.expired",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub booking_id: i64,
    pub booking_code: String,
    pub user_id: i64,
    pub schedule_id: i64,
    pub seat_count: u32,
    pub total_price: i64,
    pub timestamp: i64,
}

impl BookingEvent {
    pub fn key(&self) -> String {
        self.booking_id.to_string()
    }

    pub fn payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
