use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price and capacity of a schedule, as needed to admit a reservation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleSnapshot {
    pub schedule_id: i64,
    /// Per-seat price in minor currency units
    pub price: i64,
    pub capacity: u32,
}

/// Current route metadata used to enrich booking views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleDetails {
    pub schedule_id: i64,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub train_name: Option<String>,
}
