use chrono::{DateTime, Utc};
use rail_core::repository::ScheduleCatalog;
use rail_core::{Booking, BookingStatus, CoreResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Booking as shown to a customer.
///
/// Price and seat count come from the reservation snapshot; route fields are
/// looked up at read time and left out when the schedule no longer exists.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingView {
    pub id: i64,
    pub user_id: i64,
    pub schedule_id: i64,
    pub booking_code: String,
    pub status: BookingStatus,
    pub seat_count: u32,
    pub price_per_seat: i64,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_name: Option<String>,
}

impl From<&Booking> for BookingView {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            user_id: b.user_id,
            schedule_id: b.schedule_id,
            booking_code: b.booking_code.clone(),
            status: b.status,
            seat_count: b.seat_count,
            price_per_seat: b.price_per_seat,
            total_price: b.total_price,
            created_at: b.created_at,
            expires_at: b.hold_deadline,
            origin: None,
            destination: None,
            departure_time: None,
            arrival_time: None,
            train_name: None,
        }
    }
}

pub struct BookingReadModel {
    catalog: Arc<dyn ScheduleCatalog>,
}

impl BookingReadModel {
    pub fn new(catalog: Arc<dyn ScheduleCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn view(&self, booking: &Booking) -> CoreResult<BookingView> {
        let mut view = BookingView::from(booking);
        if let Some(details) = self.catalog.schedule_details(booking.schedule_id).await? {
            view.origin = Some(details.origin);
            view.destination = Some(details.destination);
            view.departure_time = Some(details.departure_time);
            view.arrival_time = Some(details.arrival_time);
            view.train_name = details.train_name;
        }
        Ok(view)
    }

    /// Enrich a page of bookings, looking each schedule up once.
    pub async fn views(&self, bookings: &[Booking]) -> CoreResult<Vec<BookingView>> {
        let mut details = HashMap::new();
        for booking in bookings {
            if !details.contains_key(&booking.schedule_id) {
                let found = self.catalog.schedule_details(booking.schedule_id).await?;
                details.insert(booking.schedule_id, found);
            }
        }

        Ok(bookings
            .iter()
            .map(|booking| {
                let mut view = BookingView::from(booking);
                if let Some(Some(d)) = details.get(&booking.schedule_id) {
                    view.origin = Some(d.origin.clone());
                    view.destination = Some(d.destination.clone());
                    view.departure_time = Some(d.departure_time);
                    view.arrival_time = Some(d.arrival_time);
                    view.train_name = d.train_name.clone();
                }
                view
            })
            .collect())
    }
}
