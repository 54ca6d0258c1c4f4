use async_trait::async_trait;
use rail_shared::models::{BookingEvent, BookingEventKind};

use crate::booking::Booking;

/// Sink for booking lifecycle events. Delivery is best-effort.
#[async_trait]
pub trait BookingEventSink: Send + Sync {
    async fn publish(&self, event: BookingEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

#[async_trait]
impl BookingEventSink for NoopEvents {
    async fn publish(&self, _event: BookingEvent) {}
}

pub fn booking_event(kind: BookingEventKind, booking: &Booking) -> BookingEvent {
    BookingEvent {
        kind,
        booking_id: booking.id,
        booking_code: booking.booking_code.clone(),
        user_id: booking.user_id,
        schedule_id: booking.schedule_id,
        seat_count: booking.seat_count,
        total_price: booking.total_price,
        timestamp: booking.updated_at.timestamp(),
    }
}
