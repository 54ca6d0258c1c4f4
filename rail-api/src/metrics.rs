use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use rail_order::SweepReport;

use crate::error::AppError;
use crate::state::AppState;

/// Reservation lifecycle counters, exported on `/metrics`.
pub struct Metrics {
    registry: Registry,
    pub reservations: IntCounterVec,
    pub payments: IntCounterVec,
    pub cancellations: IntCounter,
    pub expired: IntCounter,
    pub orphaned_holds_released: IntCounter,
    pub sweep_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reservations = IntCounterVec::new(
            Opts::new("rail_reservations_total", "Reservation attempts by outcome"),
            &["outcome"],
        )?;
        let payments = IntCounterVec::new(
            Opts::new("rail_payment_callbacks_total", "Payment callbacks by resulting booking status"),
            &["status"],
        )?;
        let cancellations = IntCounter::new("rail_cancellations_total", "Bookings cancelled by customers")?;
        let expired = IntCounter::new("rail_bookings_expired_total", "Bookings expired by the sweeper")?;
        let orphaned_holds_released = IntCounter::new(
            "rail_orphaned_holds_released_total",
            "Unreferenced seat holds released by the sweeper",
        )?;
        let sweep_failures = IntCounter::new("rail_sweep_failures_total", "Bookings the sweeper failed to expire")?;

        registry.register(Box::new(reservations.clone()))?;
        registry.register(Box::new(payments.clone()))?;
        registry.register(Box::new(cancellations.clone()))?;
        registry.register(Box::new(expired.clone()))?;
        registry.register(Box::new(orphaned_holds_released.clone()))?;
        registry.register(Box::new(sweep_failures.clone()))?;

        Ok(Self {
            registry,
            reservations,
            payments,
            cancellations,
            expired,
            orphaned_holds_released,
            sweep_failures,
        })
    }

    pub fn record_sweep(&self, report: &SweepReport) {
        self.expired.inc_by(u64::from(report.expired));
        self.orphaned_holds_released
            .inc_by(u64::from(report.orphaned_holds_released));
        self.sweep_failures.inc_by(u64::from(report.failed));
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}
