use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use rail_core::PaymentOutcome;
use rail_order::BookingView;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

/// Status report from the payment provider.
#[derive(Debug, Deserialize)]
pub struct PaymentCallback {
    pub booking_id: i64,
    pub user_id: i64,
    pub status: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments/callback", post(payment_callback))
}

async fn payment_callback(
    State(state): State<AppState>,
    Json(callback): Json<PaymentCallback>,
) -> Result<Json<BookingView>, AppError> {
    let outcome: PaymentOutcome = callback.status.parse()?;
    info!(
        "Payment callback for booking {}: {}",
        callback.booking_id, callback.status
    );

    let booking = state
        .engine
        .confirm(callback.booking_id, callback.user_id, outcome)
        .await?;
    state
        .metrics
        .payments
        .with_label_values(&[booking.status.as_str()])
        .inc();

    Ok(Json(state.read_model.view(&booking).await?))
}
