use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};
use rail_catalog::SeatInventory;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub schedule_id: i64,
    pub capacity: u32,
    pub held: u32,
    pub sold: u32,
    pub available: u32,
    pub utilization: f64,
}

impl From<SeatInventory> for AvailabilityResponse {
    fn from(inv: SeatInventory) -> Self {
        Self {
            schedule_id: inv.schedule_id,
            capacity: inv.capacity,
            held: inv.held,
            sold: inv.sold,
            available: inv.available(),
            utilization: inv.utilization(),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/schedules/{id}/availability", get(availability))
}

async fn availability(
    State(state): State<AppState>,
    Path(schedule_id): Path<i64>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let inventory = state.engine.availability(schedule_id).await?;
    Ok(Json(inventory.into()))
}
