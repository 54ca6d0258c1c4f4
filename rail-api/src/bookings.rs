use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use rail_core::page::{DEFAULT_LIMIT, DEFAULT_PAGE};
use rail_core::{CoreError, PageRequest};
use rail_order::BookingView;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, Customer};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub schedule_id: i64,
    pub seat_count: i64,
}

#[derive(Debug, Serialize)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingView>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route_layer(middleware::from_fn_with_state(state, customer_auth_middleware))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingView>), AppError> {
    let reserved = state
        .engine
        .reserve(customer.id, req.schedule_id, req.seat_count)
        .await;

    let outcome = match &reserved {
        Ok(_) => "reserved",
        Err(CoreError::SeatsUnavailable { .. }) => "sold_out",
        Err(e) if e.is_business() => "rejected",
        Err(_) => "error",
    };
    state.metrics.reservations.with_label_values(&[outcome]).inc();

    let booking = reserved?;
    let view = state.read_model.view(&booking).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Query(query): Query<PageRequest>,
) -> Result<Json<BookingListResponse>, AppError> {
    let page = state
        .engine
        .list_by_user(
            customer.id,
            query.page.unwrap_or(i64::from(DEFAULT_PAGE)),
            query.limit.unwrap_or(i64::from(DEFAULT_LIMIT)),
        )
        .await?;

    let bookings = state.read_model.views(&page.bookings).await?;
    Ok(Json(BookingListResponse {
        bookings,
        total: page.total,
        page: page.page.page,
        limit: page.page.limit,
    }))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(id): Path<i64>,
) -> Result<Json<BookingView>, AppError> {
    let booking = state.engine.get_booking(id).await?;
    // Other customers' bookings are indistinguishable from missing ones.
    if booking.user_id != customer.id {
        return Err(CoreError::NotFound(format!("Booking {}", id)).into());
    }
    Ok(Json(state.read_model.view(&booking).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(id): Path<i64>,
) -> Result<Json<BookingView>, AppError> {
    let booking = state.engine.cancel(id, customer.id).await?;
    state.metrics.cancellations.inc();
    Ok(Json(state.read_model.view(&booking).await?))
}
