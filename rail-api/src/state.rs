use rail_order::{BookingReadModel, ReservationEngine};
use rail_store::RedisClient;
use std::sync::Arc;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone, Copy)]
pub struct RateLimit {
    pub limit: i64,
    pub window_seconds: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: ReservationEngine,
    pub read_model: Arc<BookingReadModel>,
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimit,
    pub auth: AuthConfig,
    pub metrics: Arc<Metrics>,
}
