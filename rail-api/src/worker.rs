use rail_order::ExpirySweeper;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::metrics::Metrics;

/// Run the expiry sweeper on a fixed interval until the task is aborted.
pub async fn start_expiry_worker(sweeper: Arc<ExpirySweeper>, period: Duration, metrics: Arc<Metrics>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Expiry worker started, sweeping every {:?}", period);

    loop {
        ticker.tick().await;
        match sweeper.sweep().await {
            Ok(report) => metrics.record_sweep(&report),
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rail_core::repository::BookingStore;
    use rail_order::{MemoryCatalog, MemoryStore, ReservationEngine, ReservationPolicy};

    #[tokio::test]
    async fn test_worker_expires_overdue_bookings() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.add_train(1, "Jayabaya", 2);
        catalog.add_schedule(1, 1, "Malang", "Jakarta", 400_000);
        let store = Arc::new(MemoryStore::new());

        // A zero hold duration makes every booking overdue immediately.
        let policy = ReservationPolicy {
            hold_duration: chrono::Duration::zero(),
            ..ReservationPolicy::default()
        };
        let engine = ReservationEngine::new(store.clone(), catalog, policy);
        let booking = engine.reserve(1, 1, 2).await.unwrap();

        let metrics = Arc::new(Metrics::new().unwrap());
        let sweeper = Arc::new(ExpirySweeper::new(store.clone(), chrono::Duration::minutes(10), 10));
        let handle = tokio::spawn(start_expiry_worker(
            sweeper,
            Duration::from_millis(10),
            metrics.clone(),
        ));

        let deadline = Utc::now() + chrono::Duration::seconds(5);
        while metrics.expired.get() == 0 && Utc::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(metrics.expired.get(), 1);
        let expired = store.get(booking.id).await.unwrap().unwrap();
        assert_eq!(expired.status, rail_core::BookingStatus::Expired);
        assert_eq!(store.inventory(1).await.unwrap().unwrap().held, 0);
    }
}
