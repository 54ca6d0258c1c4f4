use chrono::{DateTime, Duration, Utc};
use rail_core::events::{booking_event, BookingEventSink, NoopEvents};
use rail_core::repository::{BookingStore, Finalized};
use rail_core::{BookingStatus, CoreResult};
use rail_shared::models::BookingEventKind;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: u32,
    /// Bookings that left `Pending` between selection and update
    pub lost_races: u32,
    /// Bookings whose update failed; picked up again on the next pass
    pub failed: u32,
    pub orphaned_holds_released: u32,
}

/// Expires overdue pending bookings and reclaims orphaned holds.
pub struct ExpirySweeper {
    store: Arc<dyn BookingStore>,
    events: Arc<dyn BookingEventSink>,
    hold_duration: Duration,
    batch_size: u32,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn BookingStore>, hold_duration: Duration, batch_size: u32) -> Self {
        Self {
            store,
            events: Arc::new(NoopEvents),
            hold_duration,
            batch_size: batch_size.max(1),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn BookingEventSink>) -> Self {
        self.events = events;
        self
    }

    pub async fn sweep(&self) -> CoreResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one pass as of `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let mut report = SweepReport::default();

        loop {
            let due = self.store.overdue(now, self.batch_size).await?;
            let batch_len = due.len();
            let mut progressed = false;

            for booking in due {
                match self.store.finalize(booking.id, BookingStatus::Expired, now).await {
                    Ok(Finalized::Applied(expired)) => {
                        report.expired += 1;
                        progressed = true;
                        self.events
                            .publish(booking_event(BookingEventKind::Expired, &expired))
                            .await;
                    }
                    Ok(Finalized::Unchanged(_)) => {
                        report.lost_races += 1;
                        progressed = true;
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!("Failed to expire booking {}: {}", booking.id, e);
                    }
                }
            }

            // A short batch means nothing else is due; a batch of pure failures
            // would be selected again, so stop and let the next pass retry.
            if batch_len < self.batch_size as usize || !progressed {
                break;
            }
        }

        report.orphaned_holds_released = self
            .store
            .release_orphaned_holds(now - self.hold_duration)
            .await?;

        if report != SweepReport::default() {
            info!(
                "Sweep finished: {} expired, {} lost races, {} failed, {} orphaned holds released",
                report.expired, report.lost_races, report.failed, report.orphaned_holds_released
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ReservationEngine, ReservationPolicy};
    use crate::memory::{MemoryCatalog, MemoryStore};

    fn setup(capacity: u32) -> (ReservationEngine, ExpirySweeper, Arc<MemoryStore>) {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.add_train(1, "Sancaka", capacity);
        catalog.add_schedule(1, 1, "Surabaya", "Yogyakarta", 200_000);
        let store = Arc::new(MemoryStore::new());
        let engine = ReservationEngine::new(store.clone(), catalog, ReservationPolicy::default());
        let sweeper = ExpirySweeper::new(store.clone(), Duration::minutes(10), 2);
        (engine, sweeper, store)
    }

    #[tokio::test]
    async fn test_nothing_due_before_deadline() {
        let (engine, sweeper, _) = setup(3);
        engine.reserve(1, 1, 1).await.unwrap();

        let report = sweeper.sweep_at(Utc::now() + Duration::minutes(5)).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_batches_drain_all_overdue() {
        let (engine, sweeper, store) = setup(10);
        for user in 1..=5 {
            engine.reserve(user, 1, 2).await.unwrap();
        }

        let report = sweeper.sweep_at(Utc::now() + Duration::minutes(11)).await.unwrap();
        assert_eq!(report.expired, 5);
        assert_eq!(store.inventory(1).await.unwrap().unwrap().held, 0);

        let again = sweeper.sweep_at(Utc::now() + Duration::minutes(12)).await.unwrap();
        assert_eq!(again.expired, 0);
    }

    #[tokio::test]
    async fn test_orphaned_hold_reclaimed() {
        let (_, sweeper, store) = setup(4);
        store.ledger().ensure(1, 4).unwrap();
        store
            .ledger()
            .try_hold(1, 3, Utc::now() - Duration::minutes(15))
            .unwrap();

        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.orphaned_holds_released, 1);
        assert_eq!(store.inventory(1).await.unwrap().unwrap().held, 0);
    }
}
