use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rail_core::repository::ScheduleCatalog;
use rail_core::{CoreResult, ScheduleDetails, ScheduleSnapshot};
use sqlx::PgPool;

use crate::database::{count, store_error};

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    schedule_id: i64,
    price: i64,
    capacity: i32,
}

#[derive(sqlx::FromRow)]
struct DetailsRow {
    schedule_id: i64,
    origin: String,
    destination: String,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    train_name: Option<String>,
}

impl From<DetailsRow> for ScheduleDetails {
    fn from(row: DetailsRow) -> Self {
        Self {
            schedule_id: row.schedule_id,
            origin: row.origin,
            destination: row.destination,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            train_name: row.train_name,
        }
    }
}

/// Reads the schedule and train tables owned by the catalog service.
pub struct PgScheduleCatalog {
    pool: PgPool,
}

impl PgScheduleCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleCatalog for PgScheduleCatalog {
    async fn schedule_snapshot(&self, schedule_id: i64) -> CoreResult<Option<ScheduleSnapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT s.id AS schedule_id, s.price, t.capacity
            FROM schedules s
            JOIN trains t ON t.id = s.train_id
            WHERE s.id = $1 AND s.deleted_at IS NULL AND t.deleted_at IS NULL
            "#,
        )
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(|r| {
            Ok(ScheduleSnapshot {
                schedule_id: r.schedule_id,
                price: r.price,
                capacity: count(r.capacity, "capacity")?,
            })
        })
        .transpose()
    }

    async fn schedule_details(&self, schedule_id: i64) -> CoreResult<Option<ScheduleDetails>> {
        let row: Option<DetailsRow> = sqlx::query_as(
            r#"
            SELECT s.id AS schedule_id, s.origin, s.destination, s.departure_time, s.arrival_time,
                   t.name AS train_name
            FROM schedules s
            LEFT JOIN trains t ON t.id = s.train_id AND t.deleted_at IS NULL
            WHERE s.id = $1 AND s.deleted_at IS NULL
            "#,
        )
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(ScheduleDetails::from))
    }
}
