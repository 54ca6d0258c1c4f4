use chrono::{DateTime, Utc};
use rail_catalog::{HoldId, SeatInventory};
use rail_core::{CoreError, CoreResult};
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::{count, store_error};

#[derive(sqlx::FromRow)]
struct InventoryRow {
    schedule_id: i64,
    capacity: i32,
    held: i32,
    sold: i32,
}

impl TryFrom<InventoryRow> for SeatInventory {
    type Error = CoreError;

    fn try_from(row: InventoryRow) -> Result<Self, Self::Error> {
        Ok(SeatInventory {
            schedule_id: row.schedule_id,
            capacity: count(row.capacity, "capacity")?,
            held: count(row.held, "held")?,
            sold: count(row.sold, "sold")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SettledHold {
    schedule_id: i64,
    seats: i32,
}

/// Seat ledger kept in `schedule_inventory` and `seat_holds`.
///
/// Every mutation runs inside the caller's transaction so the counters move
/// together with the booking row.
pub struct InventoryRepository;

impl InventoryRepository {
    /// Create the counters row. An existing row keeps its capacity.
    pub async fn ensure(
        tx: &mut Transaction<'_, Postgres>,
        schedule_id: i64,
        capacity: u32,
    ) -> CoreResult<()> {
        let capacity = i32::try_from(capacity)
            .map_err(|_| CoreError::Validation(format!("capacity out of range: {}", capacity)))?;

        sqlx::query(
            r#"
            INSERT INTO schedule_inventory (schedule_id, capacity, held, sold)
            VALUES ($1, $2, 0, 0)
            ON CONFLICT (schedule_id) DO NOTHING
            "#,
        )
        .bind(schedule_id)
        .bind(capacity)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    pub async fn try_hold(
        tx: &mut Transaction<'_, Postgres>,
        schedule_id: i64,
        seats: u32,
        now: DateTime<Utc>,
    ) -> CoreResult<HoldId> {
        if seats == 0 {
            return Err(CoreError::Validation("seat_count must be at least 1, got 0".into()));
        }
        let requested = i32::try_from(seats)
            .map_err(|_| CoreError::Validation(format!("seat_count out of range: {}", seats)))?;

        // Check and increment in one statement; the row lock serialises holders.
        let updated = sqlx::query(
            r#"
            UPDATE schedule_inventory
            SET held = held + $2
            WHERE schedule_id = $1 AND capacity - held - sold >= $2
            "#,
        )
        .bind(schedule_id)
        .bind(requested)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;

        if updated.rows_affected() == 0 {
            let inventory = Self::current(tx, schedule_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("Inventory for schedule {}", schedule_id)))?;
            return Err(CoreError::SeatsUnavailable {
                schedule_id,
                requested: seats,
                available: inventory.available(),
            });
        }

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO seat_holds (schedule_id, seats, placed_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(schedule_id)
        .bind(requested)
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(store_error)?;

        Ok(HoldId(id))
    }

    pub async fn attach(
        tx: &mut Transaction<'_, Postgres>,
        hold: HoldId,
        booking_id: i64,
    ) -> CoreResult<bool> {
        let result = sqlx::query("UPDATE seat_holds SET booking_id = $2 WHERE id = $1")
            .bind(hold.0)
            .bind(booking_id)
            .execute(&mut **tx)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() == 1)
    }

    /// Move the hold's seats to `sold`. `false` when the hold was already settled.
    pub async fn commit(tx: &mut Transaction<'_, Postgres>, hold: HoldId) -> CoreResult<bool> {
        let Some(settled) = Self::take(tx, hold).await? else {
            return Ok(false);
        };
        sqlx::query(
            r#"
            UPDATE schedule_inventory
            SET held = held - $2, sold = sold + $2
            WHERE schedule_id = $1
            "#,
        )
        .bind(settled.schedule_id)
        .bind(settled.seats)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;
        Ok(true)
    }

    /// Return the hold's seats. `false` when the hold was already settled.
    pub async fn release(tx: &mut Transaction<'_, Postgres>, hold: HoldId) -> CoreResult<bool> {
        let Some(settled) = Self::take(tx, hold).await? else {
            return Ok(false);
        };
        Self::return_seats(tx, &settled).await?;
        Ok(true)
    }

    /// Release unattached holds placed before `cutoff`.
    pub async fn release_orphaned(
        tx: &mut Transaction<'_, Postgres>,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<u32> {
        let orphans: Vec<SettledHold> = sqlx::query_as(
            r#"
            DELETE FROM seat_holds
            WHERE booking_id IS NULL AND placed_at < $1
            RETURNING schedule_id, seats
            "#,
        )
        .bind(cutoff)
        .fetch_all(&mut **tx)
        .await
        .map_err(store_error)?;

        for orphan in &orphans {
            Self::return_seats(tx, orphan).await?;
        }
        Ok(orphans.len() as u32)
    }

    pub async fn snapshot(pool: &PgPool, schedule_id: i64) -> CoreResult<Option<SeatInventory>> {
        let row: Option<InventoryRow> = sqlx::query_as(
            "SELECT schedule_id, capacity, held, sold FROM schedule_inventory WHERE schedule_id = $1",
        )
        .bind(schedule_id)
        .fetch_optional(pool)
        .await
        .map_err(store_error)?;

        row.map(SeatInventory::try_from).transpose()
    }

    async fn current(
        tx: &mut Transaction<'_, Postgres>,
        schedule_id: i64,
    ) -> CoreResult<Option<SeatInventory>> {
        let row: Option<InventoryRow> = sqlx::query_as(
            "SELECT schedule_id, capacity, held, sold FROM schedule_inventory WHERE schedule_id = $1",
        )
        .bind(schedule_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(store_error)?;

        row.map(SeatInventory::try_from).transpose()
    }

    // Deleting the hold row is what makes commit and release single-use.
    async fn take(tx: &mut Transaction<'_, Postgres>, hold: HoldId) -> CoreResult<Option<SettledHold>> {
        sqlx::query_as("DELETE FROM seat_holds WHERE id = $1 RETURNING schedule_id, seats")
            .bind(hold.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(store_error)
    }

    async fn return_seats(tx: &mut Transaction<'_, Postgres>, hold: &SettledHold) -> CoreResult<()> {
        sqlx::query("UPDATE schedule_inventory SET held = held - $2 WHERE schedule_id = $1")
            .bind(hold.schedule_id)
            .bind(hold.seats)
            .execute(&mut **tx)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_row_conversion() {
        let inventory = SeatInventory::try_from(InventoryRow {
            schedule_id: 4,
            capacity: 10,
            held: 3,
            sold: 2,
        })
        .unwrap();
        assert_eq!(inventory.available(), 5);

        let corrupt = SeatInventory::try_from(InventoryRow {
            schedule_id: 4,
            capacity: 10,
            held: -1,
            sold: 2,
        });
        assert!(matches!(corrupt, Err(CoreError::Corrupted(_))));
    }
}
