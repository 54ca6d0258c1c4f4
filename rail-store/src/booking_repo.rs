use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rail_catalog::{HoldId, SeatInventory};
use rail_core::repository::{BookingStore, Finalized};
use rail_core::{Booking, BookingStatus, CoreError, CoreResult, NewBooking, Page};
use sqlx::PgPool;

use crate::database::{count, store_error};
use crate::inventory_repo::InventoryRepository;

const BOOKING_COLUMNS: &str = "id, user_id, schedule_id, seat_count, status, booking_code, hold_id, \
     price_per_seat, total_price, created_at, hold_deadline, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    user_id: i64,
    schedule_id: i64,
    seat_count: i32,
    status: i16,
    booking_code: String,
    hold_id: i64,
    price_per_seat: i64,
    total_price: i64,
    created_at: DateTime<Utc>,
    hold_deadline: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::from_code(row.status).ok_or_else(|| {
            CoreError::Corrupted(format!("booking {} has unknown status {}", row.id, row.status))
        })?;
        let seat_count = count(row.seat_count, "seat_count")?;

        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            schedule_id: row.schedule_id,
            seat_count,
            status,
            booking_code: row.booking_code,
            hold_id: HoldId(row.hold_id),
            price_per_seat: row.price_per_seat,
            total_price: row.total_price,
            created_at: row.created_at,
            hold_deadline: row.hold_deadline,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

fn is_code_collision(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint().map_or(true, |c| c.contains("booking_code"))
        }
        _ => false,
    }
}

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn reserve(&self, request: NewBooking) -> CoreResult<Booking> {
        let seat_count = i32::try_from(request.seat_count)
            .map_err(|_| CoreError::Validation(format!("seat_count out of range: {}", request.seat_count)))?;

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        InventoryRepository::ensure(&mut tx, request.schedule_id, request.capacity).await?;
        let hold = InventoryRepository::try_hold(
            &mut tx,
            request.schedule_id,
            request.seat_count,
            request.created_at,
        )
        .await?;

        let inserted = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            INSERT INTO bookings (user_id, schedule_id, seat_count, status, booking_code, hold_id,
                                  price_per_seat, total_price, created_at, hold_deadline, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $9)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(request.user_id)
        .bind(request.schedule_id)
        .bind(seat_count)
        .bind(BookingStatus::Pending.code())
        .bind(&request.booking_code)
        .bind(hold.0)
        .bind(request.price_per_seat)
        .bind(request.total_price())
        .bind(request.created_at)
        .bind(request.hold_deadline)
        .fetch_one(&mut *tx)
        .await;

        // Dropping the transaction rolls back the hold on every error path.
        let row = match inserted {
            Ok(row) => row,
            Err(e) if is_code_collision(&e) => {
                return Err(CoreError::DuplicateBookingCode(request.booking_code));
            }
            Err(e) => return Err(store_error(e)),
        };

        if !InventoryRepository::attach(&mut tx, hold, row.id).await? {
            return Err(CoreError::Corrupted(format!(
                "{} vanished before booking {} was stored",
                hold, row.id
            )));
        }
        tx.commit().await.map_err(store_error)?;

        Booking::try_from(row)
    }

    async fn get(&self, id: i64) -> CoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_by_user(&self, user_id: i64, page: Page) -> CoreResult<(Vec<Booking>, u64)> {
        let offset = i64::try_from(page.offset())
            .map_err(|_| CoreError::Validation(format!("page out of range: {}", page.page)))?;

        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            "#,
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::from(page.limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE user_id = $1 AND deleted_at IS NULL")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(store_error)?;

        let bookings = rows
            .into_iter()
            .map(Booking::try_from)
            .collect::<CoreResult<Vec<_>>>()?;
        Ok((bookings, u64::try_from(total).unwrap_or(0)))
    }

    async fn finalize(&self, id: i64, to: BookingStatus, at: DateTime<Utc>) -> CoreResult<Finalized> {
        BookingStatus::Pending.transition(id, to)?;

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let moved: Option<BookingRow> = sqlx::query_as(&format!(
            r#"
            UPDATE bookings
            SET status = $2,
                updated_at = $3,
                deleted_at = CASE WHEN $2 = $4 THEN $3 ELSE deleted_at END
            WHERE id = $1 AND status = $5
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(to.code())
        .bind(at)
        .bind(BookingStatus::Cancelled.code())
        .bind(BookingStatus::Pending.code())
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        let Some(row) = moved else {
            // Lost the compare-and-set, or the booking does not exist.
            let current: Option<BookingRow> =
                sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(store_error)?;
            return match current {
                Some(row) => Ok(Finalized::Unchanged(Booking::try_from(row)?)),
                None => Err(CoreError::NotFound(format!("Booking {}", id))),
            };
        };

        let booking = Booking::try_from(row)?;
        let settled = match to {
            BookingStatus::Success => InventoryRepository::commit(&mut tx, booking.hold_id).await?,
            _ => InventoryRepository::release(&mut tx, booking.hold_id).await?,
        };
        if !settled {
            // Dropping the transaction undoes the status change.
            return Err(CoreError::Corrupted(format!(
                "booking {} cannot move to {}: {} was already settled",
                id, to, booking.hold_id
            )));
        }

        tx.commit().await.map_err(store_error)?;
        Ok(Finalized::Applied(booking))
    }

    async fn overdue(&self, now: DateTime<Utc>, limit: u32) -> CoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE status = $1 AND hold_deadline < $2
            ORDER BY hold_deadline, id
            LIMIT $3
            "#,
            BOOKING_COLUMNS
        ))
        .bind(BookingStatus::Pending.code())
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn release_orphaned_holds(&self, cutoff: DateTime<Utc>) -> CoreResult<u32> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let released = InventoryRepository::release_orphaned(&mut tx, cutoff).await?;
        tx.commit().await.map_err(store_error)?;
        Ok(released)
    }

    async fn inventory(&self, schedule_id: i64) -> CoreResult<Option<SeatInventory>> {
        InventoryRepository::snapshot(&self.pool, schedule_id).await
    }
}
