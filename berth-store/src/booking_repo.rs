use async_trait::async_trait;
use berth_core::{
    AllocationStatus, Booking, BookingHeader, BookingStore, InventoryKey, PassengerRecord, Segment,
    StoreError, StoreResult,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::backend;

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const HEADER_COLUMNS: &str = "reference, train_id, travel_date, class_code, source, destination, \
     segment_from, segment_to, created_at";

const PASSENGER_COLUMNS: &str = "p.id, p.booking_reference, p.name, p.age, p.gender, p.id_number, \
     p.status, p.seat_id, p.reserve_position, p.waitlist_position, p.created_at";

#[derive(sqlx::FromRow)]
struct HeaderRow {
    reference: String,
    train_id: String,
    travel_date: NaiveDate,
    class_code: String,
    source: String,
    destination: String,
    segment_from: i32,
    segment_to: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<HeaderRow> for BookingHeader {
    type Error = StoreError;

    fn try_from(row: HeaderRow) -> Result<Self, Self::Error> {
        let segment = Segment::new(row.segment_from, row.segment_to)
            .map_err(|e| StoreError::Backend(format!("corrupt segment on {}: {}", row.reference, e)))?;
        Ok(BookingHeader {
            reference: row.reference,
            train_id: row.train_id,
            travel_date: row.travel_date,
            class_code: row.class_code,
            source: row.source,
            destination: row.destination,
            segment,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: Uuid,
    booking_reference: String,
    name: String,
    age: i16,
    gender: String,
    id_number: Option<String>,
    status: String,
    seat_id: Option<i32>,
    reserve_position: Option<i32>,
    waitlist_position: Option<i32>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PassengerRow> for PassengerRecord {
    type Error = StoreError;

    fn try_from(row: PassengerRow) -> Result<Self, Self::Error> {
        let status: AllocationStatus = row.status.parse().map_err(StoreError::Backend)?;
        let age = u8::try_from(row.age)
            .map_err(|_| StoreError::Backend(format!("age {} out of range for {}", row.age, row.id)))?;
        Ok(PassengerRecord {
            id: row.id,
            booking_reference: row.booking_reference,
            name: row.name,
            age,
            gender: row.gender,
            id_number: row.id_number,
            status,
            seat_id: unsigned(row.seat_id)?,
            reserve_position: unsigned(row.reserve_position)?,
            waitlist_position: unsigned(row.waitlist_position)?,
            created_at: row.created_at,
        })
    }
}

fn unsigned(value: Option<i32>) -> StoreResult<Option<u32>> {
    value
        .map(|v| u32::try_from(v).map_err(|_| StoreError::Backend(format!("negative slot value {v}"))))
        .transpose()
}

fn signed(value: Option<u32>) -> StoreResult<Option<i32>> {
    value
        .map(|v| i32::try_from(v).map_err(|_| StoreError::Backend(format!("slot value {v} too large"))))
        .transpose()
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn reference_exists(&self, reference: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM booking_headers WHERE reference = $1)")
            .bind(reference)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(exists)
    }

    async fn insert_header(&self, header: &BookingHeader) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO booking_headers (reference, train_id, travel_date, class_code, source, destination, segment_from, segment_to, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&header.reference)
        .bind(&header.train_id)
        .bind(header.travel_date)
        .bind(&header.class_code)
        .bind(&header.source)
        .bind(&header.destination)
        .bind(header.segment.from)
        .bind(header.segment.to)
        .bind(header.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateReference(header.reference.clone()))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn insert_passengers(&self, passengers: &[PassengerRecord]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        for p in passengers {
            sqlx::query(
                r#"
                INSERT INTO passengers (id, booking_reference, name, age, gender, id_number, status, seat_id, reserve_position, waitlist_position, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(p.id)
            .bind(&p.booking_reference)
            .bind(&p.name)
            .bind(i16::from(p.age))
            .bind(&p.gender)
            .bind(&p.id_number)
            .bind(p.status.as_str())
            .bind(signed(p.seat_id)?)
            .bind(signed(p.reserve_position)?)
            .bind(signed(p.waitlist_position)?)
            .bind(p.created_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn get_header(&self, reference: &str) -> StoreResult<Option<BookingHeader>> {
        let sql = format!("SELECT {HEADER_COLUMNS} FROM booking_headers WHERE reference = $1");
        let row: Option<HeaderRow> = sqlx::query_as(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(BookingHeader::try_from).transpose()
    }

    async fn list_passengers(&self, reference: &str) -> StoreResult<Vec<PassengerRecord>> {
        let sql = format!("SELECT {PASSENGER_COLUMNS} FROM passengers p WHERE p.booking_reference = $1 ORDER BY p.seq");
        let rows: Vec<PassengerRow> = sqlx::query_as(&sql)
            .bind(reference)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(PassengerRecord::try_from).collect()
    }

    async fn get_passenger(&self, passenger_id: Uuid) -> StoreResult<Option<PassengerRecord>> {
        let sql = format!("SELECT {PASSENGER_COLUMNS} FROM passengers p WHERE p.id = $1");
        let row: Option<PassengerRow> = sqlx::query_as(&sql)
            .bind(passenger_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(PassengerRecord::try_from).transpose()
    }

    async fn list_bookings(&self, key: &InventoryKey) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {HEADER_COLUMNS} FROM booking_headers \
             WHERE train_id = $1 AND travel_date = $2 AND class_code = $3 ORDER BY created_at"
        );
        let headers: Vec<HeaderRow> = sqlx::query_as(&sql)
            .bind(&key.train_id)
            .bind(key.travel_date)
            .bind(&key.class_code)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let sql = format!(
            "SELECT {PASSENGER_COLUMNS} FROM passengers p \
             JOIN booking_headers h ON h.reference = p.booking_reference \
             WHERE h.train_id = $1 AND h.travel_date = $2 AND h.class_code = $3 ORDER BY p.seq"
        );
        let rows: Vec<PassengerRow> = sqlx::query_as(&sql)
            .bind(&key.train_id)
            .bind(key.travel_date)
            .bind(&key.class_code)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let mut by_reference: HashMap<String, Vec<PassengerRecord>> = HashMap::new();
        for row in rows {
            let passenger = PassengerRecord::try_from(row)?;
            by_reference
                .entry(passenger.booking_reference.clone())
                .or_default()
                .push(passenger);
        }

        headers
            .into_iter()
            .map(|row| {
                let header = BookingHeader::try_from(row)?;
                let passengers = by_reference.remove(&header.reference).unwrap_or_default();
                Ok(Booking { header, passengers })
            })
            .collect()
    }

    async fn update_passenger(&self, passenger: &PassengerRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE passengers
            SET status = $2, seat_id = $3, reserve_position = $4, waitlist_position = $5
            WHERE id = $1
            "#,
        )
        .bind(passenger.id)
        .bind(passenger.status.as_str())
        .bind(signed(passenger.seat_id)?)
        .bind(signed(passenger.reserve_position)?)
        .bind(signed(passenger.waitlist_position)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete_passenger(&self, passenger_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM passengers WHERE id = $1")
            .bind(passenger_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_header(&self, reference: &str) -> StoreResult<bool> {
        // passengers go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM booking_headers WHERE reference = $1")
            .bind(reference)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_orphan_headers(&self, created_before: DateTime<Utc>) -> StoreResult<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT h.reference FROM booking_headers h
            WHERE h.created_at < $1
              AND NOT EXISTS (SELECT 1 FROM passengers p WHERE p.booking_reference = h.reference)
            "#,
        )
        .bind(created_before)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }
}
