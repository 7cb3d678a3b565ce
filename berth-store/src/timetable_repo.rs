use async_trait::async_trait;
use berth_core::{Stop, StopSequence, StoreResult, TimetableProvider};
use sqlx::PgPool;

use crate::database::backend;

/// Stop lists read from the `train_stops` table.
pub struct PgTimetable {
    pool: PgPool,
}

impl PgTimetable {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StopRow {
    station_code: String,
    position: i32,
}

#[async_trait]
impl TimetableProvider for PgTimetable {
    async fn stop_sequence(&self, train_id: &str) -> StoreResult<Option<StopSequence>> {
        let rows: Vec<StopRow> = sqlx::query_as(
            "SELECT station_code, position FROM train_stops WHERE train_id = $1 ORDER BY position",
        )
        .bind(train_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let stops = rows
            .into_iter()
            .map(|row| Stop::new(row.station_code, row.position))
            .collect();
        Ok(Some(StopSequence::new(train_id, stops)))
    }
}
