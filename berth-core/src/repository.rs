use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{Booking, BookingHeader, InventoryKey, PassengerRecord};
use crate::route::StopSequence;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Booking reference already exists: {0}")]
    DuplicateReference(String),
    #[error("Inventory busy: {0}")]
    LockUnavailable(String),
    #[error("Datastore failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Source of train stop sequences
#[async_trait]
pub trait TimetableProvider: Send + Sync {
    async fn stop_sequence(&self, train_id: &str) -> StoreResult<Option<StopSequence>>;
}

/// Persistence for booking headers and passenger rows.
///
/// Each call is independent; implementations are not expected to offer
/// multi-call transactions. `insert_header` must reject a reference that is
/// already stored with [`StoreError::DuplicateReference`], and deleting a
/// header removes its passengers.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn reference_exists(&self, reference: &str) -> StoreResult<bool>;

    async fn insert_header(&self, header: &BookingHeader) -> StoreResult<()>;

    async fn insert_passengers(&self, passengers: &[PassengerRecord]) -> StoreResult<()>;

    async fn get_header(&self, reference: &str) -> StoreResult<Option<BookingHeader>>;

    /// Passengers of a booking in insertion order.
    async fn list_passengers(&self, reference: &str) -> StoreResult<Vec<PassengerRecord>>;

    async fn get_passenger(&self, passenger_id: Uuid) -> StoreResult<Option<PassengerRecord>>;

    /// All bookings sharing an inventory, with their passengers.
    async fn list_bookings(&self, key: &InventoryKey) -> StoreResult<Vec<Booking>>;

    async fn update_passenger(&self, passenger: &PassengerRecord) -> StoreResult<()>;

    /// Returns false when the row was already gone.
    async fn delete_passenger(&self, passenger_id: Uuid) -> StoreResult<bool>;

    /// Returns false when the header was already gone.
    async fn delete_header(&self, reference: &str) -> StoreResult<bool>;

    /// References of headers without passengers created before the cutoff.
    async fn find_orphan_headers(&self, created_before: DateTime<Utc>) -> StoreResult<Vec<String>>;
}

/// Mutual exclusion over one inventory, with an expiry so a crashed holder
/// cannot wedge it.
#[async_trait]
pub trait InventoryLock: Send + Sync {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> StoreResult<bool>;

    /// Releases only if `holder` still owns the lock.
    async fn release(&self, key: &str, holder: &str) -> StoreResult<()>;
}
