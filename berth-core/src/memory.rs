//! In-process adapters for the store, timetable and lock traits.
//!
//! Used by tests and local runs. The store can be told to fail specific
//! operations so partial-failure paths can be exercised.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Booking, BookingHeader, InventoryKey, PassengerRecord};
use crate::repository::{BookingStore, InventoryLock, StoreError, StoreResult, TimetableProvider};
use crate::route::StopSequence;

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ReferenceExists,
    InsertHeader,
    InsertPassengers,
    GetHeader,
    ListPassengers,
    GetPassenger,
    ListBookings,
    UpdatePassenger,
    DeletePassenger,
    DeleteHeader,
    FindOrphans,
}

#[derive(Default)]
struct MemoryState {
    headers: BTreeMap<String, BookingHeader>,
    passengers: Vec<PassengerRecord>,
    taken_references: HashSet<String>,
    rejected_on_insert: HashSet<String>,
    faults: HashSet<StoreOp>,
    // calls left before an operation starts failing
    delayed_faults: HashMap<StoreOp, usize>,
    header_deletes: usize,
}

#[derive(Default)]
pub struct InMemoryBookingStore {
    state: Mutex<MemoryState>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn check(&self, op: StoreOp) -> StoreResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.state()?;
        let delayed = match state.delayed_faults.get_mut(&op) {
            Some(0) => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        };
        if delayed || state.faults.contains(&op) {
            return Err(StoreError::Backend(format!("injected failure on {:?}", op)));
        }
        Ok(state)
    }

    pub fn fail_on(&self, op: StoreOp) {
        if let Ok(mut state) = self.state() {
            state.faults.insert(op);
        }
    }

    /// Let `op` succeed `successes` more times, then fail on every call.
    pub fn fail_after(&self, op: StoreOp, successes: usize) {
        if let Ok(mut state) = self.state() {
            state.delayed_faults.insert(op, successes);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut state) = self.state() {
            state.faults.clear();
            state.delayed_faults.clear();
        }
    }

    /// Make `reference_exists` report the reference as used.
    pub fn mark_reference_taken(&self, reference: &str) {
        if let Ok(mut state) = self.state() {
            state.taken_references.insert(reference.to_string());
        }
    }

    /// Make the next `insert_header` for this reference fail with a uniqueness
    /// violation even though `reference_exists` reports it free.
    pub fn reject_reference_on_insert(&self, reference: &str) {
        if let Ok(mut state) = self.state() {
            state.rejected_on_insert.insert(reference.to_string());
        }
    }

    pub fn header_count(&self) -> usize {
        self.state().map(|s| s.headers.len()).unwrap_or(0)
    }

    pub fn passenger_count(&self) -> usize {
        self.state().map(|s| s.passengers.len()).unwrap_or(0)
    }

    /// Number of headers removed so far.
    pub fn header_deletes(&self) -> usize {
        self.state().map(|s| s.header_deletes).unwrap_or(0)
    }

    /// Insert a header/passenger set directly, bypassing the engine.
    pub fn seed(&self, header: BookingHeader, passengers: Vec<PassengerRecord>) {
        if let Ok(mut state) = self.state() {
            state.headers.insert(header.reference.clone(), header);
            state.passengers.extend(passengers);
        }
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn reference_exists(&self, reference: &str) -> StoreResult<bool> {
        let state = self.check(StoreOp::ReferenceExists)?;
        Ok(state.headers.contains_key(reference) || state.taken_references.contains(reference))
    }

    async fn insert_header(&self, header: &BookingHeader) -> StoreResult<()> {
        let mut state = self.check(StoreOp::InsertHeader)?;
        if state.rejected_on_insert.remove(&header.reference)
            || state.headers.contains_key(&header.reference)
        {
            return Err(StoreError::DuplicateReference(header.reference.clone()));
        }
        state.headers.insert(header.reference.clone(), header.clone());
        Ok(())
    }

    async fn insert_passengers(&self, passengers: &[PassengerRecord]) -> StoreResult<()> {
        let mut state = self.check(StoreOp::InsertPassengers)?;
        if let Some(orphan) = passengers
            .iter()
            .find(|p| !state.headers.contains_key(&p.booking_reference))
        {
            return Err(StoreError::Backend(format!(
                "no booking header {} for passenger {}",
                orphan.booking_reference, orphan.id
            )));
        }
        state.passengers.extend_from_slice(passengers);
        Ok(())
    }

    async fn get_header(&self, reference: &str) -> StoreResult<Option<BookingHeader>> {
        let state = self.check(StoreOp::GetHeader)?;
        Ok(state.headers.get(reference).cloned())
    }

    async fn list_passengers(&self, reference: &str) -> StoreResult<Vec<PassengerRecord>> {
        let state = self.check(StoreOp::ListPassengers)?;
        Ok(state
            .passengers
            .iter()
            .filter(|p| p.booking_reference == reference)
            .cloned()
            .collect())
    }

    async fn get_passenger(&self, passenger_id: Uuid) -> StoreResult<Option<PassengerRecord>> {
        let state = self.check(StoreOp::GetPassenger)?;
        Ok(state.passengers.iter().find(|p| p.id == passenger_id).cloned())
    }

    async fn list_bookings(&self, key: &InventoryKey) -> StoreResult<Vec<Booking>> {
        let state = self.check(StoreOp::ListBookings)?;
        let bookings = state
            .headers
            .values()
            .filter(|h| &h.inventory_key() == key)
            .map(|header| Booking {
                header: header.clone(),
                passengers: state
                    .passengers
                    .iter()
                    .filter(|p| p.booking_reference == header.reference)
                    .cloned()
                    .collect(),
            })
            .collect();
        Ok(bookings)
    }

    async fn update_passenger(&self, passenger: &PassengerRecord) -> StoreResult<()> {
        let mut state = self.check(StoreOp::UpdatePassenger)?;
        let row = state
            .passengers
            .iter_mut()
            .find(|p| p.id == passenger.id)
            .ok_or_else(|| StoreError::Backend(format!("passenger {} not found", passenger.id)))?;
        *row = passenger.clone();
        Ok(())
    }

    async fn delete_passenger(&self, passenger_id: Uuid) -> StoreResult<bool> {
        let mut state = self.check(StoreOp::DeletePassenger)?;
        let before = state.passengers.len();
        state.passengers.retain(|p| p.id != passenger_id);
        Ok(state.passengers.len() != before)
    }

    async fn delete_header(&self, reference: &str) -> StoreResult<bool> {
        let mut state = self.check(StoreOp::DeleteHeader)?;
        if state.headers.remove(reference).is_none() {
            return Ok(false);
        }
        state.passengers.retain(|p| p.booking_reference != reference);
        state.header_deletes += 1;
        Ok(true)
    }

    async fn find_orphan_headers(&self, created_before: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let state = self.check(StoreOp::FindOrphans)?;
        Ok(state
            .headers
            .values()
            .filter(|h| h.created_at < created_before)
            .filter(|h| !state.passengers.iter().any(|p| p.booking_reference == h.reference))
            .map(|h| h.reference.clone())
            .collect())
    }
}

/// Timetable backed by a fixed map of stop sequences.
#[derive(Default, Clone)]
pub struct StaticTimetable {
    trains: HashMap<String, StopSequence>,
}

impl StaticTimetable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_train(mut self, sequence: StopSequence) -> Self {
        self.trains.insert(sequence.train_id.clone(), sequence);
        self
    }
}

#[async_trait]
impl TimetableProvider for StaticTimetable {
    async fn stop_sequence(&self, train_id: &str) -> StoreResult<Option<StopSequence>> {
        Ok(self.trains.get(train_id).cloned())
    }
}

/// Single-process equivalent of a `SET NX EX` lock.
#[derive(Default)]
pub struct LocalInventoryLock {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl LocalInventoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryLock for LocalInventoryLock {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> StoreResult<bool> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| StoreError::Backend("inventory lock poisoned".to_string()))?;
        let now = Instant::now();
        match held.get(key) {
            Some((_, expires_at)) if *expires_at > now => Ok(false),
            previous => {
                if let Some((stale, _)) = previous {
                    debug!("Lock {} expired for {}, handing to {}", key, stale, holder);
                }
                held.insert(key.to_string(), (holder.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, holder: &str) -> StoreResult<()> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| StoreError::Backend("inventory lock poisoned".to_string()))?;
        if held.get(key).map(|(owner, _)| owner == holder).unwrap_or(false) {
            held.remove(key);
        }
        Ok(())
    }
}
