use berth_core::{
    AllocationStatus, Booking, BookingHeader, BookingStore, ClassCapacity, EngineConfig, InventoryKey,
    InventoryLock, PassengerRecord, RouteError, Segment, StoreError, StoreResult, TimetableProvider,
};
use berth_core::route::normalize_code;
use berth_inventory::compute_occupancy;
use berth_shared::pii::{Masked, PiiCipher};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::allocation::{allocate_passengers, Allocation};
use crate::cancellation::QueueBoard;
use crate::error::{BookingError, BookingResult};
use crate::models::{
    BookingStatusView, CancellationOutcome, CancellationResult, CreateBookingRequest, PassengerStatus,
    Promotion,
};
use crate::reference::ReferenceGenerator;

/// Booking operations exposed to the HTTP layer.
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    timetable: Arc<dyn TimetableProvider>,
    cipher: Arc<dyn PiiCipher>,
    lock: Arc<dyn InventoryLock>,
    config: Arc<EngineConfig>,
    references: ReferenceGenerator,
}

/// Proof of holding an inventory lock; hand back to `unlock`.
struct InventoryGuard {
    key: String,
    holder: String,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        timetable: Arc<dyn TimetableProvider>,
        cipher: Arc<dyn PiiCipher>,
        lock: Arc<dyn InventoryLock>,
        config: EngineConfig,
    ) -> Self {
        let references = ReferenceGenerator::new(&config);
        Self::with_references(store, timetable, cipher, lock, config, references)
    }

    pub fn with_references(
        store: Arc<dyn BookingStore>,
        timetable: Arc<dyn TimetableProvider>,
        cipher: Arc<dyn PiiCipher>,
        lock: Arc<dyn InventoryLock>,
        config: EngineConfig,
        references: ReferenceGenerator,
    ) -> Self {
        Self {
            store,
            timetable,
            cipher,
            lock,
            config: Arc::new(config),
            references,
        }
    }

    /// Allocate every passenger of the request or none of them.
    pub async fn create_booking(&self, mut request: CreateBookingRequest) -> BookingResult<Booking> {
        // One spelling per class, so the inventory key matches capacity lookup.
        request.class_code = normalize_code(&request.class_code);

        if request.passengers.is_empty() {
            return Err(BookingError::InvalidRequest("a booking needs at least one passenger".to_string()));
        }

        let stops = self
            .timetable
            .stop_sequence(&request.train_id)
            .await?
            .ok_or_else(|| RouteError::UnknownTrain(request.train_id.clone()))?;
        let segment = stops.resolve_segment(&request.source, &request.destination)?;

        let reference = self.references.generate(self.store.as_ref(), &request.source).await?;

        let key = InventoryKey::new(request.train_id.clone(), request.travel_date, request.class_code.clone());
        let guard = self.lock_inventory(&key).await?;
        let result = self.allocate_and_persist(&request, segment, &key, reference).await;
        self.unlock(guard).await;

        let booking = result?;
        info!(
            "Booking {} created on {} {} {}: {} passenger(s)",
            booking.header.reference,
            key.train_id,
            key.travel_date,
            key.class_code,
            booking.passengers.len()
        );
        Ok(booking)
    }

    async fn allocate_and_persist(
        &self,
        request: &CreateBookingRequest,
        segment: Segment,
        key: &InventoryKey,
        mut reference: String,
    ) -> BookingResult<Booking> {
        let capacity = self.config.capacity.lookup(&key.train_id, &key.class_code);
        let existing = self.store.list_bookings(key).await?;
        let mut occupancy = compute_occupancy(&segment, &existing);

        let allocations = allocate_passengers(
            &mut occupancy,
            &capacity,
            request.passengers.iter().map(|p| p.preferred_seat),
        )
        .ok_or_else(|| BookingError::NoCapacity {
            train_id: key.train_id.clone(),
            class_code: key.class_code.clone(),
        })?;

        let now = Utc::now();
        let mut header = BookingHeader {
            reference: reference.clone(),
            train_id: request.train_id.clone(),
            travel_date: request.travel_date,
            class_code: request.class_code.clone(),
            source: request.source.clone(),
            destination: request.destination.clone(),
            segment,
            created_at: now,
        };

        let mut passengers = Vec::with_capacity(request.passengers.len());
        for (p, allocation) in request.passengers.iter().zip(allocations) {
            let id_number = p
                .id_number
                .as_ref()
                .map(|plain| self.cipher.encode(plain.expose()))
                .transpose()?;

            let mut record = PassengerRecord {
                id: Uuid::new_v4(),
                booking_reference: reference.clone(),
                name: p.name.clone(),
                age: p.age,
                gender: p.gender.clone(),
                id_number,
                status: AllocationStatus::Waitlisted,
                seat_id: None,
                reserve_position: None,
                waitlist_position: None,
                created_at: now,
            };
            match allocation {
                Allocation::Confirmed { seat_id } => record.confirm(seat_id),
                Allocation::Reserve { position } => record.reserve(position),
                Allocation::Waitlisted { position } => record.waitlist(position),
            }
            passengers.push(record);
        }

        // The pre-check in the generator can race; the store's constraint is
        // authoritative, so a late duplicate just means drawing again.
        let mut retries = self.config.reference_attempts.max(1);
        loop {
            match self.store.insert_header(&header).await {
                Ok(()) => break,
                Err(StoreError::DuplicateReference(taken)) if retries > 0 => {
                    retries -= 1;
                    warn!("Reference {} was claimed concurrently, drawing another", taken);
                    reference = self.references.generate(self.store.as_ref(), &request.source).await?;
                    header.reference = reference.clone();
                    for p in passengers.iter_mut() {
                        p.booking_reference = reference.clone();
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Err(e) = self.store.insert_passengers(&passengers).await {
            warn!("Passenger insert for {} failed, removing header: {}", reference, e);
            if let Err(cleanup) = self.store.delete_header(&reference).await {
                error!("Compensating delete of {} failed, header is orphaned: {}", reference, cleanup);
            }
            return Err(e.into());
        }

        Ok(Booking { header, passengers })
    }

    /// Cancel one passenger, or every passenger when `passenger_id` is `None`.
    pub async fn cancel_booking(
        &self,
        reference: &str,
        passenger_id: Option<Uuid>,
    ) -> BookingResult<CancellationOutcome> {
        let header = self
            .store
            .get_header(reference)
            .await?
            .ok_or_else(|| BookingError::NotFound(reference.to_string()))?;

        let targets: Vec<Uuid> = match passenger_id {
            Some(id) => {
                let owned = self
                    .store
                    .get_passenger(id)
                    .await?
                    .filter(|p| p.booking_reference == reference)
                    .ok_or_else(|| BookingError::NotFound(format!("{reference}/{id}")))?;
                vec![owned.id]
            }
            None => self.store.list_passengers(reference).await?.into_iter().map(|p| p.id).collect(),
        };

        let key = header.inventory_key();
        let guard = self.lock_inventory(&key).await?;
        let result = self.cancel_locked(&header, targets).await;
        self.unlock(guard).await;

        let outcome = result?;
        info!(
            "Cancelled {} passenger(s) on {} ({:?}), {} promotion(s)",
            outcome.cancelled.len(),
            reference,
            outcome.result,
            outcome.promotions.len()
        );
        Ok(outcome)
    }

    async fn cancel_locked(&self, header: &BookingHeader, targets: Vec<Uuid>) -> BookingResult<CancellationOutcome> {
        let key = header.inventory_key();
        let capacity = self.config.capacity.lookup(&key.train_id, &key.class_code);
        let pending: HashSet<Uuid> = targets.iter().copied().collect();

        let mut cancelled: Vec<Uuid> = Vec::new();
        let mut promotions = Vec::new();

        for passenger_id in targets {
            let passenger = match self.remove_passenger(passenger_id).await {
                Ok(Some(passenger)) => passenger,
                Ok(None) => continue,
                Err(e) if cancelled.is_empty() => return Err(e.into()),
                Err(e) => {
                    // Rows already removed stay removed; report them.
                    warn!(
                        "Stopping cancellation on {} after {} passenger(s): {}",
                        header.reference,
                        cancelled.len(),
                        e
                    );
                    break;
                }
            };
            cancelled.push(passenger_id);

            match self.redistribute(&key, capacity, &pending, header.segment, &passenger).await {
                Ok(promoted) => promotions.extend(promoted),
                Err(e) => warn!(
                    "Promotion after cancelling {} on {} skipped: {}",
                    passenger_id, header.reference, e
                ),
            }
        }

        let result = self.teardown_if_empty(&header.reference).await;

        Ok(CancellationOutcome {
            reference: header.reference.clone(),
            result,
            cancelled,
            promotions,
        })
    }

    /// Re-read then delete: an earlier iteration may have moved this passenger.
    async fn remove_passenger(&self, passenger_id: Uuid) -> StoreResult<Option<PassengerRecord>> {
        let Some(passenger) = self.store.get_passenger(passenger_id).await? else {
            return Ok(None);
        };
        if !self.store.delete_passenger(passenger_id).await? {
            return Ok(None);
        }
        Ok(Some(passenger))
    }

    async fn redistribute(
        &self,
        key: &InventoryKey,
        capacity: ClassCapacity,
        pending: &HashSet<Uuid>,
        segment: Segment,
        vacated: &PassengerRecord,
    ) -> StoreResult<Vec<Promotion>> {
        let mut board = QueueBoard::load(self.store.as_ref(), key, capacity, pending).await?;
        board.release(segment, vacated).await?;
        Ok(board.into_promotions())
    }

    /// Removing the header is fail-soft: a leftover empty header is swept by
    /// `reconcile_orphans`.
    async fn teardown_if_empty(&self, reference: &str) -> CancellationResult {
        match self.store.list_passengers(reference).await {
            Ok(remaining) if remaining.is_empty() => match self.store.delete_header(reference).await {
                Ok(_) => CancellationResult::BookingFullyCancelled,
                Err(e) => {
                    error!("Booking {} has no passengers but header delete failed: {}", reference, e);
                    CancellationResult::PassengersCancelled
                }
            },
            Ok(_) => CancellationResult::PassengersCancelled,
            Err(e) => {
                error!("Could not check remaining passengers on {}: {}", reference, e);
                CancellationResult::PassengersCancelled
            }
        }
    }

    pub async fn get_booking_status(&self, reference: &str) -> BookingResult<BookingStatusView> {
        let header = self
            .store
            .get_header(reference)
            .await?
            .ok_or_else(|| BookingError::NotFound(reference.to_string()))?;

        let passengers = self
            .store
            .list_passengers(reference)
            .await?
            .into_iter()
            .map(|p| -> BookingResult<PassengerStatus> {
                let id_number = p
                    .id_number
                    .as_deref()
                    .map(|sealed| self.cipher.decode(sealed).map(Masked))
                    .transpose()?;
                Ok(PassengerStatus {
                    id: p.id,
                    name: p.name,
                    age: p.age,
                    gender: p.gender,
                    id_number,
                    status: p.status,
                    seat_id: p.seat_id,
                    reserve_position: p.reserve_position,
                    waitlist_position: p.waitlist_position,
                    created_at: p.created_at,
                })
            })
            .collect::<BookingResult<Vec<_>>>()?;

        Ok(BookingStatusView { header, passengers })
    }

    /// Delete headers left without passengers by a failed create or teardown.
    pub async fn reconcile_orphans(&self, grace: chrono::Duration) -> BookingResult<usize> {
        let cutoff = Utc::now() - grace;
        let orphans = self.store.find_orphan_headers(cutoff).await?;

        let mut removed = 0;
        for reference in orphans {
            if self.store.delete_header(&reference).await? {
                warn!("Removed orphaned booking header {}", reference);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn lock_inventory(&self, key: &InventoryKey) -> BookingResult<InventoryGuard> {
        let guard = InventoryGuard {
            key: key.lock_key(),
            holder: Uuid::new_v4().to_string(),
        };
        let ttl = self.config.lock_ttl();

        for _ in 0..self.config.lock_attempts.max(1) {
            if self.lock.try_acquire(&guard.key, &guard.holder, ttl).await? {
                return Ok(guard);
            }
            tokio::time::sleep(self.config.lock_backoff()).await;
        }

        Err(StoreError::LockUnavailable(guard.key).into())
    }

    async fn unlock(&self, guard: InventoryGuard) {
        if let Err(e) = self.lock.release(&guard.key, &guard.holder).await {
            warn!("Failed to release {}: {} (expires by ttl)", guard.key, e);
        }
    }
}
