use berth_booking::{BookingError, BookingService, CancellationResult, CreateBookingRequest, ReferenceGenerator};
use berth_core::config::EngineConfig;
use berth_core::memory::{InMemoryBookingStore, LocalInventoryLock, StaticTimetable, StoreOp};
use berth_core::{
    AllocationStatus, BookingHeader, BookingStore, CapacityTable, ClassCapacity, InventoryLock,
    PassengerRecord, PassengerRequest, Segment, StopSequence, StoreError,
};
use berth_shared::AesGcmCipher;
use chrono::{Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const TRAIN: &str = "12951";
const CLASS: &str = "3A";
const STATIONS: [&str; 10] = ["MMCT", "BVI", "ST", "BRC", "RTM", "KOTA", "SWM", "MTJ", "NZM", "NDLS"];

struct Harness {
    service: Arc<BookingService>,
    store: Arc<InMemoryBookingStore>,
    lock: Arc<LocalInventoryLock>,
}

fn engine_config(capacity: ClassCapacity) -> EngineConfig {
    let mut table = CapacityTable::default();
    table.insert(TRAIN, CLASS, capacity);
    EngineConfig {
        capacity: table,
        lock_attempts: 500,
        lock_backoff_ms: 1,
        ..EngineConfig::default()
    }
}

fn harness_with(config: EngineConfig, references: Option<ReferenceGenerator>) -> Harness {
    let store = Arc::new(InMemoryBookingStore::new());
    let lock = Arc::new(LocalInventoryLock::new());
    let timetable = Arc::new(StaticTimetable::new().with_train(StopSequence::from_codes(TRAIN, &STATIONS)));
    let cipher = Arc::new(AesGcmCipher::new(&[9u8; 32]).unwrap());
    let references = references.unwrap_or_else(|| ReferenceGenerator::new(&config));

    let service = BookingService::with_references(
        store.clone(),
        timetable,
        cipher,
        lock.clone(),
        config,
        references,
    );
    Harness {
        service: Arc::new(service),
        store,
        lock,
    }
}

fn harness(capacity: ClassCapacity) -> Harness {
    harness_with(engine_config(capacity), None)
}

fn travel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 2).unwrap()
}

fn request(source: &str, destination: &str, passengers: Vec<PassengerRequest>) -> CreateBookingRequest {
    CreateBookingRequest {
        train_id: TRAIN.to_string(),
        travel_date: travel_date(),
        class_code: CLASS.to_string(),
        source: source.to_string(),
        destination: destination.to_string(),
        passengers,
    }
}

fn pax(name: &str) -> PassengerRequest {
    PassengerRequest::new(name, 30, "F")
}

fn statuses(passengers: &[PassengerRecord]) -> Vec<AllocationStatus> {
    passengers.iter().map(|p| p.status).collect()
}

async fn passenger(store: &InMemoryBookingStore, id: Uuid) -> PassengerRecord {
    store.get_passenger(id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_adjacent_segments_share_a_berth_but_overlapping_ones_do_not() {
    let h = harness(ClassCapacity::new(1, 1, 0));

    // A = (0,5), B = (5,9), C = (2,7)
    let a = h.service.create_booking(request("MMCT", "KOTA", vec![pax("A")])).await.unwrap();
    let b = h.service.create_booking(request("KOTA", "NZM", vec![pax("B")])).await.unwrap();
    let c = h.service.create_booking(request("ST", "MTJ", vec![pax("C")])).await.unwrap();

    assert_eq!(a.header.segment, Segment { from: 0, to: 5 });
    assert_eq!(a.passengers[0].seat_id, Some(1));
    assert_eq!(b.passengers[0].seat_id, Some(1));
    assert_eq!(c.passengers[0].status, AllocationStatus::Reserve);
    assert_eq!(c.passengers[0].reserve_position, Some(1));
}

#[tokio::test]
async fn test_capacity_tiers_fill_in_request_order() {
    let h = harness(ClassCapacity::new(2, 1, 1));

    let booking = h
        .service
        .create_booking(request("MMCT", "NDLS", vec![pax("P1"), pax("P2"), pax("P3"), pax("P4")]))
        .await
        .unwrap();

    assert_eq!(
        statuses(&booking.passengers),
        vec![
            AllocationStatus::Confirmed,
            AllocationStatus::Confirmed,
            AllocationStatus::Reserve,
            AllocationStatus::Waitlisted
        ]
    );
    assert_eq!(booking.passengers[0].seat_id, Some(1));
    assert_eq!(booking.passengers[1].seat_id, Some(2));
    assert_eq!(booking.passengers[2].reserve_position, Some(1));
    assert_eq!(booking.passengers[3].waitlist_position, Some(1));
}

#[tokio::test]
async fn test_overflowing_request_is_rejected_without_partial_commit() {
    let h = harness(ClassCapacity::new(2, 1, 1));
    let five = (1..=5).map(|i| pax(&format!("P{i}"))).collect();

    let result = h.service.create_booking(request("MMCT", "NDLS", five)).await;

    assert!(matches!(result, Err(BookingError::NoCapacity { .. })));
    assert_eq!(h.store.header_count(), 0);
    assert_eq!(h.store.passenger_count(), 0);
}

#[tokio::test]
async fn test_cancelling_confirmed_cascades_reserve_and_waitlist() {
    let h = harness(ClassCapacity::new(1, 1, 1));
    let confirmed = h.service.create_booking(request("BRC", "NZM", vec![pax("C")])).await.unwrap();
    let reserve = h.service.create_booking(request("BRC", "NZM", vec![pax("R")])).await.unwrap();
    let waiting = h.service.create_booking(request("RTM", "NDLS", vec![pax("W")])).await.unwrap();
    assert_eq!(reserve.passengers[0].status, AllocationStatus::Reserve);
    assert_eq!(waiting.passengers[0].status, AllocationStatus::Waitlisted);

    let outcome = h.service.cancel_booking(&confirmed.header.reference, None).await.unwrap();

    assert_eq!(outcome.result, CancellationResult::BookingFullyCancelled);
    assert_eq!(outcome.promotions.len(), 2);

    let promoted = passenger(&h.store, reserve.passengers[0].id).await;
    assert_eq!(promoted.status, AllocationStatus::Confirmed);
    assert_eq!(promoted.seat_id, Some(1));
    assert_eq!(promoted.reserve_position, None);

    let backfilled = passenger(&h.store, waiting.passengers[0].id).await;
    assert_eq!(backfilled.status, AllocationStatus::Reserve);
    assert_eq!(backfilled.reserve_position, Some(1));
    assert_eq!(backfilled.waitlist_position, None);
}

#[tokio::test]
async fn test_non_overlapping_reserve_passenger_is_not_promoted() {
    let h = harness(ClassCapacity::new(1, 1, 1));
    let confirmed = h.service.create_booking(request("MMCT", "KOTA", vec![pax("C")])).await.unwrap();

    // A reserve passenger on (5,9) and a waitlisted one overlapping the freed seat.
    let reserve_id = seed(&h.store, "1099990001", 5, 9, |p| p.reserve(1));
    let waiting_id = seed(&h.store, "1099990002", 2, 4, |p| p.waitlist(1));

    let outcome = h.service.cancel_booking(&confirmed.header.reference, None).await.unwrap();

    assert!(outcome.promotions.is_empty());
    assert_eq!(passenger(&h.store, reserve_id).await.status, AllocationStatus::Reserve);
    // never straight from the waitlist to a berth
    assert_eq!(passenger(&h.store, waiting_id).await.status, AllocationStatus::Waitlisted);

    let next = h.service.create_booking(request("MMCT", "BVI", vec![pax("N")])).await.unwrap();
    assert_eq!(next.passengers[0].seat_id, Some(1));
}

fn seed<F>(store: &InMemoryBookingStore, reference: &str, from: i32, to: i32, place: F) -> Uuid
where
    F: FnOnce(&mut PassengerRecord),
{
    let header = BookingHeader {
        reference: reference.to_string(),
        train_id: TRAIN.to_string(),
        travel_date: travel_date(),
        class_code: CLASS.to_string(),
        source: STATIONS[from as usize].to_string(),
        destination: STATIONS[to as usize].to_string(),
        segment: Segment::new(from, to).unwrap(),
        created_at: Utc::now(),
    };
    let mut record = PassengerRecord {
        id: Uuid::new_v4(),
        booking_reference: reference.to_string(),
        name: "Seeded".to_string(),
        age: 50,
        gender: "M".to_string(),
        id_number: None,
        status: AllocationStatus::Confirmed,
        seat_id: None,
        reserve_position: None,
        waitlist_position: None,
        created_at: Utc::now(),
    };
    place(&mut record);
    let id = record.id;
    store.seed(header, vec![record]);
    id
}

#[tokio::test]
async fn test_oldest_reserve_passenger_wins_and_queue_closes_up() {
    let h = harness(ClassCapacity::new(1, 2, 2));
    let confirmed = h.service.create_booking(request("MMCT", "NDLS", vec![pax("C")])).await.unwrap();
    let queued = h
        .service
        .create_booking(request("MMCT", "NDLS", vec![pax("R1"), pax("R2"), pax("W1"), pax("W2")]))
        .await
        .unwrap();

    h.service.cancel_booking(&confirmed.header.reference, None).await.unwrap();

    let after: Vec<PassengerRecord> = h.store.list_passengers(&queued.header.reference).await.unwrap();
    assert_eq!(after[0].status, AllocationStatus::Confirmed);
    assert_eq!(after[1].reserve_position, Some(1));
    assert_eq!(after[2].status, AllocationStatus::Reserve);
    assert_eq!(after[2].reserve_position, Some(2));
    assert_eq!(after[3].status, AllocationStatus::Waitlisted);
    assert_eq!(after[3].waitlist_position, Some(1));
}

#[tokio::test]
async fn test_cancelling_reserve_passenger_backfills_from_waitlist() {
    let h = harness(ClassCapacity::new(1, 2, 1));
    h.service.create_booking(request("MMCT", "NDLS", vec![pax("C")])).await.unwrap();
    let queued = h
        .service
        .create_booking(request("MMCT", "NDLS", vec![pax("R1"), pax("R2"), pax("W1")]))
        .await
        .unwrap();

    let outcome = h
        .service
        .cancel_booking(&queued.header.reference, Some(queued.passengers[0].id))
        .await
        .unwrap();
    assert_eq!(outcome.result, CancellationResult::PassengersCancelled);

    let r2 = passenger(&h.store, queued.passengers[1].id).await;
    let w1 = passenger(&h.store, queued.passengers[2].id).await;
    assert_eq!(r2.reserve_position, Some(1));
    assert_eq!(w1.status, AllocationStatus::Reserve);
    assert_eq!(w1.reserve_position, Some(2));
}

#[tokio::test]
async fn test_promotion_failure_does_not_fail_cancellation() {
    let h = harness(ClassCapacity::new(1, 1, 0));
    let confirmed = h.service.create_booking(request("MMCT", "NDLS", vec![pax("C")])).await.unwrap();
    let reserve = h.service.create_booking(request("MMCT", "NDLS", vec![pax("R")])).await.unwrap();

    h.store.fail_on(StoreOp::UpdatePassenger);
    let outcome = h.service.cancel_booking(&confirmed.header.reference, None).await.unwrap();
    h.store.clear_faults();

    assert!(outcome.is_fully_cancelled());
    assert!(outcome.promotions.is_empty());
    assert_eq!(passenger(&h.store, reserve.passengers[0].id).await.status, AllocationStatus::Reserve);
}

#[tokio::test]
async fn test_status_read_is_idempotent_and_decrypts_ids() {
    let h = harness(ClassCapacity::new(4, 0, 0));
    let booking = h
        .service
        .create_booking(request(
            "MMCT",
            "NDLS",
            vec![pax("A").with_id_number("Z1234567"), pax("B")],
        ))
        .await
        .unwrap();

    let stored = h.store.list_passengers(&booking.header.reference).await.unwrap();
    let sealed = stored[0].id_number.clone().unwrap();
    assert_ne!(sealed, "Z1234567");

    let first = h.service.get_booking_status(&booking.header.reference).await.unwrap();
    let second = h.service.get_booking_status(&booking.header.reference).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.passengers.len(), 2);
    assert_eq!(first.passengers[0].id_number.as_ref().unwrap().expose(), "Z1234567");
    assert!(first.passengers[1].id_number.is_none());
}

#[tokio::test]
async fn test_unknown_reference_is_not_found() {
    let h = harness(ClassCapacity::new(1, 0, 0));
    assert!(matches!(
        h.service.get_booking_status("1000000000").await,
        Err(BookingError::NotFound(_))
    ));
    assert!(matches!(
        h.service.cancel_booking("1000000000", None).await,
        Err(BookingError::NotFound(_))
    ));

    let booking = h.service.create_booking(request("MMCT", "NDLS", vec![pax("A")])).await.unwrap();
    assert!(matches!(
        h.service.cancel_booking(&booking.header.reference, Some(Uuid::new_v4())).await,
        Err(BookingError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_one_by_one_cancellation_tears_down_header_on_last_passenger() {
    let h = harness(ClassCapacity::new(3, 0, 0));
    let booking = h
        .service
        .create_booking(request("MMCT", "NDLS", vec![pax("A"), pax("B"), pax("C")]))
        .await
        .unwrap();
    let reference = booking.header.reference.clone();

    for (idx, p) in booking.passengers.iter().enumerate() {
        let outcome = h.service.cancel_booking(&reference, Some(p.id)).await.unwrap();
        if idx < 2 {
            assert_eq!(outcome.result, CancellationResult::PassengersCancelled);
            assert_eq!(h.store.header_deletes(), 0);
        } else {
            assert_eq!(outcome.result, CancellationResult::BookingFullyCancelled);
        }
    }

    assert_eq!(h.store.header_deletes(), 1);
    assert!(matches!(
        h.service.get_booking_status(&reference).await,
        Err(BookingError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_cancel_all_deletes_header_once() {
    let h = harness(ClassCapacity::new(1, 1, 1));
    let booking = h
        .service
        .create_booking(request("MMCT", "NDLS", vec![pax("A"), pax("B"), pax("C")]))
        .await
        .unwrap();

    let outcome = h.service.cancel_booking(&booking.header.reference, None).await.unwrap();

    assert_eq!(outcome.result, CancellationResult::BookingFullyCancelled);
    assert_eq!(outcome.cancelled.len(), 3);
    // passengers leaving together are not promoted into each other's seats
    assert!(outcome.promotions.is_empty());
    assert_eq!(h.store.header_deletes(), 1);
    assert_eq!(h.store.header_count(), 0);
}

#[tokio::test]
async fn test_invalid_routes_are_rejected_before_any_store_call() {
    let h = harness(ClassCapacity::new(1, 0, 0));
    h.store.fail_on(StoreOp::ReferenceExists);

    for (source, destination) in [("KOTA", "BRC"), ("RTM", "RTM"), ("MMCT", "HWH")] {
        let result = h.service.create_booking(request(source, destination, vec![pax("A")])).await;
        assert!(matches!(result, Err(BookingError::InvalidRoute(_))), "{source}->{destination}");
    }

    let mut unknown_train = request("MMCT", "NDLS", vec![pax("A")]);
    unknown_train.train_id = "99999".to_string();
    assert!(matches!(
        h.service.create_booking(unknown_train).await,
        Err(BookingError::InvalidRoute(_))
    ));

    assert!(matches!(
        h.service.create_booking(request("MMCT", "NDLS", vec![])).await,
        Err(BookingError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_failed_passenger_insert_removes_header() {
    let h = harness(ClassCapacity::new(2, 0, 0));
    h.store.fail_on(StoreOp::InsertPassengers);

    let result = h.service.create_booking(request("MMCT", "NDLS", vec![pax("A")])).await;

    assert!(matches!(result, Err(BookingError::Datastore(_))));
    assert_eq!(h.store.header_count(), 0);
    assert_eq!(h.store.header_deletes(), 1);
}

#[tokio::test]
async fn test_late_duplicate_reference_is_regenerated() {
    let config = engine_config(ClassCapacity::new(2, 0, 0));
    let probe = ReferenceGenerator::with_rng(&config, StdRng::seed_from_u64(11));
    let first_draw = probe.generate(&InMemoryBookingStore::new(), "MMCT").await.unwrap();

    let h = harness_with(
        config.clone(),
        Some(ReferenceGenerator::with_rng(&config, StdRng::seed_from_u64(11))),
    );
    h.store.reject_reference_on_insert(&first_draw);

    let booking = h.service.create_booking(request("MMCT", "NDLS", vec![pax("A")])).await.unwrap();

    assert_ne!(booking.header.reference, first_draw);
    assert_eq!(booking.passengers[0].booking_reference, booking.header.reference);
    assert_eq!(h.store.header_count(), 1);
}

#[tokio::test]
async fn test_busy_inventory_surfaces_as_datastore_error() {
    let config = EngineConfig {
        lock_attempts: 2,
        lock_backoff_ms: 1,
        ..engine_config(ClassCapacity::new(1, 0, 0))
    };
    let h = harness_with(config, None);
    let key = format!("inventory:{}:{}:{}", TRAIN, travel_date(), CLASS);
    assert!(h
        .lock
        .try_acquire(&key, "someone-else", std::time::Duration::from_secs(60))
        .await
        .unwrap());

    let result = h.service.create_booking(request("MMCT", "NDLS", vec![pax("A")])).await;
    assert!(matches!(
        result,
        Err(BookingError::Datastore(StoreError::LockUnavailable(_)))
    ));
}

#[tokio::test]
async fn test_reconcile_removes_only_stale_empty_headers() {
    let h = harness(ClassCapacity::new(2, 0, 0));
    let live = h.service.create_booking(request("MMCT", "NDLS", vec![pax("A")])).await.unwrap();

    let mut stale = live.header.clone();
    stale.reference = "1000000077".to_string();
    stale.created_at = Utc::now() - Duration::minutes(30);
    h.store.seed(stale, vec![]);

    let mut fresh = live.header.clone();
    fresh.reference = "1000000078".to_string();
    h.store.seed(fresh, vec![]);

    let removed = h.service.reconcile_orphans(Duration::minutes(5)).await.unwrap();

    assert_eq!(removed, 1);
    assert!(h.store.get_header("1000000077").await.unwrap().is_none());
    assert!(h.store.get_header("1000000078").await.unwrap().is_some());
    assert!(h.store.get_header(&live.header.reference).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_never_share_a_berth() {
    let h = harness(ClassCapacity::new(6, 2, 2));

    let mut tasks = Vec::new();
    for i in 0..12 {
        let service = h.service.clone();
        tasks.push(tokio::spawn(async move {
            service
                .create_booking(request("MMCT", "NDLS", vec![pax(&format!("P{i}"))]))
                .await
        }));
    }

    let mut seats = HashSet::new();
    let mut reserve_positions = HashSet::new();
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(booking) => {
                let p = &booking.passengers[0];
                match p.status {
                    AllocationStatus::Confirmed => assert!(seats.insert(p.seat_id.unwrap())),
                    AllocationStatus::Reserve => assert!(reserve_positions.insert(p.reserve_position.unwrap())),
                    AllocationStatus::Waitlisted => {}
                }
            }
            Err(BookingError::NoCapacity { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(seats.len(), 6);
    assert_eq!(reserve_positions, HashSet::from([1, 2]));
    assert_eq!(rejected, 2);
}

#[tokio::test]
async fn test_explicit_seat_choice_is_honoured_when_free() {
    let h = harness(ClassCapacity::new(4, 0, 0));
    let first = h
        .service
        .create_booking(request("MMCT", "KOTA", vec![pax("A").with_seat(3)]))
        .await
        .unwrap();
    let second = h
        .service
        .create_booking(request("BVI", "NDLS", vec![pax("B").with_seat(3), pax("C").with_seat(3)]))
        .await
        .unwrap();

    assert_eq!(first.passengers[0].seat_id, Some(3));
    // taken on an overlapping segment, falls back to the lowest free berth
    assert_eq!(second.passengers[0].seat_id, Some(1));
    assert_eq!(second.passengers[1].seat_id, Some(2));
}

#[tokio::test]
async fn test_class_code_case_does_not_split_inventory() {
    let h = harness(ClassCapacity::new(1, 0, 0));
    let upper = h.service.create_booking(request("MMCT", "NDLS", vec![pax("A")])).await.unwrap();
    assert_eq!(upper.passengers[0].seat_id, Some(1));

    let mut lower = request("MMCT", "NDLS", vec![pax("B")]);
    lower.class_code = " 3a".to_string();
    let result = h.service.create_booking(lower).await;

    assert!(matches!(result, Err(BookingError::NoCapacity { .. })));
    assert_eq!(upper.header.class_code, "3A");
    assert_eq!(h.store.header_count(), 1);
}

#[tokio::test]
async fn test_store_failure_midway_reports_rows_already_cancelled() {
    let h = harness(ClassCapacity::new(2, 0, 0));
    let booking = h
        .service
        .create_booking(request("MMCT", "NDLS", vec![pax("A"), pax("B")]))
        .await
        .unwrap();

    h.store.fail_after(StoreOp::DeletePassenger, 1);
    let outcome = h.service.cancel_booking(&booking.header.reference, None).await.unwrap();
    h.store.clear_faults();

    assert_eq!(outcome.cancelled, vec![booking.passengers[0].id]);
    assert_eq!(outcome.result, CancellationResult::PassengersCancelled);
    assert_eq!(h.store.passenger_count(), 1);
    assert!(h.store.get_header(&booking.header.reference).await.unwrap().is_some());
}

#[tokio::test]
async fn test_store_failure_before_any_delete_is_an_error() {
    let h = harness(ClassCapacity::new(2, 0, 0));
    let booking = h.service.create_booking(request("MMCT", "NDLS", vec![pax("A")])).await.unwrap();

    h.store.fail_on(StoreOp::DeletePassenger);
    let result = h.service.cancel_booking(&booking.header.reference, None).await;
    h.store.clear_faults();

    assert!(matches!(result, Err(BookingError::Datastore(_))));
    assert_eq!(h.store.passenger_count(), 1);
}

#[tokio::test]
async fn test_cancel_all_never_promotes_own_reserve_passenger() {
    let h = harness(ClassCapacity::new(1, 1, 1));
    let mixed = h
        .service
        .create_booking(request("MMCT", "NDLS", vec![pax("A"), pax("B")]))
        .await
        .unwrap();
    assert_eq!(
        statuses(&mixed.passengers),
        vec![AllocationStatus::Confirmed, AllocationStatus::Reserve]
    );
    let waiting = h.service.create_booking(request("BVI", "SWM", vec![pax("W")])).await.unwrap();
    assert_eq!(waiting.passengers[0].status, AllocationStatus::Waitlisted);

    let outcome = h.service.cancel_booking(&mixed.header.reference, None).await.unwrap();

    assert_eq!(outcome.result, CancellationResult::BookingFullyCancelled);
    assert_eq!(outcome.cancelled.len(), 2);
    assert!(outcome.promotions.iter().all(|p| p.passenger_id != mixed.passengers[1].id));
    assert!(outcome.promotions.iter().all(|p| p.to != AllocationStatus::Confirmed));

    // the vacated reserve slot is backfilled from the waitlist
    let w = passenger(&h.store, waiting.passengers[0].id).await;
    assert_eq!(w.status, AllocationStatus::Reserve);
    assert_eq!(w.reserve_position, Some(1));

    let next = h.service.create_booking(request("MMCT", "BVI", vec![pax("N")])).await.unwrap();
    assert_eq!(next.passengers[0].seat_id, Some(1));
}
