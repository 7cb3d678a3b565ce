//! Redistribution of freed capacity.
//!
//! A freed confirmed seat goes to the oldest overlapping RESERVE passenger,
//! whose reserve slot in turn goes to the oldest overlapping WAITLISTED
//! passenger. A waitlisted passenger is never moved straight to CONFIRMED.

use berth_core::{AllocationStatus, BookingStore, ClassCapacity, InventoryKey, PassengerRecord, Segment, StoreResult};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use crate::models::Promotion;

struct Entry {
    segment: Segment,
    passenger: PassengerRecord,
}

/// Snapshot of one inventory's passengers. Every change made here is written
/// through to the store as it happens.
pub(crate) struct QueueBoard<'a> {
    store: &'a dyn BookingStore,
    capacity: ClassCapacity,
    excluded: &'a HashSet<Uuid>,
    entries: Vec<Entry>,
    promotions: Vec<Promotion>,
}

impl<'a> QueueBoard<'a> {
    /// `excluded` passengers are about to be cancelled and are never picked
    /// for promotion.
    pub(crate) async fn load(
        store: &'a dyn BookingStore,
        key: &InventoryKey,
        capacity: ClassCapacity,
        excluded: &'a HashSet<Uuid>,
    ) -> StoreResult<QueueBoard<'a>> {
        let entries = store
            .list_bookings(key)
            .await?
            .into_iter()
            .flat_map(|booking| {
                let segment = booking.header.segment;
                booking
                    .passengers
                    .into_iter()
                    .map(move |passenger| Entry { segment, passenger })
            })
            .collect();

        Ok(Self {
            store,
            capacity,
            excluded,
            entries,
            promotions: Vec::new(),
        })
    }

    pub(crate) fn into_promotions(self) -> Vec<Promotion> {
        self.promotions
    }

    /// React to `vacated` (already deleted from the store) leaving `segment`.
    pub(crate) async fn release(&mut self, segment: Segment, vacated: &PassengerRecord) -> StoreResult<()> {
        match vacated.status {
            AllocationStatus::Confirmed => {
                if let Some(seat_id) = vacated.seat_id {
                    self.fill_seat(segment, seat_id).await?;
                }
            }
            AllocationStatus::Reserve => {
                if let Some(position) = vacated.reserve_position {
                    self.compact(AllocationStatus::Reserve, segment, position).await?;
                }
                self.backfill_reserve(segment).await?;
            }
            AllocationStatus::Waitlisted => {
                if let Some(position) = vacated.waitlist_position {
                    self.compact(AllocationStatus::Waitlisted, segment, position).await?;
                }
            }
        }
        Ok(())
    }

    async fn fill_seat(&mut self, freed: Segment, seat_id: u32) -> StoreResult<()> {
        let candidate = self.oldest(AllocationStatus::Reserve, &freed, |board, entry| {
            board.seat_free_for(seat_id, &entry.segment)
        });
        let Some(idx) = candidate else {
            info!("Seat {} left free on {:?}: no eligible reserve passenger", seat_id, freed);
            return Ok(());
        };

        let segment = self.entries[idx].segment;
        let vacated_position = self.entries[idx].passenger.reserve_position;
        self.entries[idx].passenger.confirm(seat_id);
        self.store.update_passenger(&self.entries[idx].passenger).await?;
        self.record(idx, AllocationStatus::Reserve);

        if let Some(position) = vacated_position {
            self.compact(AllocationStatus::Reserve, segment, position).await?;
        }
        self.backfill_reserve(freed).await
    }

    async fn backfill_reserve(&mut self, freed: Segment) -> StoreResult<()> {
        let Some(idx) = self.oldest(AllocationStatus::Waitlisted, &freed, |_, _| true) else {
            return Ok(());
        };

        let segment = self.entries[idx].segment;
        let (reserve_count, reserve_tail) = self.queue_stats(AllocationStatus::Reserve, &segment);
        if reserve_count >= self.capacity.reserve_limit {
            return Ok(());
        }

        let vacated_position = self.entries[idx].passenger.waitlist_position;
        self.entries[idx].passenger.reserve(reserve_tail + 1);
        self.store.update_passenger(&self.entries[idx].passenger).await?;
        self.record(idx, AllocationStatus::Waitlisted);

        if let Some(position) = vacated_position {
            self.compact(AllocationStatus::Waitlisted, segment, position).await?;
        }
        Ok(())
    }

    /// Close the gap left at `vacated_position` in the `tier` queue for
    /// passengers overlapping `segment`.
    async fn compact(&mut self, tier: AllocationStatus, segment: Segment, vacated_position: u32) -> StoreResult<()> {
        for idx in 0..self.entries.len() {
            let entry = &self.entries[idx];
            if entry.passenger.status != tier || !entry.segment.overlaps(&segment) {
                continue;
            }
            let Some(position) = entry.passenger.queue_position() else {
                continue;
            };
            if position <= vacated_position {
                continue;
            }

            let passenger = &mut self.entries[idx].passenger;
            match tier {
                AllocationStatus::Reserve => passenger.reserve(position - 1),
                AllocationStatus::Waitlisted => passenger.waitlist(position - 1),
                AllocationStatus::Confirmed => continue,
            }
            self.store.update_passenger(passenger).await?;
        }
        Ok(())
    }

    fn oldest<F>(&self, tier: AllocationStatus, freed: &Segment, eligible: F) -> Option<usize>
    where
        F: Fn(&Self, &Entry) -> bool,
    {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.passenger.status == tier)
            .filter(|(_, e)| !self.excluded.contains(&e.passenger.id))
            .filter(|(_, e)| e.segment.overlaps(freed))
            .filter(|(_, e)| eligible(self, e))
            .min_by_key(|(_, e)| (e.passenger.queue_position().unwrap_or(u32::MAX), e.passenger.created_at))
            .map(|(idx, _)| idx)
    }

    fn seat_free_for(&self, seat_id: u32, segment: &Segment) -> bool {
        !self.entries.iter().any(|e| {
            e.passenger.status == AllocationStatus::Confirmed
                && e.passenger.seat_id == Some(seat_id)
                && e.segment.overlaps(segment)
        })
    }

    /// (count, highest position) of a queue as seen from `segment`.
    fn queue_stats(&self, tier: AllocationStatus, segment: &Segment) -> (u32, u32) {
        self.entries
            .iter()
            .filter(|e| e.passenger.status == tier && e.segment.overlaps(segment))
            .fold((0, 0), |(count, tail), e| {
                (count + 1, tail.max(e.passenger.queue_position().unwrap_or(0)))
            })
    }

    fn record(&mut self, idx: usize, from: AllocationStatus) {
        let passenger = &self.entries[idx].passenger;
        info!(
            "Promoted passenger {} on {} from {} to {}",
            passenger.id, passenger.booking_reference, from, passenger.status
        );
        self.promotions.push(Promotion {
            reference: passenger.booking_reference.clone(),
            passenger_id: passenger.id,
            from,
            to: passenger.status,
            seat_id: passenger.seat_id,
            queue_position: passenger.queue_position(),
        });
    }
}
