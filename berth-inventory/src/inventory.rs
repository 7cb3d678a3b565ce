use berth_core::{AllocationStatus, Booking, Segment};
use serde::Serialize;
use std::collections::BTreeSet;

/// What overlapping bookings already consume for one requested segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub confirmed_seat_ids: BTreeSet<u32>,
    pub max_reserve_position: u32,
    pub max_waitlist_position: u32,
    pub reserve_count: u32,
    pub waitlist_count: u32,
}

/// Tally occupancy from every booking whose segment overlaps `requested`.
/// Bookings on disjoint or merely adjacent segments are ignored, so the same
/// berth can be sold again for a later part of the route.
pub fn compute_occupancy(requested: &Segment, bookings: &[Booking]) -> Occupancy {
    let mut occupancy = Occupancy::default();

    for booking in bookings.iter().filter(|b| b.header.segment.overlaps(requested)) {
        for passenger in &booking.passengers {
            match passenger.status {
                AllocationStatus::Confirmed => {
                    if let Some(seat_id) = passenger.seat_id {
                        occupancy.confirmed_seat_ids.insert(seat_id);
                    }
                }
                AllocationStatus::Reserve => {
                    occupancy.reserve_count += 1;
                    if let Some(position) = passenger.reserve_position {
                        occupancy.max_reserve_position = occupancy.max_reserve_position.max(position);
                    }
                }
                AllocationStatus::Waitlisted => {
                    occupancy.waitlist_count += 1;
                    if let Some(position) = passenger.waitlist_position {
                        occupancy.max_waitlist_position = occupancy.max_waitlist_position.max(position);
                    }
                }
            }
        }
    }

    occupancy
}

impl Occupancy {
    pub fn is_seat_free(&self, seat_id: u32) -> bool {
        !self.confirmed_seat_ids.contains(&seat_id)
    }

    /// Lowest free seat id in `1..=total_seats`.
    pub fn first_free_seat(&self, total_seats: u32) -> Option<u32> {
        (1..=total_seats).find(|seat_id| self.is_seat_free(*seat_id))
    }

    pub fn take_seat(&mut self, seat_id: u32) {
        self.confirmed_seat_ids.insert(seat_id);
    }

    /// Claim the next reserve position.
    pub fn push_reserve(&mut self) -> u32 {
        self.reserve_count += 1;
        self.max_reserve_position += 1;
        self.max_reserve_position
    }

    /// Claim the next waitlist position.
    pub fn push_waitlist(&mut self) -> u32 {
        self.waitlist_count += 1;
        self.max_waitlist_position += 1;
        self.max_waitlist_position
    }
}
