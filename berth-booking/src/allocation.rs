use berth_core::ClassCapacity;
use berth_inventory::Occupancy;

/// Outcome for a single passenger of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    Confirmed { seat_id: u32 },
    Reserve { position: u32 },
    Waitlisted { position: u32 },
}

/// Assign every passenger, in request order, against `occupancy`.
///
/// Each assignment is applied to `occupancy` before the next passenger is
/// considered, so earlier passengers win confirmed seats. Returns `None` when
/// some passenger fits in no tier; the caller must then reject the whole
/// request.
pub fn allocate_passengers<I>(
    occupancy: &mut Occupancy,
    capacity: &ClassCapacity,
    preferred_seats: I,
) -> Option<Vec<Allocation>>
where
    I: IntoIterator<Item = Option<u32>>,
{
    preferred_seats
        .into_iter()
        .map(|preferred| allocate_one(occupancy, capacity, preferred))
        .collect()
}

fn allocate_one(
    occupancy: &mut Occupancy,
    capacity: &ClassCapacity,
    preferred: Option<u32>,
) -> Option<Allocation> {
    let honoured = preferred
        .filter(|seat_id| (1..=capacity.total_seats).contains(seat_id))
        .filter(|seat_id| occupancy.is_seat_free(*seat_id));

    if let Some(seat_id) = honoured.or_else(|| occupancy.first_free_seat(capacity.total_seats)) {
        occupancy.take_seat(seat_id);
        return Some(Allocation::Confirmed { seat_id });
    }

    if occupancy.reserve_count < capacity.reserve_limit {
        return Some(Allocation::Reserve {
            position: occupancy.push_reserve(),
        });
    }

    if occupancy.waitlist_count < capacity.waitlist_limit {
        return Some(Allocation::Waitlisted {
            position: occupancy.push_waitlist(),
        });
    }

    None
}
