use berth_core::{AllocationStatus, Booking};
use berth_shared::models::events::{BookingCancelledEvent, BookingCreatedEvent, PassengerPromotedEvent};
use chrono::Utc;

use crate::models::{CancellationOutcome, Promotion};

pub const BOOKING_CREATED_TOPIC: &str = "booking.created";
pub const BOOKING_CANCELLED_TOPIC: &str = "booking.cancelled";
pub const PASSENGER_PROMOTED_TOPIC: &str = "passenger.promoted";

pub fn booking_created(booking: &Booking) -> BookingCreatedEvent {
    let count = |status: AllocationStatus| {
        booking.passengers.iter().filter(|p| p.status == status).count() as u32
    };

    BookingCreatedEvent {
        reference: booking.header.reference.clone(),
        train_id: booking.header.train_id.clone(),
        travel_date: booking.header.travel_date,
        class_code: booking.header.class_code.clone(),
        confirmed: count(AllocationStatus::Confirmed),
        reserve: count(AllocationStatus::Reserve),
        waitlisted: count(AllocationStatus::Waitlisted),
        timestamp: Utc::now().timestamp(),
    }
}

pub fn booking_cancelled(outcome: &CancellationOutcome) -> BookingCancelledEvent {
    BookingCancelledEvent {
        reference: outcome.reference.clone(),
        passenger_ids: outcome.cancelled.clone(),
        fully_cancelled: outcome.is_fully_cancelled(),
        timestamp: Utc::now().timestamp(),
    }
}

pub fn passenger_promoted(promotion: &Promotion) -> PassengerPromotedEvent {
    PassengerPromotedEvent {
        reference: promotion.reference.clone(),
        passenger_id: promotion.passenger_id,
        from_status: promotion.from.to_string(),
        to_status: promotion.to.to_string(),
        seat_id: promotion.seat_id,
        queue_position: promotion.queue_position,
        timestamp: Utc::now().timestamp(),
    }
}
