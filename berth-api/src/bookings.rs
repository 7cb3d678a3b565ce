use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use berth_booking::events::{self as booking_events, BOOKING_CANCELLED_TOPIC, BOOKING_CREATED_TOPIC, PASSENGER_PROMOTED_TOPIC};
use berth_booking::{BookingStatusView, CancellationOutcome, CreateBookingRequest};
use berth_core::{AllocationStatus, Booking};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub reference: String,
    pub train_id: String,
    pub travel_date: NaiveDate,
    pub class_code: String,
    pub source: String,
    pub destination: String,
    pub passengers: Vec<PassengerAllocation>,
}

#[derive(Debug, Serialize)]
pub struct PassengerAllocation {
    pub id: Uuid,
    pub name: String,
    pub status: AllocationStatus,
    pub seat_id: Option<u32>,
    pub reserve_position: Option<u32>,
    pub waitlist_position: Option<u32>,
}

impl From<&Booking> for BookingResponse {
    fn from(booking: &Booking) -> Self {
        let header = &booking.header;
        Self {
            reference: header.reference.clone(),
            train_id: header.train_id.clone(),
            travel_date: header.travel_date,
            class_code: header.class_code.clone(),
            source: header.source.clone(),
            destination: header.destination.clone(),
            passengers: booking
                .passengers
                .iter()
                .map(|p| PassengerAllocation {
                    id: p.id,
                    name: p.name.clone(),
                    status: p.status,
                    seat_id: p.seat_id,
                    reserve_position: p.reserve_position,
                    waitlist_position: p.waitlist_position,
                })
                .collect(),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{reference}", get(get_booking).delete(cancel_booking))
        .route("/v1/bookings/{reference}/passengers/{passenger_id}", delete(cancel_passenger))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let booking = state.bookings.create_booking(req).await?;

    publish(&state, BOOKING_CREATED_TOPIC, &booking.header.reference, &booking_events::booking_created(&booking)).await;

    Ok((StatusCode::CREATED, Json(BookingResponse::from(&booking))))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<BookingStatusView>, AppError> {
    let view = state.bookings.get_booking_status(&reference).await?;
    Ok(Json(view))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<CancellationOutcome>, AppError> {
    let outcome = state.bookings.cancel_booking(&reference, None).await?;
    announce_cancellation(&state, &outcome).await;
    Ok(Json(outcome))
}

async fn cancel_passenger(
    State(state): State<AppState>,
    Path((reference, passenger_id)): Path<(String, Uuid)>,
) -> Result<Json<CancellationOutcome>, AppError> {
    let outcome = state.bookings.cancel_booking(&reference, Some(passenger_id)).await?;
    announce_cancellation(&state, &outcome).await;
    Ok(Json(outcome))
}

async fn announce_cancellation(state: &AppState, outcome: &CancellationOutcome) {
    info!("Cancellation on {}: {:?}", outcome.reference, outcome.result);
    publish(state, BOOKING_CANCELLED_TOPIC, &outcome.reference, &booking_events::booking_cancelled(outcome)).await;

    for promotion in &outcome.promotions {
        publish(
            state,
            PASSENGER_PROMOTED_TOPIC,
            &promotion.reference,
            &booking_events::passenger_promoted(promotion),
        )
        .await;
    }
}

/// Best effort: the booking is already committed when this runs.
async fn publish<T: Serialize + Sync>(state: &AppState, topic: &str, key: &str, event: &T) {
    let Some(kafka) = &state.kafka else {
        return;
    };
    if let Err(e) = kafka.publish(topic, key, event).await {
        warn!("Event {} for {} not published: {}", topic, key, e);
    }
}
