use berth_core::{AllocationStatus, BookingHeader, PassengerRequest};
use berth_shared::pii::Masked;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub train_id: String,
    pub travel_date: NaiveDate,
    pub class_code: String,
    pub source: String,
    pub destination: String,
    pub passengers: Vec<PassengerRequest>,
}

/// One tier step made by a waiting passenger when capacity freed up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Promotion {
    pub reference: String,
    pub passenger_id: Uuid,
    pub from: AllocationStatus,
    pub to: AllocationStatus,
    pub seat_id: Option<u32>,
    pub queue_position: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationResult {
    PassengersCancelled,
    BookingFullyCancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub reference: String,
    pub result: CancellationResult,
    pub cancelled: Vec<Uuid>,
    pub promotions: Vec<Promotion>,
}

impl CancellationOutcome {
    pub fn is_fully_cancelled(&self) -> bool {
        self.result == CancellationResult::BookingFullyCancelled
    }
}

/// Passenger as shown to the caller, with the sensitive id decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassengerStatus {
    pub id: Uuid,
    pub name: String,
    pub age: u8,
    pub gender: String,
    pub id_number: Option<Masked<String>>,
    pub status: AllocationStatus,
    pub seat_id: Option<u32>,
    pub reserve_position: Option<u32>,
    pub waitlist_position: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingStatusView {
    pub header: BookingHeader,
    pub passengers: Vec<PassengerStatus>,
}
