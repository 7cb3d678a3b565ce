use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCreatedEvent {
    pub reference: String,
    pub train_id: String,
    pub travel_date: chrono::NaiveDate,
    pub class_code: String,
    pub confirmed: u32,
    pub reserve: u32,
    pub waitlisted: u32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCancelledEvent {
    pub reference: String,
    pub passenger_ids: Vec<Uuid>,
    pub fully_cancelled: bool,
    pub timestamp: i64,
}

/// One tier step of a waiting passenger, e.g. RESERVE -> CONFIRMED.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PassengerPromotedEvent {
    pub reference: String,
    pub passenger_id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub seat_id: Option<u32>,
    pub queue_position: Option<u32>,
    pub timestamp: i64,
}
