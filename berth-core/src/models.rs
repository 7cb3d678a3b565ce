use berth_shared::pii::Masked;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::route::Segment;

/// Allocation tier of a passenger, in descending priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    Confirmed,
    Reserve,
    Waitlisted,
}

impl AllocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::Confirmed => "CONFIRMED",
            AllocationStatus::Reserve => "RESERVE",
            AllocationStatus::Waitlisted => "WAITLISTED",
        }
    }
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(AllocationStatus::Confirmed),
            "RESERVE" => Ok(AllocationStatus::Reserve),
            "WAITLISTED" => Ok(AllocationStatus::Waitlisted),
            other => Err(format!("unknown allocation status {other}")),
        }
    }
}

/// Everything sharing one pool of berths: a class of a train on a date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryKey {
    pub train_id: String,
    pub travel_date: NaiveDate,
    pub class_code: String,
}

impl InventoryKey {
    pub fn new(train_id: impl Into<String>, travel_date: NaiveDate, class_code: impl Into<String>) -> Self {
        Self {
            train_id: train_id.into(),
            travel_date,
            class_code: class_code.into(),
        }
    }

    pub fn lock_key(&self) -> String {
        format!("inventory:{}:{}:{}", self.train_id, self.travel_date, self.class_code)
    }
}

/// Static limits for one class of one train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCapacity {
    pub total_seats: u32,
    pub reserve_limit: u32,
    pub waitlist_limit: u32,
}

impl ClassCapacity {
    pub fn new(total_seats: u32, reserve_limit: u32, waitlist_limit: u32) -> Self {
        Self {
            total_seats,
            reserve_limit,
            waitlist_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingHeader {
    pub reference: String,
    pub train_id: String,
    pub travel_date: NaiveDate,
    pub class_code: String,
    pub source: String,
    pub destination: String,
    pub segment: Segment,
    pub created_at: DateTime<Utc>,
}

impl BookingHeader {
    pub fn inventory_key(&self) -> InventoryKey {
        InventoryKey::new(self.train_id.clone(), self.travel_date, self.class_code.clone())
    }
}

/// A passenger row. `id_number` holds ciphertext, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerRecord {
    pub id: Uuid,
    pub booking_reference: String,
    pub name: String,
    pub age: u8,
    pub gender: String,
    pub id_number: Option<String>,
    pub status: AllocationStatus,
    pub seat_id: Option<u32>,
    pub reserve_position: Option<u32>,
    pub waitlist_position: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl PassengerRecord {
    pub fn confirm(&mut self, seat_id: u32) {
        self.status = AllocationStatus::Confirmed;
        self.seat_id = Some(seat_id);
        self.reserve_position = None;
        self.waitlist_position = None;
    }

    pub fn reserve(&mut self, position: u32) {
        self.status = AllocationStatus::Reserve;
        self.seat_id = None;
        self.reserve_position = Some(position);
        self.waitlist_position = None;
    }

    pub fn waitlist(&mut self, position: u32) {
        self.status = AllocationStatus::Waitlisted;
        self.seat_id = None;
        self.reserve_position = None;
        self.waitlist_position = Some(position);
    }

    /// Position in whichever queue the passenger is waiting in.
    pub fn queue_position(&self) -> Option<u32> {
        match self.status {
            AllocationStatus::Confirmed => None,
            AllocationStatus::Reserve => self.reserve_position,
            AllocationStatus::Waitlisted => self.waitlist_position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub header: BookingHeader,
    pub passengers: Vec<PassengerRecord>,
}

/// One passenger as submitted by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct PassengerRequest {
    pub name: String,
    pub age: u8,
    pub gender: String,
    #[serde(default)]
    pub id_number: Option<Masked<String>>,
    /// Explicit berth choice, honoured when still free on the segment.
    #[serde(default)]
    pub preferred_seat: Option<u32>,
}

impl PassengerRequest {
    pub fn new(name: impl Into<String>, age: u8, gender: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            gender: gender.into(),
            id_number: None,
            preferred_seat: None,
        }
    }

    pub fn with_seat(mut self, seat_id: u32) -> Self {
        self.preferred_seat = Some(seat_id);
        self
    }

    pub fn with_id_number(mut self, id_number: impl Into<String>) -> Self {
        self.id_number = Some(Masked(id_number.into()));
        self
    }
}
