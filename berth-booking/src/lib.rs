pub mod error;
pub mod models;
pub mod reference;
pub mod allocation;
pub mod cancellation;
pub mod events;
pub mod service;

pub use error::BookingError;
pub use models::{
    BookingStatusView, CancellationOutcome, CancellationResult, CreateBookingRequest,
    PassengerStatus, Promotion,
};
pub use reference::ReferenceGenerator;
pub use service::BookingService;
