use berth_core::{RouteError, StoreError};
use berth_shared::PiiError;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid route: {0}")]
    InvalidRoute(#[from] RouteError),

    #[error("No capacity left on train {train_id} class {class_code} for the requested segment")]
    NoCapacity {
        train_id: String,
        class_code: String,
    },

    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("Invalid booking request: {0}")]
    InvalidRequest(String),

    #[error("Datastore error: {0}")]
    Datastore(#[from] StoreError),

    #[error("PII cipher error: {0}")]
    Pii(#[from] PiiError),
}

pub type BookingResult<T> = Result<T, BookingError>;
