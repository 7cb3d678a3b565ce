pub mod route;
pub mod models;
pub mod config;
pub mod repository;
pub mod memory;

pub use route::{RouteError, RoutePosition, Segment, Stop, StopSequence};
pub use models::{
    AllocationStatus, Booking, BookingHeader, ClassCapacity, InventoryKey, PassengerRecord,
    PassengerRequest,
};
pub use config::{CapacityTable, EngineConfig};
pub use repository::{BookingStore, InventoryLock, StoreError, StoreResult, TimetableProvider};
