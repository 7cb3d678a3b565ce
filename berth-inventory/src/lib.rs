pub mod inventory;

pub use inventory::{compute_occupancy, Occupancy};
