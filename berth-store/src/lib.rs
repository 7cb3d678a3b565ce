pub mod app_config;
pub mod database;
pub mod booking_repo;
pub mod timetable_repo;
pub mod redis_repo;
pub mod events;

pub use app_config::Config;
pub use database::DbClient;
pub use booking_repo::PgBookingStore;
pub use timetable_repo::PgTimetable;
pub use redis_repo::{RedisClient, RedisInventoryLock};
pub use events::EventProducer;
