use berth_booking::BookingService;
use berth_store::app_config::RateLimitConfig;
use berth_store::{EventProducer, RedisClient};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingService>,
    /// Rate limiting is skipped when absent.
    pub redis: Option<Arc<RedisClient>>,
    /// Events are dropped when absent.
    pub kafka: Option<Arc<EventProducer>>,
    pub rate_limit: RateLimitConfig,
}
