use berth_core::config::EngineConfig;
use berth_core::route::normalize_code;
use berth_core::{BookingStore, StoreError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::error::{BookingError, BookingResult};

const MAX_SUFFIX_LEN: u32 = 18;

/// Issues booking references: a zone prefix for the source station followed by
/// a fixed-width random numeric suffix.
///
/// The existence check is only a fast path. The store's uniqueness constraint
/// on insert is what guarantees no two bookings share a reference.
pub struct ReferenceGenerator {
    zones: HashMap<String, String>,
    default_zone: String,
    suffix_len: u32,
    max_attempts: u32,
    rng: Mutex<StdRng>,
}

impl ReferenceGenerator {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: &EngineConfig, rng: StdRng) -> Self {
        let zones = config
            .zones
            .iter()
            .map(|entry| (normalize_code(&entry.station), entry.zone.clone()))
            .collect();

        Self {
            zones,
            default_zone: config.default_zone.clone(),
            suffix_len: config.reference_suffix_len.clamp(1, MAX_SUFFIX_LEN),
            max_attempts: config.reference_attempts.max(1),
            rng: Mutex::new(rng),
        }
    }

    pub fn zone_for(&self, station_code: &str) -> &str {
        self.zones
            .get(&normalize_code(station_code))
            .map(String::as_str)
            .unwrap_or(self.default_zone.as_str())
    }

    fn draw_suffix(&self) -> BookingResult<String> {
        let upper = 10u64.pow(self.suffix_len);
        let value = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| StoreError::Backend("reference rng poisoned".to_string()))?;
            rng.gen_range(0..upper)
        };
        Ok(format!("{:0width$}", value, width = self.suffix_len as usize))
    }

    /// Draw candidates until the store reports one as unused.
    pub async fn generate(&self, store: &dyn BookingStore, source_station: &str) -> BookingResult<String> {
        let zone = self.zone_for(source_station);

        for attempt in 1..=self.max_attempts {
            let candidate = format!("{}{}", zone, self.draw_suffix()?);
            if !store.reference_exists(&candidate).await? {
                return Ok(candidate);
            }
            debug!("Reference {} already taken (attempt {})", candidate, attempt);
        }

        Err(BookingError::Datastore(StoreError::Backend(format!(
            "no free booking reference in zone {} after {} attempts",
            zone, self.max_attempts
        ))))
    }
}
