use serde::Deserialize;
use std::time::Duration;

use crate::models::ClassCapacity;
use crate::route::normalize_code;

/// Immutable engine settings, loaded once at startup and handed to the booking service.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
    #[serde(default = "default_zone")]
    pub default_zone: String,
    #[serde(default = "default_suffix_len")]
    pub reference_suffix_len: u32,
    #[serde(default = "default_reference_attempts")]
    pub reference_attempts: u32,
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
    #[serde(default = "default_lock_attempts")]
    pub lock_attempts: u32,
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,
    #[serde(default)]
    pub capacity: CapacityTable,
}

fn default_zone() -> String { "10".to_string() }
fn default_suffix_len() -> u32 { 8 }
fn default_reference_attempts() -> u32 { 64 }
fn default_lock_ttl_ms() -> u64 { 10_000 }
fn default_lock_attempts() -> u32 { 50 }
fn default_lock_backoff_ms() -> u64 { 20 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zones: Vec::new(),
            default_zone: default_zone(),
            reference_suffix_len: default_suffix_len(),
            reference_attempts: default_reference_attempts(),
            lock_ttl_ms: default_lock_ttl_ms(),
            lock_attempts: default_lock_attempts(),
            lock_backoff_ms: default_lock_backoff_ms(),
            capacity: CapacityTable::default(),
        }
    }
}

impl EngineConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn lock_backoff(&self) -> Duration {
        Duration::from_millis(self.lock_backoff_ms)
    }
}

/// Station to booking-reference zone prefix.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ZoneEntry {
    pub station: String,
    pub zone: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ClassCapacityEntry {
    pub train_id: String,
    pub class_code: String,
    #[serde(flatten)]
    pub capacity: ClassCapacity,
}

/// Capacity limits per (train, class), with an optional fallback for unlisted classes.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CapacityTable {
    #[serde(default)]
    pub default: Option<ClassCapacity>,
    #[serde(default)]
    pub classes: Vec<ClassCapacityEntry>,
}

impl CapacityTable {
    pub fn with_default(capacity: ClassCapacity) -> Self {
        Self {
            default: Some(capacity),
            classes: Vec::new(),
        }
    }

    pub fn insert(&mut self, train_id: &str, class_code: &str, capacity: ClassCapacity) {
        self.classes.retain(|e| !(e.train_id == train_id && e.class_code == class_code));
        self.classes.push(ClassCapacityEntry {
            train_id: train_id.to_string(),
            class_code: class_code.to_string(),
            capacity,
        });
    }

    /// Unknown classes without a default have no capacity at all.
    pub fn lookup(&self, train_id: &str, class_code: &str) -> ClassCapacity {
        let class_code = normalize_code(class_code);
        self.classes
            .iter()
            .find(|e| e.train_id == train_id && normalize_code(&e.class_code) == class_code)
            .map(|e| e.capacity)
            .or(self.default)
            .unwrap_or(ClassCapacity::new(0, 0, 0))
    }
}
