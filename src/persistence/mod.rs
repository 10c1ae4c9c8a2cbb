//! Persistence module for geofence state
//!
//! Both the background evaluator and the foreground process read and write
//! the same durable store, which is the only state they share. Every key
//! holds a whole value so a reader never observes a half-written record.

pub mod sqlite_store;

pub use sqlite_store::SqliteLocationStore;

use crate::models::Geofence;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Key holding the ordered JSON array of saved geofences
pub const SAVED_LOCATIONS_KEY: &str = "savedLocations";

/// Key holding the name of the geofence whose alarm is currently presented
pub const ACTIVE_ALARM_KEY: &str = "currentAlarmingLocation";

/// Prefix of the per-geofence cool-down keys
pub const COOLDOWN_KEY_PREFIX: &str = "lastAlarm_";

/// Store key for the cool-down record of a geofence
pub fn cooldown_key(name: &str) -> String {
    format!("{}{}", COOLDOWN_KEY_PREFIX, name)
}

/// Errors that can occur during persistence operations
///
/// Any of these means the operation did not happen. Callers must never read
/// a failed load as an empty store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// One write applied as part of a [`StoreBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// Replace the whole geofence list
    Locations(Vec<Geofence>),
    /// Record when a geofence last alarmed
    Cooldown(String, DateTime<Utc>),
    /// Forget the cool-down record of a geofence
    ClearCooldown(String),
    /// Set or clear the active alarm pointer
    ActiveAlarm(Option<String>),
}

/// A group of writes committed together, optionally guarded by values the
/// caller read earlier.
///
/// Each guard is checked inside the commit's transaction. If any stored value
/// differs from what the caller saw, nothing is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreBatch {
    /// When set, the batch only applies if the pointer still holds this value
    pub expect_active_alarm: Option<Option<String>>,
    /// When set, the named geofence's cool-down record must still read this
    pub expect_cooldown: Option<(String, Option<DateTime<Utc>>)>,
    /// When set, the geofence list must be unchanged
    pub expect_locations: Option<Vec<Geofence>>,
    pub writes: Vec<StoreWrite>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only commit if the active alarm pointer equals `expected`
    pub fn expecting_active_alarm(mut self, expected: Option<&str>) -> Self {
        self.expect_active_alarm = Some(expected.map(String::from));
        self
    }

    /// Only commit if `name`'s cool-down record still reads `expected`
    pub fn expecting_cooldown(mut self, name: &str, expected: Option<DateTime<Utc>>) -> Self {
        self.expect_cooldown = Some((name.to_string(), expected));
        self
    }

    /// Only commit if the stored geofence list still equals `expected`
    pub fn expecting_locations(mut self, expected: &[Geofence]) -> Self {
        self.expect_locations = Some(expected.to_vec());
        self
    }

    pub fn write(mut self, write: StoreWrite) -> Self {
        self.writes.push(write);
        self
    }
}

/// Trait for geofence storage backends
///
/// All operations are synchronous and may block on I/O.
pub trait LocationStore: Send + Sync {
    // =====================
    // Geofences
    // =====================

    /// Load the saved geofences in their stored order
    fn load_locations(&self) -> Result<Vec<Geofence>, StoreError>;

    /// Overwrite the full geofence list (last writer wins)
    fn save_locations(&self, locations: &[Geofence]) -> Result<(), StoreError>;

    // =====================
    // Cool-down records
    // =====================

    /// Get when a geofence last alarmed
    ///
    /// A record that cannot be read as a timestamp counts as no record.
    fn get_cooldown(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Record when a geofence alarmed
    fn set_cooldown(&self, name: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    // =====================
    // Active alarm pointer
    // =====================

    /// Get the name of the geofence that is currently alarming
    fn get_active_alarm(&self) -> Result<Option<String>, StoreError>;

    /// Set or clear the active alarm pointer
    fn set_active_alarm(&self, name: Option<&str>) -> Result<(), StoreError>;

    /// Swap the pointer only if it still holds `expected`
    ///
    /// Returns `false` and writes nothing when another writer got there first.
    fn compare_and_set_active_alarm(
        &self,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, StoreError> {
        let batch = StoreBatch::new()
            .expecting_active_alarm(expected)
            .write(StoreWrite::ActiveAlarm(new.map(String::from)));
        self.commit(batch)
    }

    // =====================
    // Transactions
    // =====================

    /// Apply every write in the batch or none of them
    ///
    /// Returns `false` if a batch precondition did not hold.
    fn commit(&self, batch: StoreBatch) -> Result<bool, StoreError>;
}
