//! SQLite implementation of the LocationStore trait

use super::{
    cooldown_key, LocationStore, StoreBatch, StoreError, StoreWrite, ACTIVE_ALARM_KEY,
    SAVED_LOCATIONS_KEY,
};
use crate::models::Geofence;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long to wait for another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based key-value store
///
/// Values are kept under the same keys the rest of the app uses
/// (`savedLocations`, `lastAlarm_<name>`, `currentAlarmingLocation`), so the
/// database can be opened by the daemon and the CLI at the same time.
pub struct SqliteLocationStore {
    conn: Mutex<Connection>,
}

impl SqliteLocationStore {
    /// Open (or create) a store at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(SqliteLocationStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Read the raw string stored under a key
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        read_value(&conn, key)
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let result = conn.query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_value(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, strftime('%s', 'now'))",
        params![key, value],
    )?;
    Ok(())
}

fn delete_value(conn: &Connection, key: &str) -> Result<(), StoreError> {
    conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
    Ok(())
}

/// Parse an ISO-8601 timestamp; one without an offset is read as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn read_cooldown(conn: &Connection, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let Some(raw) = read_value(conn, &cooldown_key(name))? else {
        return Ok(None);
    };
    match parse_timestamp(&raw) {
        Some(at) => Ok(Some(at)),
        None => {
            log::warn!("Ignoring unreadable cool-down record for '{}': {:?}", name, raw);
            Ok(None)
        }
    }
}

fn read_locations(conn: &Connection) -> Result<Vec<Geofence>, StoreError> {
    match read_value(conn, SAVED_LOCATIONS_KEY)? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

/// Check every guard of `batch` against the current stored values
fn preconditions_hold(conn: &Connection, batch: &StoreBatch) -> Result<bool, StoreError> {
    if let Some(expected) = &batch.expect_active_alarm {
        let current = read_value(conn, ACTIVE_ALARM_KEY)?;
        if current != *expected {
            log::debug!(
                "Batch precondition failed: expected active alarm {:?}, found {:?}",
                expected,
                current
            );
            return Ok(false);
        }
    }

    if let Some((name, expected)) = &batch.expect_cooldown {
        let current = read_cooldown(conn, name)?;
        if current != *expected {
            log::debug!(
                "Batch precondition failed: expected '{}' last alarmed at {:?}, found {:?}",
                name,
                expected,
                current
            );
            return Ok(false);
        }
    }

    if let Some(expected) = &batch.expect_locations {
        if read_locations(conn)? != *expected {
            log::debug!("Batch precondition failed: geofence list changed");
            return Ok(false);
        }
    }

    Ok(true)
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn apply_write(conn: &Connection, write: &StoreWrite) -> Result<(), StoreError> {
    match write {
        StoreWrite::Locations(locations) => {
            let json = serde_json::to_string(locations)?;
            write_value(conn, SAVED_LOCATIONS_KEY, &json)
        }
        StoreWrite::Cooldown(name, at) => {
            write_value(conn, &cooldown_key(name), &format_timestamp(at))
        }
        StoreWrite::ClearCooldown(name) => delete_value(conn, &cooldown_key(name)),
        StoreWrite::ActiveAlarm(Some(name)) => write_value(conn, ACTIVE_ALARM_KEY, name),
        StoreWrite::ActiveAlarm(None) => delete_value(conn, ACTIVE_ALARM_KEY),
    }
}

impl LocationStore for SqliteLocationStore {
    fn load_locations(&self) -> Result<Vec<Geofence>, StoreError> {
        let conn = self.lock()?;
        read_locations(&conn)
    }

    fn save_locations(&self, locations: &[Geofence]) -> Result<(), StoreError> {
        let conn = self.lock()?;
        apply_write(&conn, &StoreWrite::Locations(locations.to_vec()))
    }

    fn get_cooldown(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.lock()?;
        read_cooldown(&conn, name)
    }

    fn set_cooldown(&self, name: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.lock()?;
        write_value(&conn, &cooldown_key(name), &format_timestamp(&at))
    }

    fn get_active_alarm(&self) -> Result<Option<String>, StoreError> {
        self.get_raw(ACTIVE_ALARM_KEY)
    }

    fn set_active_alarm(&self, name: Option<&str>) -> Result<(), StoreError> {
        let conn = self.lock()?;
        apply_write(&conn, &StoreWrite::ActiveAlarm(name.map(String::from)))
    }

    fn commit(&self, batch: StoreBatch) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        // Take the write lock up front so the precondition reads and the
        // writes are serialized against other processes.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !preconditions_hold(&tx, &batch)? {
            return Ok(false);
        }

        for write in &batch.writes {
            apply_write(&tx, write)?;
        }

        tx.commit()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinate;
    use chrono::TimeZone;

    fn create_test_store() -> SqliteLocationStore {
        SqliteLocationStore::in_memory().expect("Failed to create in-memory store")
    }

    fn geofence(name: &str, latitude: f64, longitude: f64, armed: bool) -> Geofence {
        Geofence::new(name, Coordinate::new(latitude, longitude).unwrap(), armed)
    }

    #[test]
    fn test_empty_store() {
        let store = create_test_store();
        assert!(store.load_locations().unwrap().is_empty());
        assert!(store.get_cooldown("Home").unwrap().is_none());
        assert!(store.get_active_alarm().unwrap().is_none());
    }

    #[test]
    fn test_locations_roundtrip_keeps_order() {
        let store = create_test_store();
        let locations = vec![
            geofence("Work", 40.7580, -73.9855, true),
            geofence("Home", 40.0, -73.0, false),
            geofence("Gym", -33.8688, 151.2093, true),
        ];

        store.save_locations(&locations).unwrap();
        assert_eq!(store.load_locations().unwrap(), locations);

        // Save overwrites rather than merges
        store.save_locations(&locations[1..]).unwrap();
        assert_eq!(store.load_locations().unwrap(), locations[1..].to_vec());
    }

    #[test]
    fn test_persisted_record_shape() {
        let store = create_test_store();
        store
            .save_locations(&[geofence("Home", 40.0, -73.0, true)])
            .unwrap();

        let raw = store.get_raw(SAVED_LOCATIONS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "name": "Home",
                "latitude": 40.0,
                "longitude": -73.0,
                "alarmEnabled": true
            }])
        );
    }

    #[test]
    fn test_corrupt_locations_are_an_error() {
        let store = create_test_store();
        {
            let conn = store.lock().unwrap();
            write_value(&conn, SAVED_LOCATIONS_KEY, "{not json").unwrap();
        }

        assert!(matches!(
            store.load_locations(),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_cooldown_roundtrip() {
        let store = create_test_store();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        store.set_cooldown("Home", at).unwrap();
        assert_eq!(store.get_cooldown("Home").unwrap(), Some(at));
        assert!(store.get_cooldown("Work").unwrap().is_none());

        let raw = store.get_raw("lastAlarm_Home").unwrap().unwrap();
        assert_eq!(raw, "2024-03-01T12:30:00.000Z");
    }

    #[test]
    fn test_cooldown_without_offset_is_utc() {
        let store = create_test_store();
        {
            let conn = store.lock().unwrap();
            write_value(&conn, "lastAlarm_Home", "2020-01-01T08:00:00.000").unwrap();
            write_value(&conn, "lastAlarm_Work", "2020-01-01T08:00:00+02:00").unwrap();
        }

        assert_eq!(
            store.get_cooldown("Home").unwrap(),
            Some(Utc.with_ymd_and_hms(2020, 1, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(
            store.get_cooldown("Work").unwrap(),
            Some(Utc.with_ymd_and_hms(2020, 1, 1, 6, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_unreadable_cooldown_counts_as_none() {
        let store = create_test_store();
        {
            let conn = store.lock().unwrap();
            write_value(&conn, "lastAlarm_Home", "yesterday").unwrap();
        }

        assert!(store.get_cooldown("Home").unwrap().is_none());
    }

    #[test]
    fn test_cooldown_precondition() {
        let store = create_test_store();
        let earlier = Utc.with_ymd_and_hms(2024, 3, 1, 11, 50, 0).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        store.set_cooldown("Home", at).unwrap();

        let stale = StoreBatch::new()
            .expecting_cooldown("Home", Some(earlier))
            .write(StoreWrite::ActiveAlarm(Some("Home".to_string())));
        assert!(!store.commit(stale).unwrap());
        assert!(store.get_active_alarm().unwrap().is_none());

        let missing = StoreBatch::new()
            .expecting_cooldown("Home", None)
            .write(StoreWrite::ActiveAlarm(Some("Home".to_string())));
        assert!(!store.commit(missing).unwrap());

        let current = StoreBatch::new()
            .expecting_cooldown("Home", Some(at))
            .write(StoreWrite::ActiveAlarm(Some("Home".to_string())));
        assert!(store.commit(current).unwrap());
        assert_eq!(store.get_active_alarm().unwrap().as_deref(), Some("Home"));
    }

    #[test]
    fn test_locations_precondition() {
        let store = create_test_store();
        let seen = vec![geofence("Home", 40.0, -73.0, true)];
        store.save_locations(&seen).unwrap();
        store
            .save_locations(&[seen[0].clone(), geofence("Work", 41.0, -74.0, true)])
            .unwrap();

        let batch = StoreBatch::new()
            .expecting_locations(&seen)
            .write(StoreWrite::Locations(vec![geofence("Home", 40.0, -73.0, false)]));
        assert!(!store.commit(batch).unwrap());
        assert_eq!(store.load_locations().unwrap().len(), 2);
    }

    #[test]
    fn test_active_alarm_pointer() {
        let store = create_test_store();

        store.set_active_alarm(Some("Home")).unwrap();
        assert_eq!(store.get_active_alarm().unwrap().as_deref(), Some("Home"));

        store.set_active_alarm(None).unwrap();
        assert!(store.get_active_alarm().unwrap().is_none());
    }

    #[test]
    fn test_compare_and_set() {
        let store = create_test_store();

        assert!(store.compare_and_set_active_alarm(None, Some("Home")).unwrap());
        assert!(!store.compare_and_set_active_alarm(None, Some("Work")).unwrap());
        assert_eq!(store.get_active_alarm().unwrap().as_deref(), Some("Home"));

        assert!(!store
            .compare_and_set_active_alarm(Some("Work"), None)
            .unwrap());
        assert!(store.compare_and_set_active_alarm(Some("Home"), None).unwrap());
        assert!(store.get_active_alarm().unwrap().is_none());
    }

    #[test]
    fn test_commit_applies_all_writes() {
        let store = create_test_store();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let locations = vec![geofence("Home", 40.0, -73.0, true)];

        let applied = store
            .commit(
                StoreBatch::new()
                    .expecting_active_alarm(None)
                    .write(StoreWrite::Locations(locations.clone()))
                    .write(StoreWrite::Cooldown("Home".to_string(), at))
                    .write(StoreWrite::ActiveAlarm(Some("Home".to_string()))),
            )
            .unwrap();

        assert!(applied);
        assert_eq!(store.load_locations().unwrap(), locations);
        assert_eq!(store.get_cooldown("Home").unwrap(), Some(at));
        assert_eq!(store.get_active_alarm().unwrap().as_deref(), Some("Home"));
    }

    #[test]
    fn test_failed_precondition_writes_nothing() {
        let store = create_test_store();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        store.set_active_alarm(Some("Work")).unwrap();

        let applied = store
            .commit(
                StoreBatch::new()
                    .expecting_active_alarm(Some("Home"))
                    .write(StoreWrite::Locations(vec![geofence("Home", 40.0, -73.0, false)]))
                    .write(StoreWrite::Cooldown("Home".to_string(), at))
                    .write(StoreWrite::ActiveAlarm(None)),
            )
            .unwrap();

        assert!(!applied);
        assert!(store.load_locations().unwrap().is_empty());
        assert!(store.get_cooldown("Home").unwrap().is_none());
        assert_eq!(store.get_active_alarm().unwrap().as_deref(), Some("Work"));
    }

    #[test]
    fn test_clear_cooldown() {
        let store = create_test_store();
        store.set_cooldown("Home", Utc::now()).unwrap();

        store
            .commit(StoreBatch::new().write(StoreWrite::ClearCooldown("Home".to_string())))
            .unwrap();

        assert!(store.get_cooldown("Home").unwrap().is_none());
    }

    #[test]
    fn test_two_handles_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geoalarm.db");

        let background = SqliteLocationStore::new(&path).unwrap();
        let foreground = SqliteLocationStore::new(&path).unwrap();

        background.set_active_alarm(Some("Home")).unwrap();
        assert_eq!(foreground.get_active_alarm().unwrap().as_deref(), Some("Home"));

        assert!(foreground
            .compare_and_set_active_alarm(Some("Home"), None)
            .unwrap());
        assert!(background.get_active_alarm().unwrap().is_none());
    }
}
