use super::{PositionError, PositionSource};
use crate::models::{Coordinate, PositionFix};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Fix record written by an external GPS helper
#[derive(Debug, Deserialize)]
struct FixRecord {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    accuracy_m: Option<f64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Read the latest fix from a JSON file
///
/// A GPS helper (gpsd hook, phone bridge, ...) keeps the file up to date.
/// A missing file means the location service is off; an unreadable one means
/// we lack permission.
pub struct FilePositionSource {
    file_path: PathBuf,
    max_fix_age: Option<Duration>,
}

impl FilePositionSource {
    pub fn new(file_path: PathBuf) -> Self {
        FilePositionSource {
            file_path,
            max_fix_age: None,
        }
    }

    /// Reject fixes older than `max_age`
    pub fn with_max_fix_age(mut self, max_age: Duration) -> Self {
        self.max_fix_age = Some(max_age);
        self
    }

    /// Read and validate the fix as of `now`
    pub fn read_fix_at(&self, now: DateTime<Utc>) -> Result<PositionFix, PositionError> {
        let contents = std::fs::read_to_string(&self.file_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PositionError::ServiceDisabled,
            ErrorKind::PermissionDenied => {
                PositionError::PermissionDenied(self.file_path.display().to_string())
            }
            _ => PositionError::Unavailable(e.to_string()),
        })?;

        let record: FixRecord = serde_json::from_str(&contents)
            .map_err(|e| PositionError::Unavailable(format!("Malformed fix: {}", e)))?;

        let coordinate = Coordinate::new(record.latitude, record.longitude)
            .map_err(|e| PositionError::Unavailable(e.to_string()))?;

        let timestamp = match record.timestamp {
            Some(ts) => ts,
            None => self.modified_at().unwrap_or(now),
        };

        if let Some(max_age) = self.max_fix_age {
            let age = now - timestamp;
            if age > max_age {
                return Err(PositionError::Stale {
                    age_seconds: age.num_seconds(),
                    max_age_seconds: max_age.num_seconds(),
                });
            }
        }

        Ok(PositionFix {
            coordinate,
            accuracy_m: record.accuracy_m,
            timestamp,
        })
    }

    fn modified_at(&self) -> Option<DateTime<Utc>> {
        let modified = std::fs::metadata(&self.file_path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }
}

impl PositionSource for FilePositionSource {
    fn current_position(&self) -> Result<PositionFix, PositionError> {
        self.read_fix_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn write_fix(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reads_fix() {
        let file = write_fix(
            r#"{"latitude": 40.0003, "longitude": -73.0, "accuracy_m": 8.5,
                "timestamp": "2024-03-01T12:00:00Z"}"#,
        );
        let source = FilePositionSource::new(file.path().to_path_buf());
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 30).unwrap();

        let fix = source.read_fix_at(now).unwrap();
        assert_eq!(fix.coordinate, Coordinate::new(40.0003, -73.0).unwrap());
        assert_eq!(fix.accuracy_m, Some(8.5));
        assert_eq!(fix.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_file_means_service_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let source = FilePositionSource::new(dir.path().join("fix.json"));
        assert_eq!(source.current_position(), Err(PositionError::ServiceDisabled));
    }

    #[test]
    fn test_malformed_fix() {
        let file = write_fix("latitude=40");
        let source = FilePositionSource::new(file.path().to_path_buf());
        assert!(matches!(
            source.current_position(),
            Err(PositionError::Unavailable(_))
        ));
    }

    #[test]
    fn test_out_of_range_fix() {
        let file = write_fix(r#"{"latitude": 140.0, "longitude": 0.0}"#);
        let source = FilePositionSource::new(file.path().to_path_buf());
        assert!(matches!(
            source.current_position(),
            Err(PositionError::Unavailable(_))
        ));
    }

    #[test]
    fn test_stale_fix() {
        let file = write_fix(
            r#"{"latitude": 40.0, "longitude": -73.0, "timestamp": "2024-03-01T12:00:00Z"}"#,
        );
        let source = FilePositionSource::new(file.path().to_path_buf())
            .with_max_fix_age(Duration::seconds(120));
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap();

        assert_eq!(
            source.read_fix_at(now),
            Err(PositionError::Stale {
                age_seconds: 600,
                max_age_seconds: 120
            })
        );
    }

    #[test]
    fn test_missing_timestamp_uses_file_mtime() {
        let file = write_fix(r#"{"latitude": 40.0, "longitude": -73.0}"#);
        let source = FilePositionSource::new(file.path().to_path_buf())
            .with_max_fix_age(Duration::seconds(3600));

        assert!(source.current_position().is_ok());
    }
}
