use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the geoalarm daemon and CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Storage configuration
    pub storage: StorageConfig,
    /// Position source configuration
    pub position: PositionConfig,
    /// Periodic evaluation configuration
    pub scheduler: SchedulerConfig,
    /// Alarm notification configuration
    pub notification: NotificationConfig,
    /// Address lookup configuration
    #[serde(default)]
    pub geocoding: GeocodingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database shared by the daemon and the CLI
    pub db_path: PathBuf,
}

/// Position source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Type of position source: "file" or "fixed"
    pub source_type: String,
    /// Path to the JSON fix file (if source_type is "file")
    pub file_path: Option<PathBuf>,
    /// Latitude (if source_type is "fixed")
    pub latitude: Option<f64>,
    /// Longitude (if source_type is "fixed")
    pub longitude: Option<f64>,
    /// Fixes older than this are ignored
    pub max_fix_age_seconds: Option<i64>,
}

/// Periodic evaluation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minutes between evaluations (15 at the least)
    pub interval_minutes: u64,
    /// Seconds between checks of the store for edits made elsewhere
    pub resync_seconds: u64,
}

/// Alarm notification configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Output format: "console", "json", or "jsonl"
    pub format: String,
    /// Output file path (if format is not "console")
    pub file_path: Option<PathBuf>,
}

/// Address lookup configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// TOML file of known places
    pub gazetteer_path: Option<PathBuf>,
}

impl SchedulerConfig {
    /// Time between evaluations
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    /// Time between store polls, at least one second
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_seconds.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig {
                db_path: PathBuf::from("geoalarm.db"),
            },
            position: PositionConfig {
                source_type: "file".to_string(),
                file_path: Some(PathBuf::from("position.json")),
                latitude: None,
                longitude: None,
                max_fix_age_seconds: Some(600),
            },
            scheduler: SchedulerConfig {
                interval_minutes: 15,
                resync_seconds: 30,
            },
            notification: NotificationConfig {
                format: "console".to_string(),
                file_path: None,
            },
            geocoding: GeocodingConfig {
                gazetteer_path: Some(PathBuf::from("places.toml")),
            },
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            Self::from_file(path)
        } else {
            log::warn!("Config file {:?} not found, using defaults", path);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::default();
        config.to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_fixed_source_without_geocoding_section() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            db_path = "/var/lib/geoalarm/state.db"

            [position]
            source_type = "fixed"
            latitude = 40.0
            longitude = -73.0

            [scheduler]
            interval_minutes = 30
            resync_seconds = 10

            [notification]
            format = "jsonl"
            file_path = "alarms.jsonl"
            "#,
        )
        .unwrap();

        assert_eq!(config.position.source_type, "fixed");
        assert_eq!(config.position.latitude, Some(40.0));
        assert_eq!(config.position.max_fix_age_seconds, None);
        assert_eq!(config.scheduler.interval_minutes, 30);
        assert!(config.geocoding.gazetteer_path.is_none());
    }

    #[test]
    fn test_scheduler_durations() {
        let mut scheduler = Config::default().scheduler;
        assert_eq!(scheduler.interval(), Duration::from_secs(15 * 60));
        assert_eq!(scheduler.resync_interval(), Duration::from_secs(30));

        scheduler.interval_minutes = u64::MAX;
        scheduler.resync_seconds = 0;
        assert_eq!(scheduler.interval(), Duration::from_secs(u64::MAX));
        assert_eq!(scheduler.resync_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = PathBuf::from("definitely-missing-config.toml");
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
    }
}
