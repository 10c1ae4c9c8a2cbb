//! Wiring of the collaborators named in the configuration

use crate::alarm::{AlarmEngine, StopAction};
use crate::config::{Config, PositionConfig};
use crate::events::EventBus;
use crate::geocoding::GazetteerGeocoder;
use crate::models::Coordinate;
use crate::notify::{AlarmPresenter, NotificationOutput, OutputFormat};
use crate::persistence::{LocationStore, SqliteLocationStore};
use crate::position::{FilePositionSource, FixedPositionSource, PositionSource};
use crate::registry::GeofenceRegistry;
use std::error::Error;
use std::sync::Arc;

/// Build the configured position source
pub fn position_source(config: &PositionConfig) -> Result<Arc<dyn PositionSource>, Box<dyn Error>> {
    match config.source_type.as_str() {
        "fixed" => match (config.latitude, config.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Arc::new(FixedPositionSource::new(
                Coordinate::new(latitude, longitude)?,
            ))),
            _ => Err("fixed position source needs latitude and longitude".into()),
        },
        "file" => {
            let path = config
                .file_path
                .clone()
                .ok_or("file position source needs file_path")?;
            let mut source = FilePositionSource::new(path);
            if let Some(seconds) = config.max_fix_age_seconds {
                source = source.with_max_fix_age(chrono::Duration::seconds(seconds));
            }
            Ok(Arc::new(source))
        }
        other => Err(format!("Unknown position source type: {}", other).into()),
    }
}

/// Everything a process needs to evaluate and stop alarms
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn LocationStore>,
    pub presenter: Arc<dyn AlarmPresenter>,
    pub events: EventBus,
}

impl AppContext {
    pub fn from_config(config: Config) -> Result<Self, Box<dyn Error>> {
        let store: Arc<dyn LocationStore> =
            Arc::new(SqliteLocationStore::new(&config.storage.db_path)?);
        let presenter: Arc<dyn AlarmPresenter> = Arc::new(NotificationOutput::new(
            OutputFormat::from_str(&config.notification.format),
            config.notification.file_path.clone(),
        )?);

        Ok(AppContext {
            config,
            store,
            presenter,
            events: EventBus::default(),
        })
    }

    /// Build the alarm engine; fails if the position source is misconfigured
    pub fn engine(&self) -> Result<AlarmEngine, Box<dyn Error>> {
        let position = position_source(&self.config.position)?;
        Ok(AlarmEngine::new(
            Arc::clone(&self.store),
            position,
            Arc::clone(&self.presenter),
            self.events.clone(),
        ))
    }

    /// The stop entry point, usable without a position source or engine
    pub fn stop_action(&self) -> StopAction {
        StopAction::new(Arc::clone(&self.store), Arc::clone(&self.presenter))
            .with_events(self.events.clone())
    }

    pub fn registry(&self) -> GeofenceRegistry {
        GeofenceRegistry::new(Arc::clone(&self.store))
    }

    /// Load the configured gazetteer
    pub fn geocoder(&self) -> Result<GazetteerGeocoder, Box<dyn Error>> {
        let path = self
            .config
            .geocoding
            .gazetteer_path
            .as_ref()
            .ok_or("No gazetteer configured; add geocoding.gazetteer_path or pass --lat/--lon")?;
        Ok(GazetteerGeocoder::from_file(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.storage.db_path = dir.path().join("geoalarm.db");
        config.position = PositionConfig {
            source_type: "fixed".to_string(),
            file_path: None,
            latitude: Some(40.0),
            longitude: Some(-73.0),
            max_fix_age_seconds: None,
        };
        config
    }

    #[test]
    fn test_position_source_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir).position;
        assert!(position_source(&config).is_ok());

        config.longitude = None;
        assert!(position_source(&config).is_err());

        config.source_type = "file".to_string();
        config.file_path = Some(dir.path().join("fix.json"));
        assert!(position_source(&config).is_ok());

        config.source_type = "gps".to_string();
        assert!(position_source(&config).is_err());
    }

    #[test]
    fn test_context_evaluates_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let context = AppContext::from_config(test_config(&dir)).unwrap();

        context
            .registry()
            .add("Home", Coordinate::new(40.0003, -73.0).unwrap())
            .unwrap();
        let outcome = context.engine().unwrap().run_tick();
        assert!(matches!(outcome, crate::alarm::TickOutcome::Fired { .. }));

        let stopped = context.stop_action().stop_current().unwrap();
        assert_eq!(
            stopped,
            crate::alarm::StopOutcome::Stopped {
                name: "Home".to_string()
            }
        );
    }

    #[test]
    fn test_missing_gazetteer() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.geocoding.gazetteer_path = None;
        let context = AppContext::from_config(config).unwrap();

        assert!(context.geocoder().is_err());
    }
}
