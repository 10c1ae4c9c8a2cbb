//! Stopping an active alarm
//!
//! This path only needs the store and the ability to cancel the notification,
//! so a notification action can run it while the rest of the app is not
//! running at all.

use super::AlarmError;
use crate::events::{EventBus, MonitorEvent};
use crate::notify::AlarmPresenter;
use crate::persistence::{LocationStore, StoreBatch, StoreWrite};
use std::sync::Arc;

/// Commits retried when the geofence list moves underneath a stop
const COMMIT_ATTEMPTS: usize = 3;

/// Result of a stop request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The alarm was cleared and the geofence disarmed
    Stopped { name: String },
    /// The named geofence was not the armed, active alarm; nothing changed
    NotCurrentlyAlarming,
}

/// Entry point for the "stop" action
pub struct StopAction {
    store: Arc<dyn LocationStore>,
    presenter: Arc<dyn AlarmPresenter>,
    events: Option<EventBus>,
}

impl StopAction {
    pub fn new(store: Arc<dyn LocationStore>, presenter: Arc<dyn AlarmPresenter>) -> Self {
        StopAction {
            store,
            presenter,
            events: None,
        }
    }

    /// Also announce stops on an event bus
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Stop the alarm for `name`
    ///
    /// Only acts when `name` is the active alarm and that geofence is still
    /// armed. The geofence is disarmed (one-shot) and the pointer cleared in
    /// the same commit, guarded by the pointer value and the list it was read
    /// from. A list edited in between is re-read so concurrent additions are
    /// kept; a changed pointer makes this a no-op.
    pub fn stop(&self, name: &str) -> Result<StopOutcome, AlarmError> {
        for attempt in 1..=COMMIT_ATTEMPTS {
            let active = self.store.get_active_alarm()?;
            if active.as_deref() != Some(name) {
                log::debug!("Stop for '{}' ignored, active alarm is {:?}", name, active);
                return Ok(StopOutcome::NotCurrentlyAlarming);
            }

            let seen = self.store.load_locations()?;
            let mut locations = seen.clone();
            let Some(geofence) = locations.iter_mut().find(|g| g.name == name && g.armed) else {
                log::debug!("Stop for '{}' ignored, geofence is not armed", name);
                return Ok(StopOutcome::NotCurrentlyAlarming);
            };
            geofence.armed = false;

            let batch = StoreBatch::new()
                .expecting_active_alarm(Some(name))
                .expecting_locations(&seen)
                .write(StoreWrite::Locations(locations))
                .write(StoreWrite::ActiveAlarm(None));

            if self.store.commit(batch)? {
                return Ok(self.finish(name));
            }
            log::debug!("Alarm state for '{}' changed while stopping (attempt {})", name, attempt);
        }

        log::warn!("Alarm for '{}' kept changing while stopping, leaving it alone", name);
        Ok(StopOutcome::NotCurrentlyAlarming)
    }

    fn finish(&self, name: &str) -> StopOutcome {
        // State is already consistent; a lingering notification is cosmetic
        if let Err(e) = self.presenter.cancel() {
            log::warn!("Failed to cancel alarm notification for '{}': {}", name, e);
        }

        log::info!("Alarm for '{}' stopped and geofence disarmed", name);
        if let Some(ref events) = self.events {
            events.publish(MonitorEvent::AlarmStopped {
                name: name.to_string(),
            });
        }

        StopOutcome::Stopped {
            name: name.to_string(),
        }
    }

    /// Stop whichever alarm is currently active
    pub fn stop_current(&self) -> Result<StopOutcome, AlarmError> {
        match self.store.get_active_alarm()? {
            Some(name) => self.stop(&name),
            None => Ok(StopOutcome::NotCurrentlyAlarming),
        }
    }
}
