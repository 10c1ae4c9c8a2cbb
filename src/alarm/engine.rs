//! Per-tick geofence evaluation

use super::{cooldown, AlarmError, StopAction, StopOutcome};
use crate::events::{EventBus, MonitorEvent};
use crate::geo;
use crate::models::Geofence;
use crate::notify::{AlarmNotification, AlarmPresenter};
use crate::persistence::{LocationStore, StoreBatch, StoreWrite};
use crate::position::PositionSource;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

/// What a single evaluation tick decided
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No geofence is armed, so there was nothing to evaluate
    NoArmedGeofences,
    /// Evaluation was not possible this tick (position or store trouble)
    Skipped { reason: String },
    /// No armed geofence is within range of the current position
    NoneInRange,
    /// In range, but the geofence alarmed too recently
    CoolingDown { name: String, remaining: Duration },
    /// Another context changed the alarm state first; this tick wrote nothing
    Superseded { name: String },
    /// An alarm was raised for this geofence
    Fired { name: String, distance_m: f64 },
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickOutcome::NoArmedGeofences => write!(f, "no armed geofences"),
            TickOutcome::Skipped { reason } => write!(f, "evaluation skipped: {}", reason),
            TickOutcome::NoneInRange => write!(f, "no geofence in range"),
            TickOutcome::CoolingDown { name, remaining } => write!(
                f,
                "'{}' in range but cooling down for {}s",
                name,
                remaining.num_seconds()
            ),
            TickOutcome::Superseded { name } => {
                write!(f, "alarm for '{}' superseded by a concurrent change", name)
            }
            TickOutcome::Fired { name, distance_m } => {
                write!(f, "alarm fired for '{}' at {:.1} m", name, distance_m)
            }
        }
    }
}

/// The alarm state machine
///
/// Holds no state of its own between ticks; every call re-reads the store.
pub struct AlarmEngine {
    store: Arc<dyn LocationStore>,
    position: Arc<dyn PositionSource>,
    presenter: Arc<dyn AlarmPresenter>,
    events: EventBus,
}

impl AlarmEngine {
    pub fn new(
        store: Arc<dyn LocationStore>,
        position: Arc<dyn PositionSource>,
        presenter: Arc<dyn AlarmPresenter>,
        events: EventBus,
    ) -> Self {
        AlarmEngine {
            store,
            position,
            presenter,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run one tick from the background context
    ///
    /// Never fails: errors are logged and reported as [`TickOutcome::Skipped`]
    /// so the scheduler always sees the tick complete.
    pub fn run_tick(&self) -> TickOutcome {
        let outcome = match self.evaluate_at(Utc::now()) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Tick skipped: {}", e);
                TickOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        };

        log::info!("Evaluation completed: {}", outcome);
        self.events.publish(MonitorEvent::EvaluationCompleted {
            status: outcome.to_string(),
        });
        outcome
    }

    /// Evaluate all armed geofences against the current position at `now`
    ///
    /// At most one alarm fires per call: the first in-range geofence (in
    /// store order) whose cool-down has expired wins.
    pub fn evaluate_at(&self, now: DateTime<Utc>) -> Result<TickOutcome, AlarmError> {
        let locations = self.store.load_locations()?;
        let armed: Vec<&Geofence> = locations.iter().filter(|g| g.armed).collect();
        if armed.is_empty() {
            return Ok(TickOutcome::NoArmedGeofences);
        }

        let fix = self.position.current_position()?;
        log::debug!(
            "Position ({:.5}, {:.5}), accuracy {:?} m",
            fix.coordinate.latitude,
            fix.coordinate.longitude,
            fix.accuracy_m
        );

        // Read before acting; the fire commit is guarded by this value
        let active = self.store.get_active_alarm()?;
        let mut cooling: Option<TickOutcome> = None;

        for geofence in armed {
            let distance_m = geo::distance(fix.coordinate, geofence.center());
            if !geo::is_within_range(distance_m) {
                log::debug!("'{}' is {:.0} m away", geofence.name, distance_m);
                continue;
            }

            let last_alarm = self.store.get_cooldown(&geofence.name)?;
            if let Some(last) = last_alarm {
                let elapsed = now - last;
                if elapsed < cooldown() {
                    log::debug!(
                        "'{}' in range but alarmed {}s ago",
                        geofence.name,
                        elapsed.num_seconds()
                    );
                    cooling.get_or_insert(TickOutcome::CoolingDown {
                        name: geofence.name.clone(),
                        remaining: cooldown() - elapsed,
                    });
                    continue;
                }
            }

            return self.fire(geofence, distance_m, last_alarm, active, now);
        }

        Ok(cooling.unwrap_or(TickOutcome::NoneInRange))
    }

    fn fire(
        &self,
        geofence: &Geofence,
        distance_m: f64,
        last_alarm: Option<DateTime<Utc>>,
        previous_active: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, AlarmError> {
        let name = geofence.name.clone();

        // The cool-down check and the cool-down write form one critical section
        let batch = StoreBatch::new()
            .expecting_active_alarm(previous_active.as_deref())
            .expecting_cooldown(&name, last_alarm)
            .write(StoreWrite::Cooldown(name.clone(), now))
            .write(StoreWrite::ActiveAlarm(Some(name.clone())));

        if !self.store.commit(batch)? {
            log::info!("Alarm state changed during evaluation, not firing '{}'", name);
            return Ok(TickOutcome::Superseded { name });
        }

        if let Err(e) = self.presenter.present(&AlarmNotification::for_location(&name)) {
            log::error!("Failed to present alarm for '{}': {}", name, e);
            self.roll_back_fire(&name, last_alarm, previous_active);
            return Err(e.into());
        }

        log::warn!("ALARM: within {:.1} m of '{}'", distance_m, name);
        self.events.publish(MonitorEvent::AlarmFired {
            name: name.clone(),
            distance_m,
        });

        Ok(TickOutcome::Fired { name, distance_m })
    }

    /// Undo a fire commit whose notification never showed
    fn roll_back_fire(
        &self,
        name: &str,
        last_alarm: Option<DateTime<Utc>>,
        previous_active: Option<String>,
    ) {
        let restore_cooldown = match last_alarm {
            Some(at) => StoreWrite::Cooldown(name.to_string(), at),
            None => StoreWrite::ClearCooldown(name.to_string()),
        };
        let batch = StoreBatch::new()
            .expecting_active_alarm(Some(name))
            .write(restore_cooldown)
            .write(StoreWrite::ActiveAlarm(previous_active));

        match self.store.commit(batch) {
            Ok(true) => log::debug!("Rolled back alarm state for '{}'", name),
            Ok(false) => log::warn!("Alarm for '{}' changed before rollback", name),
            Err(e) => log::error!("Failed to roll back alarm state for '{}': {}", name, e),
        }
    }

    /// Stop the alarm for `name` (foreground or notification action)
    pub fn stop_alarm(&self, name: &str) -> Result<StopOutcome, AlarmError> {
        StopAction::new(Arc::clone(&self.store), Arc::clone(&self.presenter))
            .with_events(self.events.clone())
            .stop(name)
    }
}
