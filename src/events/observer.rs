//! Foreground side of the event channel

use super::{EventBus, EventListener, MonitorEvent};
use crate::alarm::AlarmError;
use crate::notify::{AlarmNotification, AlarmPresenter};
use crate::persistence::LocationStore;
use std::sync::Arc;

/// A live foreground process watching the evaluator
///
/// Events are only hints. On every resume the observer re-reads the active
/// alarm pointer, because the tick that raised it may have run while nothing
/// was listening.
pub struct ForegroundObserver {
    store: Arc<dyn LocationStore>,
    presenter: Arc<dyn AlarmPresenter>,
    listener: EventListener,
}

impl ForegroundObserver {
    pub fn new(
        store: Arc<dyn LocationStore>,
        presenter: Arc<dyn AlarmPresenter>,
        events: &EventBus,
    ) -> Self {
        ForegroundObserver {
            store,
            presenter,
            listener: events.subscribe(),
        }
    }

    /// Reconcile with the store after (re)gaining the foreground
    ///
    /// If an alarm is active, present it again and return its name.
    pub fn resume(&self) -> Result<Option<String>, AlarmError> {
        let active = self.store.get_active_alarm()?;
        if let Some(ref name) = active {
            log::info!("Alarm for '{}' is active, presenting it", name);
            self.presenter
                .present(&AlarmNotification::for_location(name))?;
        }
        Ok(active)
    }

    /// Wait for the next status message from the evaluator
    pub async fn next_event(&mut self) -> Option<MonitorEvent> {
        self.listener.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NotificationOutput, OutputFormat};
    use crate::alarm::{StopAction, StopOutcome};
    use crate::models::{Coordinate, Geofence};
    use crate::persistence::SqliteLocationStore;
    use std::time::Duration;

    fn setup() -> (Arc<SqliteLocationStore>, Arc<NotificationOutput>, EventBus) {
        let store = Arc::new(SqliteLocationStore::in_memory().unwrap());
        let presenter = Arc::new(NotificationOutput::new(OutputFormat::Console, None).unwrap());
        (store, presenter, EventBus::new("test"))
    }

    #[test]
    fn test_resume_without_alarm() {
        let (store, presenter, bus) = setup();
        let observer = ForegroundObserver::new(store, presenter.clone(), &bus);

        assert_eq!(observer.resume().unwrap(), None);
        assert!(presenter.shown().is_none());
    }

    #[test]
    fn test_resume_presents_missed_alarm() {
        let (store, presenter, bus) = setup();
        // Raised by a tick while no foreground was alive
        store.set_active_alarm(Some("Home")).unwrap();

        let observer = ForegroundObserver::new(store, presenter.clone(), &bus);
        assert_eq!(observer.resume().unwrap().as_deref(), Some("Home"));
        assert_eq!(presenter.shown().map(|n| n.location), Some("Home".to_string()));
    }

    #[tokio::test]
    async fn test_receives_events() {
        let (store, presenter, bus) = setup();
        let mut observer = ForegroundObserver::new(store, presenter, &bus);

        bus.publish(MonitorEvent::AlarmStopped { name: "Home".into() });
        assert_eq!(
            observer.next_event().await,
            Some(MonitorEvent::AlarmStopped { name: "Home".into() })
        );
    }

    #[tokio::test]
    async fn test_stop_in_another_process_is_seen_only_through_the_store() {
        let (store, presenter, bus) = setup();
        store
            .save_locations(&[Geofence::new(
                "Home",
                Coordinate::new(40.0, -73.0).unwrap(),
                true,
            )])
            .unwrap();
        store.set_active_alarm(Some("Home")).unwrap();
        let mut observer = ForegroundObserver::new(store.clone(), presenter.clone(), &bus);
        observer.resume().unwrap();

        // The CLI has its own presenter and its own bus
        let cli_presenter = Arc::new(NotificationOutput::new(OutputFormat::Console, None).unwrap());
        let cli_stop = StopAction::new(store, cli_presenter).with_events(EventBus::new("cli"));
        assert_eq!(
            cli_stop.stop("Home").unwrap(),
            StopOutcome::Stopped {
                name: "Home".to_string()
            }
        );

        let heard = tokio::time::timeout(Duration::from_millis(50), observer.next_event()).await;
        assert!(heard.is_err());
        assert!(presenter.shown().is_some());

        assert_eq!(observer.resume().unwrap(), None);
    }
}
