//! Cross-context notifications
//!
//! The periodic evaluator announces what it did on a named, best-effort
//! broadcast channel. Messages are dropped when nobody listens and a slow
//! listener may miss some; the store stays the source of truth, and a
//! foreground observer reconciles from it on every resume.
//!
//! The bus lives inside one process. A tick or stop run by `geoalarm_cli`
//! publishes on its own bus, so the daemon's observer never hears of it and
//! the daemon's presenter keeps showing a notification the CLI already
//! stopped until the next `resume` re-reads the store.

pub mod observer;

pub use observer::ForegroundObserver;

use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;

/// Default name of the evaluator's status channel
pub const MONITOR_CHANNEL: &str = "geoalarm.monitor";

const CHANNEL_CAPACITY: usize = 64;

/// Status messages sent from the evaluator to foreground listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A tick finished; carries a human-readable summary
    EvaluationCompleted { status: String },
    AlarmFired { name: String, distance_m: f64 },
    AlarmStopped { name: String },
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorEvent::EvaluationCompleted { status } => {
                write!(f, "Evaluation completed: {}", status)
            }
            MonitorEvent::AlarmFired { name, distance_m } => {
                write!(f, "Alarm fired for '{}' ({:.1} m away)", name, distance_m)
            }
            MonitorEvent::AlarmStopped { name } => write!(f, "Alarm stopped for '{}'", name),
        }
    }
}

/// Named broadcast channel for [`MonitorEvent`]s
#[derive(Clone)]
pub struct EventBus {
    name: String,
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        EventBus {
            name: name.into(),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send an event to every attached listener
    ///
    /// Returns how many listeners received it; zero means it was dropped.
    pub fn publish(&self, event: MonitorEvent) -> usize {
        match self.tx.send(event) {
            Ok(listeners) => listeners,
            Err(broadcast::error::SendError(event)) => {
                log::trace!("No listener on {}, dropping: {}", self.name, event);
                0
            }
        }
    }

    /// Attach a new listener; it only sees events published after this call
    pub fn subscribe(&self) -> EventListener {
        EventListener {
            channel: self.name.clone(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(MONITOR_CHANNEL)
    }
}

/// Receiving end of an [`EventBus`]
pub struct EventListener {
    channel: String,
    rx: broadcast::Receiver<MonitorEvent>,
}

impl EventListener {
    /// Wait for the next event; `None` once every bus handle is gone
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Listener on {} missed {} event(s)", self.channel, missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    log::warn!("Listener on {} missed {} event(s)", self.channel, missed);
                }
                Err(_) => return None,
            }
        }
    }
}
