pub mod alarm;
pub mod config;
pub mod context;
pub mod events;
pub mod geo;
pub mod geocoding;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod position;
pub mod registry;
pub mod scheduler;

// Re-export commonly used types
pub use alarm::{AlarmEngine, AlarmError, StopAction, StopOutcome, TickOutcome};
pub use events::{EventBus, ForegroundObserver, MonitorEvent};
pub use models::{Coordinate, Geofence, PositionFix};
pub use persistence::{LocationStore, SqliteLocationStore};
pub use registry::GeofenceRegistry;
pub use scheduler::{SchedulerAdapter, TokioScheduler};
