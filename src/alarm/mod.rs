//! Alarm state machine
//!
//! Each geofence is effectively `Idle`, `CoolingDown` or `Alarming`. All of
//! that state lives in the [`LocationStore`](crate::persistence::LocationStore):
//! the cool-down record says when a geofence last fired and the active alarm
//! pointer says which one is alarming now. Nothing is cached between ticks.

pub mod engine;
pub mod stop;

pub use engine::{AlarmEngine, TickOutcome};
pub use stop::{StopAction, StopOutcome};

use crate::notify::PresentError;
use crate::persistence::StoreError;
use crate::position::PositionError;
use thiserror::Error;

/// Minimum time between two alarms for the same geofence, in seconds
pub const COOLDOWN_SECONDS: i64 = 5 * 60;

/// [`COOLDOWN_SECONDS`] as a duration
pub fn cooldown() -> chrono::Duration {
    chrono::Duration::seconds(COOLDOWN_SECONDS)
}

/// Errors surfaced by foreground alarm operations
///
/// The messages are meant to be shown to the user as-is.
#[derive(Error, Debug)]
pub enum AlarmError {
    #[error("Location permission denied ({0}). Grant location access in settings and retry.")]
    PermissionDenied(String),

    #[error("Location service is off. Turn it on in settings and retry.")]
    ServiceDisabled,

    #[error("Current position unavailable: {0}. Try again in a moment.")]
    PositionUnavailable(String),

    #[error("Store unavailable, nothing was changed: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Could not present the alarm: {0}")]
    Presentation(#[from] PresentError),
}

impl From<PositionError> for AlarmError {
    fn from(err: PositionError) -> Self {
        match err {
            PositionError::PermissionDenied(what) => AlarmError::PermissionDenied(what),
            PositionError::ServiceDisabled => AlarmError::ServiceDisabled,
            other @ (PositionError::Unavailable(_) | PositionError::Stale { .. }) => {
                AlarmError::PositionUnavailable(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_error_mapping() {
        assert!(matches!(
            AlarmError::from(PositionError::ServiceDisabled),
            AlarmError::ServiceDisabled
        ));
        assert!(matches!(
            AlarmError::from(PositionError::PermissionDenied("fix.json".into())),
            AlarmError::PermissionDenied(_)
        ));
        let stale = AlarmError::from(PositionError::Stale {
            age_seconds: 300,
            max_age_seconds: 60,
        });
        assert!(matches!(stale, AlarmError::PositionUnavailable(_)));
        assert!(stale.to_string().contains("300s old"));
    }

    #[test]
    fn test_cooldown_is_five_minutes() {
        assert_eq!(cooldown().num_minutes(), 5);
    }
}
