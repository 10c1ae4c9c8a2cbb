//! Position sources
//!
//! The alarm engine asks for the current position once per tick. A source
//! either answers with a fix or explains why it could not, so the engine can
//! skip the tick instead of failing.

pub mod file_source;

pub use file_source::FilePositionSource;

use crate::models::{Coordinate, PositionFix};
use chrono::Utc;
use thiserror::Error;

/// Errors that can occur while fetching the current position
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("Location permission denied: {0}")]
    PermissionDenied(String),

    #[error("Location service is disabled")]
    ServiceDisabled,

    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("Last fix is {age_seconds}s old (limit {max_age_seconds}s)")]
    Stale {
        age_seconds: i64,
        max_age_seconds: i64,
    },
}

/// Trait for on-demand position queries
pub trait PositionSource: Send + Sync {
    /// Fetch the current position
    ///
    /// May block while the underlying device produces a fix.
    fn current_position(&self) -> Result<PositionFix, PositionError>;
}

/// A source that always reports the same coordinate
///
/// Useful for stationary hosts and for testing.
#[derive(Debug, Clone)]
pub struct FixedPositionSource {
    coordinate: Coordinate,
    accuracy_m: Option<f64>,
}

impl FixedPositionSource {
    pub fn new(coordinate: Coordinate) -> Self {
        FixedPositionSource {
            coordinate,
            accuracy_m: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }
}

impl PositionSource for FixedPositionSource {
    fn current_position(&self) -> Result<PositionFix, PositionError> {
        Ok(PositionFix {
            coordinate: self.coordinate,
            accuracy_m: self.accuracy_m,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_source() {
        let here = Coordinate::new(40.0, -73.0).unwrap();
        let source = FixedPositionSource::new(here).with_accuracy(5.0);

        let fix = source.current_position().unwrap();
        assert_eq!(fix.coordinate, here);
        assert_eq!(fix.accuracy_m, Some(5.0));
    }

    #[test]
    fn test_error_messages() {
        let err = PositionError::Stale {
            age_seconds: 600,
            max_age_seconds: 120,
        };
        assert_eq!(err.to_string(), "Last fix is 600s old (limit 120s)");
    }
}
