use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a coordinate falls outside the valid range
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("Latitude {0} is outside [-90, 90]")]
    Latitude(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    Longitude(f64),
}

/// A point on the Earth's surface in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting out-of-range values
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Coordinate {
            latitude,
            longitude,
        })
    }
}

/// A saved place the user wants a proximity alarm for.
///
/// The serialized shape is shared with every other reader of the store, so
/// the field names are fixed: `name`, `latitude`, `longitude`, `alarmEnabled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "alarmEnabled")]
    pub armed: bool,
}

impl Geofence {
    /// Create a geofence at a validated coordinate
    pub fn new(name: impl Into<String>, center: Coordinate, armed: bool) -> Self {
        Geofence {
            name: name.into(),
            latitude: center.latitude,
            longitude: center.longitude,
            armed,
        }
    }

    pub fn center(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Check the stored center against the coordinate ranges
    pub fn validate(&self) -> Result<(), CoordinateError> {
        Coordinate::new(self.latitude, self.longitude).map(|_| ())
    }
}

/// One reading from a position source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters, if the source reports one
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}
