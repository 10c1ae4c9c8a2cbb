//! Great-circle distance and the proximity trigger
//!
//! The haversine formula is accurate to well under half a percent at the
//! walking and driving distances geofences care about.

use crate::models::Coordinate;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geofence triggers when the current position is at most this far away
pub const TRIGGER_DISTANCE_METERS: f64 = 100.0;

/// Calculate the great-circle distance between two points using the Haversine formula
/// Returns distance in meters
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let c = 2.0 * h.min(1.0).sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Whether a distance in meters is close enough to trigger an alarm
pub fn is_within_range(distance_m: f64) -> bool {
    distance_m <= TRIGGER_DISTANCE_METERS
}
