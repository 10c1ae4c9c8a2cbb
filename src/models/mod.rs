pub mod geofence;

pub use geofence::{Coordinate, CoordinateError, Geofence, PositionFix};
