//! Address to coordinate resolution
//!
//! Geofences are created from free-text addresses. Resolution is offline: a
//! gazetteer file maps known addresses to coordinates.

use crate::models::{Coordinate, CoordinateError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while resolving an address
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Address not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),

    #[error("Failed to read gazetteer: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid gazetteer: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid coordinate for '{address}': {source}")]
    Coordinate {
        address: String,
        #[source]
        source: CoordinateError,
    },
}

/// Trait for address lookup backends
pub trait Geocoder: Send + Sync {
    /// Resolve an address to candidate coordinates, best match first
    fn resolve(&self, address: &str) -> Result<Vec<Coordinate>, GeocodeError>;
}

/// Resolve an address and take the first candidate
pub fn resolve_first(geocoder: &dyn Geocoder, address: &str) -> Result<Coordinate, GeocodeError> {
    geocoder
        .resolve(address)?
        .into_iter()
        .next()
        .ok_or_else(|| GeocodeError::NotFound(address.to_string()))
}

/// One known place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GazetteerFile {
    #[serde(default)]
    places: Vec<Place>,
}

/// Geocoder backed by a TOML list of known places
///
/// ```toml
/// [[places]]
/// address = "350 5th Ave, New York, NY"
/// latitude = 40.7484
/// longitude = -73.9857
/// ```
///
/// A query matches every place whose address contains it, ignoring case,
/// punctuation and repeated whitespace. Matches keep file order.
#[derive(Debug, Default)]
pub struct GazetteerGeocoder {
    places: Vec<(String, Coordinate)>,
}

impl GazetteerGeocoder {
    /// Load a gazetteer file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GeocodeError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, GeocodeError> {
        let file: GazetteerFile = toml::from_str(contents)?;
        Self::from_places(file.places)
    }

    pub fn from_places(places: Vec<Place>) -> Result<Self, GeocodeError> {
        let places = places
            .into_iter()
            .map(|place| {
                let coordinate = Coordinate::new(place.latitude, place.longitude).map_err(|source| {
                    GeocodeError::Coordinate {
                        address: place.address.clone(),
                        source,
                    }
                })?;
                Ok((normalize(&place.address), coordinate))
            })
            .collect::<Result<Vec<_>, GeocodeError>>()?;

        Ok(GazetteerGeocoder { places })
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

impl Geocoder for GazetteerGeocoder {
    fn resolve(&self, address: &str) -> Result<Vec<Coordinate>, GeocodeError> {
        let query = normalize(address);
        if query.is_empty() {
            return Err(GeocodeError::Failed("Address is empty".to_string()));
        }

        Ok(self
            .places
            .iter()
            .filter(|(known, _)| known.contains(&query))
            .map(|(_, coordinate)| *coordinate)
            .collect())
    }
}

/// Lowercase, drop punctuation and collapse whitespace
fn normalize(address: &str) -> String {
    address
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
