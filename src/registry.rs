//! Geofence list management
//!
//! Every mutation saves the full list and then re-syncs the evaluation job,
//! so the job exists exactly while something is armed.

use crate::geocoding::{self, GeocodeError, Geocoder};
use crate::models::{Coordinate, CoordinateError, Geofence};
use crate::persistence::{LocationStore, StoreBatch, StoreError, StoreWrite};
use crate::scheduler::{SchedulerAdapter, SyncAction};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while editing the geofence list
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid coordinate: {0}")]
    Coordinate(#[from] CoordinateError),

    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    #[error("A geofence named '{0}' already exists")]
    DuplicateName(String),

    #[error("No geofence named '{0}'")]
    NotFound(String),

    #[error("Geofence name must not be empty")]
    EmptyName,
}

/// Add, remove and toggle saved geofences
pub struct GeofenceRegistry {
    store: Arc<dyn LocationStore>,
    scheduler: Option<SchedulerAdapter>,
}

impl GeofenceRegistry {
    /// Create a registry that only edits the store
    pub fn new(store: Arc<dyn LocationStore>) -> Self {
        GeofenceRegistry {
            store,
            scheduler: None,
        }
    }

    /// Create a registry that also keeps the evaluation job in sync
    pub fn with_scheduler(store: Arc<dyn LocationStore>, scheduler: SchedulerAdapter) -> Self {
        GeofenceRegistry {
            store,
            scheduler: Some(scheduler),
        }
    }

    pub fn list(&self) -> Result<Vec<Geofence>, RegistryError> {
        Ok(self.store.load_locations()?)
    }

    /// Add an armed geofence at `center`
    pub fn add(&self, name: &str, center: Coordinate) -> Result<Geofence, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        // Re-validate in case the coordinate was built without `Coordinate::new`
        let center = Coordinate::new(center.latitude, center.longitude)?;

        let mut locations = self.store.load_locations()?;
        if locations.iter().any(|g| g.name == name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        let geofence = Geofence::new(name, center, true);
        locations.push(geofence.clone());
        self.store.save_locations(&locations)?;
        log::info!(
            "Added geofence '{}' at ({:.5}, {:.5})",
            name,
            center.latitude,
            center.longitude
        );

        self.resync_with(&locations);
        Ok(geofence)
    }

    /// Geocode `address` and add a geofence at the first result
    pub fn add_from_address(
        &self,
        geocoder: &dyn Geocoder,
        name: &str,
        address: &str,
    ) -> Result<Geofence, RegistryError> {
        let center = geocoding::resolve_first(geocoder, address)?;
        self.add(name, center)
    }

    /// Delete a geofence and its cool-down record
    ///
    /// An alarm already raised for it stays active until stopped or replaced.
    pub fn remove(&self, name: &str) -> Result<Geofence, RegistryError> {
        let mut locations = self.store.load_locations()?;
        let index = locations
            .iter()
            .position(|g| g.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let removed = locations.remove(index);

        self.store.commit(
            StoreBatch::new()
                .write(StoreWrite::Locations(locations.clone()))
                .write(StoreWrite::ClearCooldown(name.to_string())),
        )?;
        log::info!("Removed geofence '{}'", name);

        self.resync_with(&locations);
        Ok(removed)
    }

    /// Arm or disarm a geofence
    ///
    /// Disarming does not clear an alarm already raised for it.
    pub fn set_armed(&self, name: &str, armed: bool) -> Result<Geofence, RegistryError> {
        let mut locations = self.store.load_locations()?;
        let geofence = locations
            .iter_mut()
            .find(|g| g.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        geofence.armed = armed;
        let updated = geofence.clone();

        self.store.save_locations(&locations)?;
        log::info!(
            "Geofence '{}' {}",
            name,
            if armed { "armed" } else { "disarmed" }
        );

        self.resync_with(&locations);
        Ok(updated)
    }

    /// Re-read the store and sync the evaluation job
    ///
    /// Picks up edits made by other processes.
    pub fn resync(&self) -> Result<Option<SyncAction>, RegistryError> {
        let Some(ref scheduler) = self.scheduler else {
            return Ok(None);
        };
        let locations = self.store.load_locations()?;
        match scheduler.sync(&locations) {
            Ok(action) => Ok(Some(action)),
            Err(e) => {
                log::error!("Failed to sync evaluation job: {}", e);
                Ok(None)
            }
        }
    }

    fn resync_with(&self, locations: &[Geofence]) {
        if let Some(ref scheduler) = self.scheduler {
            // The store is already updated; the next resync retries
            if let Err(e) = scheduler.sync(locations) {
                log::error!("Failed to sync evaluation job: {}", e);
            }
        }
    }
}
