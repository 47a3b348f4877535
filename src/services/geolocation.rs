use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::Coordinates;

pub const GEOLOCATION_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeolocationError {
    #[error("User denied geolocation.")]
    PermissionDenied,
    #[error("Position unavailable.")]
    PositionUnavailable,
    #[error("Timed out waiting for a position.")]
    Timeout,
    #[error("Geolocation is not supported here.")]
    Unsupported,
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError>;
}

/// Requests one position, bounded by [`GEOLOCATION_TIMEOUT`].
pub async fn locate(geolocator: &dyn Geolocator) -> Result<Coordinates, GeolocationError> {
    tokio::time::timeout(GEOLOCATION_TIMEOUT, geolocator.current_position())
        .await
        .unwrap_or(Err(GeolocationError::Timeout))
}

/// Device position taken from configuration. No position configured means the
/// host has no geolocation capability.
pub struct ConfiguredGeolocator {
    position: Option<Coordinates>,
}

impl ConfiguredGeolocator {
    pub fn new(position: Option<Coordinates>) -> Self {
        ConfiguredGeolocator { position }
    }
}

#[async_trait]
impl Geolocator for ConfiguredGeolocator {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        self.position.ok_or(GeolocationError::Unsupported)
    }
}
