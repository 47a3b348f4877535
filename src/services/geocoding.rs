use std::time::Duration;

use super::{BoundingBox, Coordinates, VIETNAM};

use crate::{GenericError, NearbyError};

use async_trait::async_trait;
use google_maps::GoogleMapsClient;
use log::*;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

const USER_AGENT: &str = concat!("nearby-bot/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait GeocodingService: Send + Sync {
    /// Resolves free text to the first matching coordinate inside the national extent.
    async fn geocode(&self, address: &str) -> Result<Coordinates, GenericError>;
}

pub struct NominatimService {
    client: reqwest::Client,
    base_url: String,
    bounds: BoundingBox,
}

impl NominatimService {
    pub fn new(base_url: &str) -> Result<Self, GenericError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(NominatimService {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bounds: VIETNAM,
        })
    }
}

#[derive(Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
}

#[async_trait]
impl GeocodingService for NominatimService {
    async fn geocode(&self, address: &str) -> Result<Coordinates, GenericError> {
        let viewbox = self.bounds.to_viewbox();
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", address),
                ("format", "json"),
                ("limit", "1"),
                ("viewbox", viewbox.as_str()),
                ("bounded", "1"),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NearbyError::RemoteStatus {
                service: "Nominatim",
                status: status.as_u16(),
            }
            .into());
        }

        let body = response.text().await?;
        let coordinates = first_match(&body)?;
        trace!("Received coordinates from Nominatim geocoding API.");
        Ok(coordinates)
    }
}

/// Takes the first hit of a search payload. No hit, or a payload that is not a
/// result list, means the address was not found.
pub fn first_match(body: &str) -> Result<Coordinates, NearbyError> {
    let results: Vec<NominatimResult> = serde_json::from_str(body).map_err(|why| {
        warn!("Unreadable geocoding payload: {}", why);
        NearbyError::AddressNotFound()
    })?;
    let first = results.first().ok_or(NearbyError::AddressNotFound())?;
    let lat: f64 = first.lat.parse().map_err(|_| NearbyError::AddressNotFound())?;
    let lon: f64 = first.lon.parse().map_err(|_| NearbyError::AddressNotFound())?;
    Coordinates::new(lat, lon)
}

pub struct GoogleMapsService {
    client: GoogleMapsClient,
    bounds: BoundingBox,
}

impl GoogleMapsService {
    pub fn new(token: &str) -> Result<Self, GenericError> {
        Ok(GoogleMapsService {
            client: GoogleMapsClient::try_new(token)?,
            bounds: VIETNAM,
        })
    }
}

#[async_trait]
impl GeocodingService for GoogleMapsService {
    async fn geocode(&self, address: &str) -> Result<Coordinates, GenericError> {
        let response = self
            .client
            .geocoding()
            .with_address(address)
            .execute()
            .await?;
        let coordinates = &response
            .results
            .first()
            .ok_or(NearbyError::AddressNotFound())?
            .geometry
            .location;
        trace!("Received coordinates from Google Maps geocoding API.");

        let lat = coordinates.lat.to_f64().ok_or(NearbyError::AddressNotFound())?;
        let lng = coordinates.lng.to_f64().ok_or(NearbyError::AddressNotFound())?;
        let found = Coordinates::new(lat, lng)?;
        if !self.bounds.contains(found) {
            debug!("Google Maps match {} lies outside the search extent.", found);
            return Err(NearbyError::AddressNotFound().into());
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_hit_wins() {
        let body = r#"[
            {"lat": "21.0285", "lon": "105.8542", "display_name": "Hà Nội"},
            {"lat": "10.7769", "lon": "106.7009", "display_name": "Hồ Chí Minh"}
        ]"#;
        assert_eq!(
            first_match(body).unwrap(),
            Coordinates { lat: 21.0285, lon: 105.8542 }
        );
    }

    #[test]
    fn empty_list_is_not_found() {
        assert!(matches!(first_match("[]"), Err(NearbyError::AddressNotFound())));
        assert!(matches!(
            first_match(r#"{"error": "Unable to geocode"}"#),
            Err(NearbyError::AddressNotFound())
        ));
        assert!(matches!(
            first_match(r#"[{"lat": "north", "lon": "106"}]"#),
            Err(NearbyError::AddressNotFound())
        ));
    }

    #[test]
    fn google_client_builds_from_token() {
        let service = GoogleMapsService::new("AIza-test-key").unwrap();
        assert_eq!(service.bounds, VIETNAM);
    }
}
