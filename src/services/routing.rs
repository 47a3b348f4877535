use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use derive_more::Display;
use log::*;
use serde::Deserialize;

use super::Coordinates;
use crate::{GenericError, NearbyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TravelMode {
    #[display(fmt = "driving")]
    Driving,
    #[display(fmt = "foot")]
    Walking,
}

impl FromStr for TravelMode {
    type Err = NearbyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "driving" | "car" => Ok(TravelMode::Driving),
            "foot" | "walking" => Ok(TravelMode::Walking),
            other => Err(NearbyError::Config(format!("unknown route profile '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub path: Vec<Coordinates>,
    pub distance_m: f64,
    pub duration_s: f64,
}

#[async_trait]
pub trait RoutingService: Send + Sync {
    async fn route(&self, start: Coordinates, end: Coordinates) -> Result<Route, GenericError>;
}

pub struct OsrmService {
    client: reqwest::Client,
    base_url: String,
    mode: TravelMode,
}

impl OsrmService {
    pub fn new(base_url: &str, mode: TravelMode) -> Result<Self, GenericError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(OsrmService {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mode,
        })
    }

    pub fn route_url(&self, start: Coordinates, end: Coordinates) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url, self.mode, start.lon, start.lat, end.lon, end.lat
        )
    }
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    distance: f64,
    duration: f64,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[async_trait]
impl RoutingService for OsrmService {
    async fn route(&self, start: Coordinates, end: Coordinates) -> Result<Route, GenericError> {
        let url = self.route_url(start, end);
        debug!("Requesting {} route: {}", self.mode, url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!("Routing engine returned {}: {}", status, body);
            return Err(NearbyError::RemoteStatus {
                service: "OSRM",
                status: status.as_u16(),
            }
            .into());
        }
        Ok(parse_route(&body)?)
    }
}

pub fn parse_route(body: &str) -> Result<Route, GenericError> {
    let response: OsrmResponse = serde_json::from_str(body)?;
    if response.code != "Ok" {
        return Err(NearbyError::RouteNotFound().into());
    }
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or(NearbyError::RouteNotFound())?;
    // GeoJSON positions are lon,lat.
    let path = route
        .geometry
        .coordinates
        .iter()
        .map(|[lon, lat]| Coordinates::new(*lat, *lon))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Route {
        path,
        distance_m: route.distance,
        duration_s: route.duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_uses_lon_lat_order_and_profile() {
        let service = OsrmService::new("https://osrm.example/", TravelMode::Walking).unwrap();
        let url = service.route_url(
            Coordinates { lat: 10.5, lon: 106.5 },
            Coordinates { lat: 11.0, lon: 107.0 },
        );
        assert_eq!(
            url,
            "https://osrm.example/route/v1/foot/106.5,10.5;107,11?overview=full&geometries=geojson"
        );
    }

    #[test]
    fn parses_geojson_route() {
        let body = r#"{
            "code": "Ok",
            "routes": [{
                "geometry": {"type": "LineString", "coordinates": [[106.70, 10.77], [106.71, 10.78]]},
                "distance": 1520.4,
                "duration": 210.0
            }]
        }"#;
        let route = parse_route(body).unwrap();
        assert_eq!(route.path.len(), 2);
        assert_eq!(route.path[1], Coordinates { lat: 10.78, lon: 106.71 });
        assert_eq!(route.distance_m, 1520.4);
    }

    #[test]
    fn no_route_is_an_error() {
        assert!(parse_route(r#"{"code": "NoRoute", "routes": []}"#).is_err());
        assert!(parse_route(r#"{"code": "Ok", "routes": []}"#).is_err());
    }

    #[test]
    fn profile_names() {
        assert_eq!("walking".parse::<TravelMode>().unwrap(), TravelMode::Walking);
        assert_eq!(TravelMode::Driving.to_string(), "driving");
        assert!("boat".parse::<TravelMode>().is_err());
    }
}
