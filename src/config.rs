use std::path::PathBuf;
use std::str::FromStr;

use log::*;

use crate::services::{routing::TravelMode, Coordinates};
use crate::{GenericError, NearbyError};

pub const DEFAULT_PREFIX: &str = "!nearby";
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";
pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_SEARCH_RADIUS_M: u32 = 3000;
pub const DEFAULT_CANDIDATE_LIMIT: u32 = 100;
pub const DEFAULT_CATEGORIES: &str =
    "amenity=restaurant,amenity=cafe,amenity=fast_food,shop=coffee,shop=bakery,amenity=bar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocoderBackend {
    Nominatim,
    Google,
}

impl FromStr for GeocoderBackend {
    type Err = NearbyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nominatim" | "" => Ok(GeocoderBackend::Nominatim),
            "google" => Ok(GeocoderBackend::Google),
            other => Err(NearbyError::Config(format!("unknown geocoder '{}'", other))),
        }
    }
}

/// A `key=value` tag searched when no keyword is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub overpass_url: String,
    pub radius_m: u32,
    pub candidate_limit: u32,
    pub categories: Vec<CategoryTag>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            radius_m: DEFAULT_SEARCH_RADIUS_M,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            categories: parse_categories(DEFAULT_CATEGORIES).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: Option<String>,
    pub prefix: String,
    pub search: SearchConfig,
    pub geocoder: GeocoderBackend,
    pub nominatim_url: String,
    pub google_maps_token: Option<String>,
    pub osrm_url: String,
    pub travel_mode: TravelMode,
    pub weather_url: String,
    pub openweather_api_key: Option<String>,
    pub identity_url: String,
    pub firebase_api_key: Option<String>,
    pub device_location: Option<Coordinates>,
    pub local_store_path: Option<PathBuf>,
}

impl Config {
    /// Reads the process environment, after merging in a `.env` file if one exists.
    pub fn from_env() -> Result<Self, GenericError> {
        if dotenv::dotenv().is_err() {
            debug!("No .env file loaded.");
        }

        let search = SearchConfig {
            overpass_url: var_or("OVERPASS_URL", DEFAULT_OVERPASS_URL),
            radius_m: var_or("SEARCH_RADIUS_M", &DEFAULT_SEARCH_RADIUS_M.to_string()).parse()?,
            candidate_limit: var_or("SEARCH_CANDIDATE_LIMIT", &DEFAULT_CANDIDATE_LIMIT.to_string())
                .parse()?,
            categories: parse_categories(&var_or("SEARCH_CATEGORIES", DEFAULT_CATEGORIES))?,
        };

        let device_location = match dotenv::var("DEVICE_LOCATION").ok() {
            Some(raw) => Some(parse_coordinates(&raw)?),
            None => None,
        };

        Ok(Config {
            discord_token: dotenv::var("DISCORD_TOKEN").ok(),
            prefix: var_or("BOT_PREFIX", DEFAULT_PREFIX),
            search,
            geocoder: var_or("GEOCODER", "nominatim").parse()?,
            nominatim_url: var_or("NOMINATIM_URL", DEFAULT_NOMINATIM_URL),
            google_maps_token: dotenv::var("GOOGLE_MAPS_TOKEN").ok(),
            osrm_url: var_or("OSRM_URL", DEFAULT_OSRM_URL),
            travel_mode: var_or("ROUTE_PROFILE", "driving").parse()?,
            weather_url: var_or("WEATHER_URL", DEFAULT_WEATHER_URL),
            openweather_api_key: dotenv::var("OPENWEATHER_API_KEY").ok(),
            identity_url: var_or("IDENTITY_URL", DEFAULT_IDENTITY_URL),
            firebase_api_key: dotenv::var("FIREBASE_API_KEY").ok(),
            device_location,
            local_store_path: dotenv::var("LOCAL_STORE_PATH").ok().map(PathBuf::from),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| {
        trace!("{} not set, using default: {}", key, default);
        default.to_string()
    })
}

pub fn parse_categories(raw: &str) -> Result<Vec<CategoryTag>, NearbyError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| NearbyError::Config(format!("category '{}' is not key=value", entry)))?;
            Ok(CategoryTag {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

/// Parses `"lat,lon"`.
pub fn parse_coordinates(raw: &str) -> Result<Coordinates, NearbyError> {
    let invalid = || NearbyError::Config(format!("'{}' is not a lat,lon pair", raw));
    let (lat, lon) = raw.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
    Coordinates::new(lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_categories_are_food_and_drink() {
        let tags = parse_categories(DEFAULT_CATEGORIES).unwrap();
        assert_eq!(tags.len(), 6);
        assert_eq!(
            tags[3],
            CategoryTag {
                key: "shop".into(),
                value: "coffee".into()
            }
        );
    }

    #[test]
    fn malformed_category_is_rejected() {
        assert!(parse_categories("amenity=cafe, tourism").is_err());
        assert!(parse_categories(" , ").unwrap().is_empty());
    }

    #[test]
    fn device_location_parsing() {
        let c = parse_coordinates(" 21.0285 , 105.8542 ").unwrap();
        assert_eq!(c, Coordinates { lat: 21.0285, lon: 105.8542 });
        assert!(parse_coordinates("21.0").is_err());
        assert!(parse_coordinates("200,0").is_err());
    }

    #[test]
    fn geocoder_backend_names() {
        assert_eq!("Google".parse::<GeocoderBackend>().unwrap(), GeocoderBackend::Google);
        assert_eq!("".parse::<GeocoderBackend>().unwrap(), GeocoderBackend::Nominatim);
        assert!("bing".parse::<GeocoderBackend>().is_err());
    }
}
