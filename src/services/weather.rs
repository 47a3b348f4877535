use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::*;
use serde::Deserialize;

use super::Coordinates;
use crate::{GenericError, NearbyError};

pub const UNAVAILABLE: &str = "Weather data unavailable";

/// Current conditions at one coordinate. Temperatures in °C, wind in km/h, pressure in hPa.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub temperature: i32,
    pub feels_like: i32,
    pub humidity: u8,
    pub condition: String,
    pub icon: String,
    pub wind_speed_kmh: i32,
    pub pressure: u32,
    pub city: String,
}

impl WeatherSnapshot {
    pub fn icon_url(&self) -> String {
        format!("https://openweathermap.org/img/wn/{}@2x.png", self.icon)
    }
}

impl fmt::Display for WeatherSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "**{}** ({})", self.city, self.condition)?;
        writeln!(f, "{}°C, feels like {}°C", self.temperature, self.feels_like)?;
        write!(
            f,
            "Humidity {}% | Wind Speed {} km/h | Pressure {} hPa",
            self.humidity, self.wind_speed_kmh, self.pressure
        )
    }
}

#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn current(&self, at: Coordinates) -> Result<WeatherSnapshot, GenericError>;

    /// Single attempt; any failure is logged and reported as absent.
    async fn fetch(&self, at: Coordinates) -> Option<WeatherSnapshot> {
        match self.current(at).await {
            Ok(snapshot) => Some(snapshot),
            Err(why) => {
                error!("Failed to fetch weather for {}: {}", at, why);
                None
            }
        }
    }
}

pub struct OpenWeatherService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherService {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, GenericError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(OpenWeatherService {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct CurrentWeather {
    main: MainReadings,
    weather: Vec<Condition>,
    wind: Wind,
    name: String,
}

#[derive(Deserialize)]
struct MainReadings {
    temp: f64,
    feels_like: f64,
    humidity: u8,
    pressure: u32,
}

#[derive(Deserialize)]
struct Condition {
    main: String,
    icon: String,
}

#[derive(Deserialize)]
struct Wind {
    speed: f64,
}

#[async_trait]
impl WeatherService for OpenWeatherService {
    async fn current(&self, at: Coordinates) -> Result<WeatherSnapshot, GenericError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", at.lat.to_string()),
                ("lon", at.lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NearbyError::RemoteStatus {
                service: "OpenWeather",
                status: status.as_u16(),
            }
            .into());
        }
        let body = response.text().await?;
        trace!("Received current weather for {}.", at);
        parse_snapshot(&body)
    }
}

pub fn parse_snapshot(body: &str) -> Result<WeatherSnapshot, GenericError> {
    let raw: CurrentWeather = serde_json::from_str(body)?;
    let condition = raw
        .weather
        .into_iter()
        .next()
        .ok_or("weather payload carries no condition")?;
    Ok(WeatherSnapshot {
        temperature: raw.main.temp.round() as i32,
        feels_like: raw.main.feels_like.round() as i32,
        humidity: raw.main.humidity,
        condition: condition.main,
        icon: condition.icon,
        wind_speed_kmh: (raw.wind.speed * 3.6).round() as i32,
        pressure: raw.main.pressure,
        city: raw.name,
    })
}

/// Weather shown next to the map; refetched only when the center moves.
#[derive(Default)]
pub struct WeatherPanel {
    center: Option<Coordinates>,
    snapshot: Option<WeatherSnapshot>,
}

impl WeatherPanel {
    pub async fn refresh(&mut self, service: &dyn WeatherService, center: Coordinates) {
        if self.center == Some(center) && self.snapshot.is_some() {
            return;
        }
        self.snapshot = service.fetch(center).await;
        self.center = Some(center);
    }

    pub fn snapshot(&self) -> Option<&WeatherSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn render(&self) -> String {
        match &self.snapshot {
            Some(snapshot) => format!("{}\n{}", snapshot, snapshot.icon_url()),
            None => UNAVAILABLE.to_string(),
        }
    }
}
