use std::collections::HashMap;
use std::sync::Arc;

use log::*;
use tokio::sync::Mutex;

use crate::config::{Config, GeocoderBackend};
use crate::map::MapScene;
use crate::route::RouteOverlay;
use crate::search::SearchOrchestrator;
use crate::services::auth::{AuthGateway, AuthSession, FirebaseService, IdentityService};
use crate::services::geocoding::{GeocodingService, GoogleMapsService, NominatimService};
use crate::services::geolocation::{ConfiguredGeolocator, Geolocator};
use crate::services::places::{OverpassService, PlaceSearchService};
use crate::services::routing::{OsrmService, RoutingService};
use crate::services::translation::BackendTranslator;
use crate::services::weather::{OpenWeatherService, WeatherPanel, WeatherService, UNAVAILABLE};
use crate::storage::LocalStore;
use crate::{GenericError, NearbyError};

/// Remote clients shared by every session.
pub struct Services {
    pub places: Arc<dyn PlaceSearchService>,
    pub geocoder: Arc<dyn GeocodingService>,
    pub router: Arc<dyn RoutingService>,
    pub weather: Option<Arc<dyn WeatherService>>,
    pub translator: Arc<BackendTranslator>,
    pub identity: Option<Arc<dyn IdentityService>>,
    pub geolocator: Arc<dyn Geolocator>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self, GenericError> {
        let geocoder: Arc<dyn GeocodingService> = match config.geocoder {
            GeocoderBackend::Nominatim => Arc::new(NominatimService::new(&config.nominatim_url)?),
            GeocoderBackend::Google => {
                let token = config.google_maps_token.as_deref().ok_or_else(|| {
                    NearbyError::Config("GEOCODER=google needs GOOGLE_MAPS_TOKEN".to_string())
                })?;
                Arc::new(GoogleMapsService::new(token)?)
            }
        };

        let weather: Option<Arc<dyn WeatherService>> = match &config.openweather_api_key {
            Some(key) => Some(Arc::new(OpenWeatherService::new(&config.weather_url, key)?)),
            None => {
                warn!("OPENWEATHER_API_KEY not set, weather panel disabled.");
                None
            }
        };

        let identity: Option<Arc<dyn IdentityService>> = match &config.firebase_api_key {
            Some(key) => Some(Arc::new(FirebaseService::new(&config.identity_url, key)?)),
            None => {
                warn!("FIREBASE_API_KEY not set, sign-in disabled.");
                None
            }
        };

        let store = match &config.local_store_path {
            Some(path) => LocalStore::open(path),
            None => LocalStore::open_default()?,
        };

        Ok(Services {
            places: Arc::new(OverpassService::new(config.search.clone())?),
            geocoder,
            router: Arc::new(OsrmService::new(&config.osrm_url, config.travel_mode)?),
            weather,
            translator: Arc::new(BackendTranslator::new(Arc::new(store))?),
            identity,
            geolocator: Arc::new(ConfiguredGeolocator::new(config.device_location)),
        })
    }
}

/// Everything one channel sees: map, search state, weather panel and sign-in.
pub struct AppSession {
    pub map: Arc<MapScene>,
    pub search: SearchOrchestrator,
    pub weather: Mutex<WeatherPanel>,
    pub auth: Option<AuthGateway>,
}

impl AppSession {
    pub fn new(services: &Services) -> Self {
        let map = Arc::new(MapScene::new());
        let routes = RouteOverlay::new(services.router.clone(), map.clone());
        let search = SearchOrchestrator::new(
            services.places.clone(),
            services.geocoder.clone(),
            map.clone(),
            routes,
        );

        let auth = services.identity.clone().map(|provider| {
            let session = Arc::new(AuthSession::new());
            session.subscribe(|user| match user {
                Some(user) => info!("Signed in as {}.", user.email),
                None => debug!("No user signed in."),
            });
            AuthGateway::new(provider, session)
        });

        AppSession {
            map,
            search,
            weather: Mutex::new(WeatherPanel::default()),
            auth,
        }
    }

    pub async fn weather_report(&self, services: &Services) -> String {
        let service = match &services.weather {
            Some(service) => service,
            None => return UNAVAILABLE.to_string(),
        };
        let center = self.search.state().center;
        let mut panel = self.weather.lock().await;
        panel.refresh(service.as_ref(), center).await;
        panel.render()
    }
}

pub struct SessionRegistry {
    services: Services,
    sessions: Mutex<HashMap<u64, Arc<AppSession>>>,
}

impl SessionRegistry {
    pub fn new(services: Services) -> Self {
        SessionRegistry {
            services,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Returns the channel's session, creating and locating it on first use.
    pub async fn session(&self, channel: u64) -> Arc<AppSession> {
        let (session, created) = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(&channel) {
                Some(session) => (session.clone(), false),
                None => {
                    let session = Arc::new(AppSession::new(&self.services));
                    sessions.insert(channel, session.clone());
                    (session, true)
                }
            }
        };
        if created {
            trace!("Starting session for channel {}.", channel);
            session
                .search
                .initialize(self.services.geolocator.as_ref())
                .await;
        }
        session
    }
}
