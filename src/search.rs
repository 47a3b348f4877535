//! The search/fetch/render cycle: geolocation, place lookup and map update.
//!
//! [`SearchSubject`] owns the `(center, query)` key and hands out a numbered
//! [`SearchTicket`] whenever that key is (re)published. [`SearchOrchestrator`]
//! is its only subscriber: it runs the lookup for each ticket and applies the
//! response only if no newer ticket has been issued meanwhile.

use std::sync::{Arc, Mutex, MutexGuard};

use log::*;

use crate::map::{MapSurface, RouteLine};
use crate::route::RouteOverlay;
use crate::services::geocoding::GeocodingService;
use crate::services::geolocation::{self, Geolocator};
use crate::services::places::{PlaceSearchService, MAX_RESULTS};
use crate::services::{Coordinates, Place, DEFAULT_CENTER};
use crate::NearbyError;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchKey {
    pub center: Coordinates,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchTicket {
    pub seq: u64,
    pub key: SearchKey,
}

pub struct SearchSubject {
    key: SearchKey,
    latest: u64,
}

impl SearchSubject {
    pub fn new(center: Coordinates) -> Self {
        SearchSubject {
            key: SearchKey {
                center,
                query: String::new(),
            },
            latest: 0,
        }
    }

    pub fn key(&self) -> &SearchKey {
        &self.key
    }

    pub fn latest(&self) -> u64 {
        self.latest
    }

    pub fn is_latest(&self, seq: u64) -> bool {
        self.latest == seq
    }

    /// Replaces the key and always issues a ticket.
    pub fn publish(&mut self, center: Coordinates, query: String) -> SearchTicket {
        self.key = SearchKey { center, query };
        self.latest += 1;
        SearchTicket {
            seq: self.latest,
            key: self.key.clone(),
        }
    }

    pub fn set_center(&mut self, center: Coordinates) -> Option<SearchTicket> {
        if self.key.center == center {
            return None;
        }
        let query = self.key.query.clone();
        Some(self.publish(center, query))
    }

    pub fn set_query(&mut self, query: &str) -> Option<SearchTicket> {
        if self.key.query == query {
            return None;
        }
        let center = self.key.center;
        Some(self.publish(center, query.to_string()))
    }
}

/// Point-in-time copy of the session's search state.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    pub center: Coordinates,
    pub query: String,
    pub loading: bool,
    pub results: Vec<Place>,
    pub route_target: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The response was applied; holds the new result list.
    Applied(Vec<Place>),
    /// A newer search was issued before this one answered.
    Superseded,
    /// Nothing changed, so nothing was searched.
    Unchanged,
}

struct Inner {
    subject: SearchSubject,
    loading: bool,
    results: Vec<Place>,
    route_target: Option<Coordinates>,
    /// Start point of the route line last requested for `route_target`.
    route_start: Option<Coordinates>,
}

pub struct SearchOrchestrator {
    inner: Mutex<Inner>,
    places: Arc<dyn PlaceSearchService>,
    geocoder: Arc<dyn GeocodingService>,
    map: Arc<dyn MapSurface>,
    routes: RouteOverlay,
}

/// Clears the loading flag when its search ends, however it ends.
struct LoadingGuard<'a> {
    inner: &'a Mutex<Inner>,
    seq: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.subject.is_latest(self.seq) {
            inner.loading = false;
        }
    }
}

impl SearchOrchestrator {
    pub fn new(
        places: Arc<dyn PlaceSearchService>,
        geocoder: Arc<dyn GeocodingService>,
        map: Arc<dyn MapSurface>,
        routes: RouteOverlay,
    ) -> Self {
        SearchOrchestrator {
            inner: Mutex::new(Inner {
                subject: SearchSubject::new(DEFAULT_CENTER),
                loading: false,
                results: Vec::new(),
                route_target: None,
                route_start: None,
            }),
            places,
            geocoder,
            map,
            routes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> SearchState {
        let inner = self.lock();
        SearchState {
            center: inner.subject.key().center,
            query: inner.subject.key().query.clone(),
            loading: inner.loading,
            results: inner.results.clone(),
            route_target: inner.route_target,
        }
    }

    /// Asks for the device position once and searches there, or at the default
    /// center if no position is available. Also backs the locate-me control.
    pub async fn initialize(&self, geolocator: &dyn Geolocator) -> SearchOutcome {
        let center = match geolocation::locate(geolocator).await {
            Ok(position) => position,
            Err(why) => {
                warn!("Geolocation failed ({}), using default center.", why);
                DEFAULT_CENTER
            }
        };
        let ticket = {
            let mut inner = self.lock();
            let query = inner.subject.key().query.clone();
            inner.subject.publish(center, query)
        };
        self.run(ticket).await
    }

    pub async fn set_center(&self, center: Coordinates) -> SearchOutcome {
        let ticket = self.lock().subject.set_center(center);
        match ticket {
            Some(ticket) => self.run(ticket).await,
            None => SearchOutcome::Unchanged,
        }
    }

    pub async fn set_query(&self, query: &str) -> SearchOutcome {
        let ticket = self.lock().subject.set_query(query.trim());
        match ticket {
            Some(ticket) => self.run(ticket).await,
            None => SearchOutcome::Unchanged,
        }
    }

    /// Geocodes `address`, then moves the center and sets the query in one step.
    pub async fn search_address(&self, address: &str) -> Result<SearchOutcome, NearbyError> {
        let address = address.trim();
        if address.is_empty() {
            return Ok(SearchOutcome::Unchanged);
        }

        // Covers the geocoder call; the search it leads to takes over the flag.
        let _geocoding = {
            let mut inner = self.lock();
            inner.loading = true;
            let seq = inner.subject.latest();
            LoadingGuard {
                inner: &self.inner,
                seq,
            }
        };
        let center = match self.geocoder.geocode(address).await {
            Ok(center) => center,
            Err(why) => {
                error!("Failed to geocode address {:?}: {}", address, why);
                return Err(NearbyError::AddressNotFound());
            }
        };

        let ticket = {
            let mut inner = self.lock();
            inner.route_target = None;
            inner.route_start = None;
            inner.subject.publish(center, address.to_string())
        };
        self.routes.clear();
        Ok(self.run(ticket).await)
    }

    /// Recenters on a clicked point and runs a category search there.
    pub async fn map_click(&self, at: Coordinates) -> SearchOutcome {
        let ticket = {
            let mut inner = self.lock();
            inner.route_target = None;
            inner.route_start = None;
            inner.subject.publish(at, String::new())
        };
        self.routes.clear();
        self.run(ticket).await
    }

    pub async fn select_route(&self, place: &Place) -> Option<RouteLine> {
        let start = {
            let mut inner = self.lock();
            let start = inner.subject.key().center;
            inner.route_target = Some(place.location);
            inner.route_start = Some(start);
            start
        };
        trace!("Routing from {} to {} ({}).", start, place.location, place.name);
        self.routes.show(start, place.location).await
    }

    /// Routes to the `n`-th (1-based) entry of the current result list.
    pub async fn select_result(&self, n: usize) -> Result<Option<RouteLine>, NearbyError> {
        let place = {
            let inner = self.lock();
            n.checked_sub(1)
                .and_then(|index| inner.results.get(index))
                .cloned()
                .ok_or(NearbyError::NoSuchResult(n))?
        };
        Ok(self.select_route(&place).await)
    }

    async fn run(&self, ticket: SearchTicket) -> SearchOutcome {
        let SearchTicket { seq, key } = ticket;
        let redraw = {
            let mut inner = self.lock();
            if !inner.subject.is_latest(seq) {
                return SearchOutcome::Superseded;
            }
            inner.loading = true;
            inner.results.clear();
            // Map updates happen under the lock, in ticket order.
            self.map.fly_to(key.center);
            self.map.show_search_marker(key.center);
            self.map.show_places(&[]);
            let moved = inner.route_start != Some(key.center);
            let redraw = inner.route_target.filter(|_| moved);
            if redraw.is_some() {
                inner.route_start = Some(key.center);
            }
            redraw
        };
        let _loading = LoadingGuard {
            inner: &self.inner,
            seq,
        };

        let route = async {
            if let Some(target) = redraw {
                trace!("Redrawing route from {} to {}.", key.center, target);
                self.routes.show(key.center, target).await;
            }
        };
        let (outcome, ()) = tokio::join!(self.fetch_and_apply(seq, &key), route);
        outcome
    }

    async fn fetch_and_apply(&self, seq: u64, key: &SearchKey) -> SearchOutcome {
        debug!("Search #{} at {} for {:?}.", seq, key.center, key.query);
        let mut found = match self.places.search(key.center, &key.query).await {
            Ok(found) => found,
            Err(why) => {
                error!("Failed to fetch places: {}", why);
                Vec::new()
            }
        };
        found.truncate(MAX_RESULTS);

        {
            let mut inner = self.lock();
            if !inner.subject.is_latest(seq) {
                trace!("Dropping stale search #{} (latest #{}).", seq, inner.subject.latest());
                return SearchOutcome::Superseded;
            }
            inner.results = found.clone();
            self.map.show_places(&found);
        }
        SearchOutcome::Applied(found)
    }
}
