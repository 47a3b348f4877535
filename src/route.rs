use std::sync::{Arc, Mutex};

use log::*;

use crate::map::{LineStyle, MapSurface, RouteLine};
use crate::services::routing::RoutingService;
use crate::services::Coordinates;

/// Keeps at most one route line on the map. Each update takes a generation
/// number; responses for an older generation are dropped.
pub struct RouteOverlay {
    router: Arc<dyn RoutingService>,
    map: Arc<dyn MapSurface>,
    generation: Mutex<u64>,
}

impl RouteOverlay {
    pub fn new(router: Arc<dyn RoutingService>, map: Arc<dyn MapSurface>) -> Self {
        RouteOverlay {
            router,
            map,
            generation: Mutex::new(0),
        }
    }

    fn bump(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(|p| p.into_inner());
        *generation += 1;
        *generation
    }

    /// Requests a route and swaps it in. Returns `None` if a newer update or a
    /// clear happened while the request was in flight.
    pub async fn show(&self, start: Coordinates, end: Coordinates) -> Option<RouteLine> {
        let ticket = self.bump();
        let line = match self.router.route(start, end).await {
            Ok(route) => RouteLine {
                path: route.path,
                style: LineStyle::Solid,
                distance_m: Some(route.distance_m),
                duration_s: Some(route.duration_s),
            },
            Err(why) => {
                warn!("No route from {} to {}: {}", start, end, why);
                RouteLine {
                    path: vec![start, end],
                    style: LineStyle::Dashed,
                    distance_m: None,
                    duration_s: None,
                }
            }
        };

        let generation = self.generation.lock().unwrap_or_else(|p| p.into_inner());
        if *generation != ticket {
            trace!("Dropping stale route {} (latest {}).", ticket, *generation);
            return None;
        }
        self.map.remove_route();
        self.map.draw_route(&line);
        Some(line)
    }

    pub fn clear(&self) {
        let _generation = self.bump();
        self.map.remove_route();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapScene;
    use crate::services::routing::Route;
    use crate::{GenericError, NearbyError};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    struct StraightRouter;

    #[async_trait]
    impl RoutingService for StraightRouter {
        async fn route(&self, start: Coordinates, end: Coordinates) -> Result<Route, GenericError> {
            Ok(Route {
                path: vec![start, end],
                distance_m: 100.0,
                duration_s: 60.0,
            })
        }
    }

    struct BrokenRouter;

    #[async_trait]
    impl RoutingService for BrokenRouter {
        async fn route(&self, _: Coordinates, _: Coordinates) -> Result<Route, GenericError> {
            Err(NearbyError::RouteNotFound().into())
        }
    }

    /// Holds the first request until released.
    struct GatedRouter {
        gate: Notify,
        first: Mutex<bool>,
    }

    #[async_trait]
    impl RoutingService for GatedRouter {
        async fn route(&self, start: Coordinates, end: Coordinates) -> Result<Route, GenericError> {
            let wait = std::mem::replace(&mut *self.first.lock().unwrap(), false);
            if wait {
                self.gate.notified().await;
            }
            StraightRouter.route(start, end).await
        }
    }

    const A: Coordinates = Coordinates { lat: 10.0, lon: 106.0 };
    const B: Coordinates = Coordinates { lat: 10.1, lon: 106.1 };
    const C: Coordinates = Coordinates { lat: 10.2, lon: 106.2 };

    #[tokio::test]
    async fn draws_and_clears() {
        let map = Arc::new(MapScene::new());
        let overlay = RouteOverlay::new(Arc::new(StraightRouter), map.clone());

        let line = overlay.show(A, B).await.unwrap();
        assert_eq!(line.style, LineStyle::Solid);
        assert_eq!(map.snapshot().route, Some(line));

        overlay.clear();
        assert_eq!(map.snapshot().route, None);
    }

    #[tokio::test]
    async fn failed_routing_draws_dashed_line() {
        let map = Arc::new(MapScene::new());
        let overlay = RouteOverlay::new(Arc::new(BrokenRouter), map.clone());

        let line = overlay.show(A, C).await.unwrap();
        assert_eq!(line.style, LineStyle::Dashed);
        assert_eq!(line.path, vec![A, C]);
    }

    #[tokio::test]
    async fn older_route_does_not_replace_newer() {
        let map = Arc::new(MapScene::new());
        let router = Arc::new(GatedRouter {
            gate: Notify::new(),
            first: Mutex::new(true),
        });
        let overlay = Arc::new(RouteOverlay::new(router.clone(), map.clone()));

        let slow = {
            let overlay = overlay.clone();
            tokio::spawn(async move { overlay.show(A, B).await })
        };
        tokio::task::yield_now().await;
        while *router.first.lock().unwrap() {
            tokio::task::yield_now().await;
        }

        let fresh = overlay.show(A, C).await.unwrap();
        router.gate.notify_one();
        assert_eq!(slow.await.unwrap(), None);
        assert_eq!(map.snapshot().route, Some(fresh));
    }
}
