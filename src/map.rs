use std::fmt::Write as _;
use std::sync::Mutex;

use crate::services::{Coordinates, Place};

pub const INITIAL_ZOOM: u8 = 15;
pub const MIN_FLY_ZOOM: u8 = 13;
/// Longest place name shown before it is cut with an ellipsis.
pub const MAX_NAME_CHARS: usize = 80;
/// Rendered text stays under the chat message limit, with room for a status line.
pub const MAX_RENDER_CHARS: usize = 1900;

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Solid,
    /// Straight stand-in when the routing engine has nothing for the pair.
    Dashed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteLine {
    pub path: Vec<Coordinates>,
    pub style: LineStyle,
    pub distance_m: Option<f64>,
    pub duration_s: Option<f64>,
}

/// Where search state becomes visible: basemap, markers and the route line.
pub trait MapSurface: Send + Sync {
    fn fly_to(&self, center: Coordinates);
    fn show_search_marker(&self, center: Coordinates);
    fn show_places(&self, places: &[Place]);
    fn remove_route(&self);
    fn draw_route(&self, line: &RouteLine);
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneSnapshot {
    pub center: Option<Coordinates>,
    pub zoom: u8,
    pub search_marker: Option<Coordinates>,
    pub places: Vec<Place>,
    pub route: Option<RouteLine>,
}

impl Default for SceneSnapshot {
    fn default() -> Self {
        SceneSnapshot {
            center: None,
            zoom: INITIAL_ZOOM,
            search_marker: None,
            places: Vec::new(),
            route: None,
        }
    }
}

/// In-memory map that renders to chat text.
#[derive(Default)]
pub struct MapScene {
    scene: Mutex<SceneSnapshot>,
}

impl MapScene {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_scene<T>(&self, f: impl FnOnce(&mut SceneSnapshot) -> T) -> T {
        let mut scene = self.scene.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut scene)
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        self.with_scene(|scene| scene.clone())
    }

    pub fn render(&self) -> String {
        let scene = self.snapshot();
        let mut out = String::new();

        match scene.search_marker.or(scene.center) {
            Some(center) => {
                let _ = writeln!(out, "📍 Search location {} <{}>", center, center.osm_link(scene.zoom));
            }
            None => out.push_str("📍 Locating…\n"),
        }

        if scene.places.is_empty() {
            out.push_str("No places found nearby.\n");
        }
        for (n, place) in scene.places.iter().enumerate() {
            let _ = writeln!(
                out,
                "📌 {}. **{}** <{}>",
                n + 1,
                shorten(&place.name, MAX_NAME_CHARS),
                place.location.osm_link(scene.zoom)
            );
        }

        if let Some(route) = &scene.route {
            match (route.style, route.distance_m, route.duration_s) {
                (LineStyle::Solid, Some(distance), Some(duration)) => {
                    let _ = write!(
                        out,
                        "🧭 Route: {:.1} km, about {} min",
                        distance / 1000.0,
                        (duration / 60.0).round() as u64
                    );
                }
                _ => out.push_str("🧭 Route unavailable, showing straight line"),
            }
            if let (Some(start), Some(end)) = (route.path.first(), route.path.last()) {
                let _ = write!(
                    out,
                    " <https://www.openstreetmap.org/directions?route={:.5}%2C{:.5}%3B{:.5}%2C{:.5}>",
                    start.lat, start.lon, end.lat, end.lon
                );
            }
            out.push('\n');
        }

        if out.chars().count() > MAX_RENDER_CHARS {
            out = shorten(&out, MAX_RENDER_CHARS);
        }
        out
    }
}

impl MapSurface for MapScene {
    fn fly_to(&self, center: Coordinates) {
        self.with_scene(|scene| {
            scene.center = Some(center);
            scene.zoom = scene.zoom.max(MIN_FLY_ZOOM);
        });
    }

    fn show_search_marker(&self, center: Coordinates) {
        self.with_scene(|scene| scene.search_marker = Some(center));
    }

    fn show_places(&self, places: &[Place]) {
        self.with_scene(|scene| scene.places = places.to_vec());
    }

    fn remove_route(&self) {
        self.with_scene(|scene| scene.route = None);
    }

    fn draw_route(&self, line: &RouteLine) {
        self.with_scene(|scene| scene.route = Some(line.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ElementKind, PlaceId};

    #[test]
    fn renders_markers_and_route() {
        let map = MapScene::new();
        let center = Coordinates { lat: 10.7769, lon: 106.7009 };
        let target = Coordinates { lat: 10.78, lon: 106.70 };
        map.fly_to(center);
        map.show_search_marker(center);
        map.show_places(&[Place {
            id: PlaceId {
                kind: ElementKind::Node,
                id: 9,
            },
            location: target,
            name: "Cộng Cà Phê".into(),
        }]);
        map.draw_route(&RouteLine {
            path: vec![center, target],
            style: LineStyle::Solid,
            distance_m: Some(1500.0),
            duration_s: Some(300.0),
        });

        let text = map.render();
        assert!(text.contains("📌 1. **Cộng Cà Phê**"));
        assert!(text.contains("🧭 Route: 1.5 km, about 5 min"));
        assert_eq!(map.snapshot().zoom, INITIAL_ZOOM);

        map.remove_route();
        assert!(!map.render().contains("🧭"));
    }

    #[test]
    fn empty_scene() {
        let text = MapScene::new().render();
        assert!(text.contains("Locating"));
        assert!(text.contains("No places found nearby."));
    }

    #[test]
    fn long_names_stay_under_message_limit() {
        let map = MapScene::new();
        let center = Coordinates { lat: 10.7769, lon: 106.7009 };
        map.fly_to(center);
        map.show_search_marker(center);
        let places: Vec<Place> = (0..5)
            .map(|id| Place {
                id: PlaceId {
                    kind: ElementKind::Way,
                    id,
                },
                location: Coordinates { lat: 10.78, lon: 106.70 },
                name: "Nhà hàng ".repeat(60),
            })
            .collect();
        map.show_places(&places);
        map.draw_route(&RouteLine {
            path: vec![center, places[0].location],
            style: LineStyle::Dashed,
            distance_m: None,
            duration_s: None,
        });

        let text = map.render();
        assert!(text.chars().count() <= MAX_RENDER_CHARS);
        assert!(text.contains("📌 5. **Nhà hàng"));
        assert!(text.contains("…**"));
        assert!(text.contains("🧭 Route unavailable"));

        assert_eq!(shorten("phở", MAX_NAME_CHARS), "phở");
        assert_eq!(shorten(&"x".repeat(2000), MAX_RENDER_CHARS).chars().count(), MAX_RENDER_CHARS);
    }
}
