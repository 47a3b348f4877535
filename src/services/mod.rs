use derive_more::Display;
use serde::Serialize;

use crate::NearbyError;

pub mod auth;
pub mod geocoding;
pub mod geolocation;
pub mod places;
pub mod routing;
pub mod translation;
pub mod weather;

/// Center used when the device position cannot be obtained (Ho Chi Minh City).
pub const DEFAULT_CENTER: Coordinates = Coordinates {
    lat: 10.7769,
    lon: 106.7009,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Display)]
#[display(fmt = "{:.5}, {:.5}", lat, lon)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, NearbyError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(NearbyError::InvalidCoordinate(lat, lon));
        }
        Ok(Coordinates { lat, lon })
    }

    pub fn osm_link(&self, zoom: u8) -> String {
        format!(
            "https://www.openstreetmap.org/?mlat={lat:.5}&mlon={lon:.5}#map={zoom}/{lat:.5}/{lon:.5}",
            lat = self.lat,
            lon = self.lon,
        )
    }
}

/// Rectangular geographic filter applied to every remote lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

pub const VIETNAM: BoundingBox = BoundingBox {
    south: 8.5,
    west: 102.0,
    north: 23.5,
    east: 109.5,
};

impl BoundingBox {
    pub fn contains(&self, point: Coordinates) -> bool {
        (self.south..=self.north).contains(&point.lat) && (self.west..=self.east).contains(&point.lon)
    }

    /// `south,west,north,east`, the order the POI query language expects.
    pub fn to_overpass(&self) -> String {
        format!(
            "{:.1},{:.1},{:.1},{:.1}",
            self.south, self.west, self.north, self.east
        )
    }

    /// `west,south,east,north`, the order the geocoder's viewbox expects.
    pub fn to_viewbox(&self) -> String {
        format!(
            "{:.1},{:.1},{:.1},{:.1}",
            self.west, self.south, self.east, self.north
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum ElementKind {
    #[display(fmt = "node")]
    Node,
    #[display(fmt = "way")]
    Way,
    #[display(fmt = "relation")]
    Relation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[display(fmt = "{}/{}", kind, id)]
pub struct PlaceId {
    pub kind: ElementKind,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub id: PlaceId,
    pub location: Coordinates,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(Coordinates::new(91.0, 0.0).is_err());
        assert!(Coordinates::new(0.0, -180.5).is_err());
        assert!(Coordinates::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn bounding_box_orders() {
        assert_eq!(VIETNAM.to_overpass(), "8.5,102.0,23.5,109.5");
        assert_eq!(VIETNAM.to_viewbox(), "102.0,8.5,109.5,23.5");
        assert!(VIETNAM.contains(DEFAULT_CENTER));
        assert!(!VIETNAM.contains(Coordinates { lat: 51.5, lon: -0.12 }));
    }

    #[test]
    fn place_id_display() {
        let id = PlaceId {
            kind: ElementKind::Way,
            id: 42,
        };
        assert_eq!(id.to_string(), "way/42");
        assert_eq!(DEFAULT_CENTER.to_string(), "10.77690, 106.70090");
    }
}
