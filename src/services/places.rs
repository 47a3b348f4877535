use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::*;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::Deserialize;

use super::{Coordinates, ElementKind, Place, PlaceId, VIETNAM};
use crate::config::{CategoryTag, SearchConfig};
use crate::{GenericError, NearbyError};

/// Upper bound on the result list handed to the map.
pub const MAX_RESULTS: usize = 5;

#[async_trait]
pub trait PlaceSearchService: Send + Sync {
    /// Returns at most [`MAX_RESULTS`] named places around `center`.
    /// An empty keyword searches the configured categories instead of names.
    async fn search(&self, center: Coordinates, keyword: &str) -> Result<Vec<Place>, GenericError>;
}

pub struct OverpassService {
    client: reqwest::Client,
    config: SearchConfig,
    rng: Mutex<StdRng>,
}

impl OverpassService {
    pub fn new(config: SearchConfig) -> Result<Self, GenericError> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: SearchConfig, rng: StdRng) -> Result<Self, GenericError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(OverpassService {
            client,
            config,
            rng: Mutex::new(rng),
        })
    }
}

#[async_trait]
impl PlaceSearchService for OverpassService {
    async fn search(&self, center: Coordinates, keyword: &str) -> Result<Vec<Place>, GenericError> {
        let query = build_query(&self.config, center, keyword);
        debug!("Overpass query around {}: {}", center, query);

        let response = self
            .client
            .post(&self.config.overpass_url)
            .body(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NearbyError::RemoteStatus {
                service: "Overpass",
                status: status.as_u16(),
            }
            .into());
        }

        let body = response.text().await?;
        let candidates = parse_elements(&body);
        trace!("Overpass returned {} usable candidates.", candidates.len());

        let places = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            sample_places(candidates, &mut *rng)
        };
        Ok(places)
    }
}

/// Makes a keyword safe to embed in a quoted, case-insensitive name regex.
/// Regex metacharacters are escaped first, then the result is escaped for the
/// query language's string literal.
pub fn sanitize_keyword(keyword: &str) -> String {
    let collapsed = keyword
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut pattern = String::with_capacity(collapsed.len());
    for ch in collapsed.trim().chars() {
        if matches!(
            ch,
            '\\' | '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|'
        ) {
            pattern.push('\\');
        }
        pattern.push(ch);
    }

    let mut literal = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '\\' => literal.push_str("\\\\"),
            '"' => literal.push_str("\\\""),
            _ => literal.push(ch),
        }
    }
    literal
}

pub fn build_query(config: &SearchConfig, center: Coordinates, keyword: &str) -> String {
    let around = format!(
        "(around:{},{},{})",
        config.radius_m, center.lat, center.lon
    );
    let sanitized = sanitize_keyword(keyword);

    let mut query = format!("[out:json][timeout:25][bbox:{}];\n(\n", VIETNAM.to_overpass());
    if sanitized.is_empty() {
        for CategoryTag { key, value } in &config.categories {
            for element in ["node", "way"] {
                let _ = writeln!(query, "  {}[\"{}\"=\"{}\"]{};", element, key, value, around);
            }
        }
    } else {
        for element in ["node", "way", "relation"] {
            let _ = writeln!(query, "  {}[\"name\"~\"{}\",i]{};", element, sanitized, around);
        }
    }
    let _ = write!(query, ");\nout center {};", config.candidate_limit);
    query
}

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn into_place(self) -> Option<Place> {
        let kind = match self.kind.as_str() {
            "node" => ElementKind::Node,
            "way" => ElementKind::Way,
            "relation" => ElementKind::Relation,
            _ => return None,
        };
        let location = match (self.lat, self.lon, &self.center) {
            (Some(lat), Some(lon), _) => Coordinates::new(lat, lon).ok()?,
            (_, _, Some(center)) => Coordinates::new(center.lat, center.lon).ok()?,
            _ => return None,
        };
        let name = self.tags.get("name")?.trim();
        if name.is_empty() {
            return None;
        }
        Some(Place {
            id: PlaceId { kind, id: self.id },
            location,
            name: name.to_string(),
        })
    }
}

/// Keeps elements that carry a name and a resolvable position.
/// A malformed or empty payload yields no candidates.
pub fn parse_elements(body: &str) -> Vec<Place> {
    match serde_json::from_str::<OverpassResponse>(body) {
        Ok(response) => response
            .elements
            .into_iter()
            .filter_map(OverpassElement::into_place)
            .collect(),
        Err(why) => {
            warn!("Discarding malformed Overpass payload: {}", why);
            Vec::new()
        }
    }
}

/// Unbiased Fisher-Yates shuffle followed by a prefix of [`MAX_RESULTS`].
pub fn sample_places<R: Rng + ?Sized>(mut candidates: Vec<Place>, rng: &mut R) -> Vec<Place> {
    candidates.shuffle(rng);
    candidates.truncate(MAX_RESULTS);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: i64) -> Place {
        Place {
            id: PlaceId {
                kind: ElementKind::Node,
                id,
            },
            location: Coordinates { lat: 10.0, lon: 106.0 },
            name: format!("Place {}", id),
        }
    }

    #[test]
    fn empty_keyword_searches_categories() {
        let center = Coordinates { lat: 10.7769, lon: 106.7009 };
        let query = build_query(&SearchConfig::default(), center, "");

        assert!(query.starts_with("[out:json][timeout:25][bbox:8.5,102.0,23.5,109.5];"));
        assert!(query.contains("node[\"amenity\"=\"restaurant\"](around:3000,10.7769,106.7009);"));
        assert!(query.contains("way[\"shop\"=\"bakery\"](around:3000,10.7769,106.7009);"));
        assert!(query.contains("node[\"amenity\"=\"bar\"]"));
        assert!(!query.contains("\"name\"~"));
        assert!(query.ends_with("out center 100;"));
    }

    #[test]
    fn keyword_searches_names_case_insensitively() {
        let center = Coordinates { lat: 10.0, lon: 106.0 };
        let query = build_query(&SearchConfig::default(), center, "  phở ");

        for element in ["node", "way", "relation"] {
            assert!(query.contains(&format!(
                "{}[\"name\"~\"phở\",i](around:3000,10,106);",
                element
            )));
        }
        assert!(!query.contains("amenity"));
    }

    #[test]
    fn quotes_are_escaped_in_query_body() {
        let center = Coordinates { lat: 10.0, lon: 106.0 };
        let query = build_query(&SearchConfig::default(), center, "Joe's \"Best\" Café");
        assert!(query.contains(r#"["name"~"Joe's \"Best\" Café",i]"#));
    }

    #[test]
    fn sanitizing_escapes_regex_and_collapses_newlines() {
        assert_eq!(sanitize_keyword("bún\nbò\r\n  huế "), "bún bò huế");
        // `.` becomes `\.` in the regex, then `\\.` inside the string literal.
        assert_eq!(sanitize_keyword("a.b"), r"a\\.b");
        assert_eq!(sanitize_keyword("(x)"), r"\\(x\\)");
        assert_eq!(sanitize_keyword("\\"), r"\\\\");
        assert_eq!(sanitize_keyword(" \n "), "");
    }

    #[test]
    fn parse_keeps_named_elements_with_positions() {
        let body = r#"{
            "elements": [
                {"type": "node", "id": 1, "lat": 10.1, "lon": 106.1, "tags": {"name": "Phở Hòa"}},
                {"type": "way", "id": 2, "center": {"lat": 10.2, "lon": 106.2}, "tags": {"name": "Chợ Bến Thành"}},
                {"type": "node", "id": 3, "lat": 10.3, "lon": 106.3, "tags": {"amenity": "cafe"}},
                {"type": "node", "id": 4, "lat": 10.4, "lon": 106.4, "tags": {"name": "   "}},
                {"type": "relation", "id": 5, "tags": {"name": "Nowhere"}},
                {"type": "node", "id": 6, "lat": 10.6, "lon": 106.6}
            ]
        }"#;
        let places = parse_elements(body);

        assert_eq!(places.len(), 2);
        assert_eq!(places[0].name, "Phở Hòa");
        assert_eq!(places[1].id.to_string(), "way/2");
        assert_eq!(places[1].location, Coordinates { lat: 10.2, lon: 106.2 });
    }

    #[test]
    fn malformed_payload_is_no_results() {
        assert!(parse_elements("<html>busy</html>").is_empty());
        assert!(parse_elements("{}").is_empty());
    }

    #[test]
    fn sampling_never_exceeds_limit() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(sample_places((0..40).map(place).collect(), &mut rng).len(), 5);
        assert_eq!(sample_places((0..3).map(place).collect(), &mut rng).len(), 3);
        assert!(sample_places(Vec::new(), &mut rng).is_empty());
    }

    #[test]
    fn sampling_is_uniform_across_seeds() {
        const CANDIDATES: i64 = 10;
        const SEEDS: u64 = 10_000;
        let mut hits = [0u32; CANDIDATES as usize];

        for seed in 0..SEEDS {
            let mut rng = StdRng::seed_from_u64(seed);
            for p in sample_places((0..CANDIDATES).map(place).collect(), &mut rng) {
                hits[p.id.id as usize] += 1;
            }
        }

        // Each candidate lands in the prefix with probability 5/10.
        let expected = SEEDS as f64 * MAX_RESULTS as f64 / CANDIDATES as f64;
        for (candidate, count) in hits.iter().enumerate() {
            let deviation = (*count as f64 - expected).abs() / expected;
            assert!(
                deviation < 0.05,
                "candidate {} picked {} times, expected about {}",
                candidate,
                count,
                expected
            );
        }
    }
}
