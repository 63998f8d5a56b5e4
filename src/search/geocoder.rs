//! Offline geocoding for search origins.
//!
//! Known postal codes resolve from a static table. Anything else with digits
//! in it gets a deterministic approximation around the continental US
//! centre, which is repeatable but not geographically meaningful.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use super::distance::Coordinate;

const CONTINENTAL_CENTER: Coordinate = Coordinate::new(39.8283, -98.5795);
const LATITUDE_SPREAD_DEGREES: f64 = 20.0;
const LONGITUDE_SPREAD_DEGREES: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeResult {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    /// True when derived from the numeric fallback rather than the table.
    pub approximate: bool,
}

impl GeocodeResult {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

struct KnownPlace {
    postal_code: &'static str,
    latitude: f64,
    longitude: f64,
    city: &'static str,
    state: &'static str,
}

const KNOWN_PLACES: &[KnownPlace] = &[
    KnownPlace { postal_code: "30301", latitude: 33.7490, longitude: -84.3880, city: "Atlanta", state: "GA" },
    KnownPlace { postal_code: "75201", latitude: 32.7767, longitude: -96.7970, city: "Dallas", state: "TX" },
    KnownPlace { postal_code: "80202", latitude: 39.7392, longitude: -104.9903, city: "Denver", state: "CO" },
    KnownPlace { postal_code: "77001", latitude: 29.7604, longitude: -95.3698, city: "Houston", state: "TX" },
    KnownPlace { postal_code: "90001", latitude: 33.9731, longitude: -118.2479, city: "Los Angeles", state: "CA" },
    KnownPlace { postal_code: "90802", latitude: 33.7701, longitude: -118.1937, city: "Long Beach", state: "CA" },
    KnownPlace { postal_code: "94601", latitude: 37.7799, longitude: -122.2229, city: "Oakland", state: "CA" },
    KnownPlace { postal_code: "60601", latitude: 41.8858, longitude: -87.6181, city: "Chicago", state: "IL" },
    KnownPlace { postal_code: "10001", latitude: 40.7506, longitude: -73.9972, city: "New York", state: "NY" },
    KnownPlace { postal_code: "07114", latitude: 40.7090, longitude: -74.1740, city: "Newark", state: "NJ" },
    KnownPlace { postal_code: "31401", latitude: 32.0809, longitude: -81.0912, city: "Savannah", state: "GA" },
    KnownPlace { postal_code: "29401", latitude: 32.7765, longitude: -79.9311, city: "Charleston", state: "SC" },
    KnownPlace { postal_code: "23501", latitude: 36.8508, longitude: -76.2859, city: "Norfolk", state: "VA" },
    KnownPlace { postal_code: "33101", latitude: 25.7743, longitude: -80.1937, city: "Miami", state: "FL" },
    KnownPlace { postal_code: "32202", latitude: 30.3322, longitude: -81.6557, city: "Jacksonville", state: "FL" },
    KnownPlace { postal_code: "70112", latitude: 29.9560, longitude: -90.0750, city: "New Orleans", state: "LA" },
    KnownPlace { postal_code: "38101", latitude: 35.1495, longitude: -90.0490, city: "Memphis", state: "TN" },
    KnownPlace { postal_code: "64101", latitude: 39.1020, longitude: -94.6020, city: "Kansas City", state: "MO" },
    KnownPlace { postal_code: "55401", latitude: 44.9778, longitude: -93.2650, city: "Minneapolis", state: "MN" },
    KnownPlace { postal_code: "44101", latitude: 41.4993, longitude: -81.6944, city: "Cleveland", state: "OH" },
    KnownPlace { postal_code: "85001", latitude: 33.4484, longitude: -112.0740, city: "Phoenix", state: "AZ" },
    KnownPlace { postal_code: "84101", latitude: 40.7608, longitude: -111.8910, city: "Salt Lake City", state: "UT" },
    KnownPlace { postal_code: "98101", latitude: 47.6101, longitude: -122.3344, city: "Seattle", state: "WA" },
    KnownPlace { postal_code: "97201", latitude: 45.5152, longitude: -122.6784, city: "Portland", state: "OR" },
];

static BY_POSTAL_CODE: Lazy<HashMap<&'static str, &'static KnownPlace>> =
    Lazy::new(|| KNOWN_PLACES.iter().map(|p| (p.postal_code, p)).collect());

static BY_CITY: Lazy<HashMap<String, &'static KnownPlace>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for place in KNOWN_PLACES {
        map.entry(place.city.to_ascii_lowercase()).or_insert(place);
    }
    map
});

static ZIP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{5})(?:-\d{4})?\b").expect("valid ZIP pattern"));

impl From<&KnownPlace> for GeocodeResult {
    fn from(place: &KnownPlace) -> Self {
        GeocodeResult {
            latitude: place.latitude,
            longitude: place.longitude,
            city: Some(place.city.to_string()),
            state: Some(place.state.to_string()),
            country: Some("USA".to_string()),
            approximate: false,
        }
    }
}

/// Resolves a postal code. `None` only when the code has no digits at all.
pub fn geocode_postal_code(code: &str) -> Option<GeocodeResult> {
    let code = code.trim();
    let zip5 = code.split('-').next().unwrap_or(code);

    if let Some(place) = BY_POSTAL_CODE.get(zip5) {
        return Some(GeocodeResult::from(*place));
    }

    approximate(zip5)
}

/// Resolves free text: an embedded ZIP first, then a known city name
/// optionally followed by a state, e.g. `Dallas, TX`.
pub fn geocode_location(text: &str) -> Option<GeocodeResult> {
    if let Some(captures) = ZIP_PATTERN.captures(text) {
        return geocode_postal_code(&captures[1]);
    }

    let mut parts = text.split(',').map(str::trim);
    let city = parts.next()?.to_ascii_lowercase();
    let state = parts.next().filter(|s| !s.is_empty());

    let place = BY_CITY.get(&city)?;
    match state {
        Some(state) if !state.eq_ignore_ascii_case(place.state) => None,
        _ => Some(GeocodeResult::from(*place)),
    }
}

fn approximate(code: &str) -> Option<GeocodeResult> {
    let digits: String = code.chars().filter(|c| c.is_ascii_digit()).take(9).collect();
    let n: u64 = digits.parse().ok()?;

    let lat_fraction = (n % 1000) as f64 / 1000.0;
    let lng_fraction = ((n / 1000) % 1000) as f64 / 1000.0;

    Some(GeocodeResult {
        latitude: CONTINENTAL_CENTER.latitude + (lat_fraction - 0.5) * LATITUDE_SPREAD_DEGREES,
        longitude: CONTINENTAL_CENTER.longitude + (lng_fraction - 0.5) * LONGITUDE_SPREAD_DEGREES,
        city: None,
        state: None,
        country: Some("USA".to_string()),
        approximate: true,
    })
}
