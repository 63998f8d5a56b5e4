//! Great-circle distance and the radius policy for proximity search.

use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;

/// Mean Earth radius in statute miles.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `None` unless latitude is in [-90, 90] and longitude in [-180, 180].
    pub fn checked(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        valid.then(|| Self::new(latitude, longitude))
    }
}

/// Anything with a position that can be ranked by distance.
pub trait Located {
    fn coordinate(&self) -> Coordinate;
}

pub fn haversine_miles(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_MILES * c
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusPolicy {
    pub default_radius_miles: f64,
    pub hard_limit_miles: f64,
    pub fallback_radius_miles: f64,
}

impl Default for RadiusPolicy {
    fn default() -> Self {
        RadiusPolicy::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for RadiusPolicy {
    fn from(config: &SearchConfig) -> Self {
        Self {
            default_radius_miles: config.default_radius_miles,
            hard_limit_miles: config.hard_limit_miles,
            fallback_radius_miles: config.fallback_radius_miles,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking<T> {
    /// Candidates within `effective_radius_miles`, nearest first.
    pub hits: Vec<(T, f64)>,
    pub effective_radius_miles: f64,
    pub using_fallback: bool,
}

/// Pairs every candidate with its distance from `origin`, nearest first.
/// The sort is stable, so equal distances keep their incoming order.
fn measure<T: Located>(candidates: Vec<T>, origin: Coordinate) -> Vec<(T, f64)> {
    let mut measured: Vec<(T, f64)> = candidates
        .into_iter()
        .map(|candidate| {
            let distance = haversine_miles(origin, candidate.coordinate());
            (candidate, distance)
        })
        .collect();
    measured.sort_by(|a, b| a.1.total_cmp(&b.1));
    measured
}

/// Strict radius filter with no widening.
pub fn within_radius<T: Located>(
    candidates: Vec<T>,
    origin: Coordinate,
    radius_miles: f64,
) -> Vec<(T, f64)> {
    let mut measured = measure(candidates, origin);
    measured.retain(|(_, d)| *d <= radius_miles);
    measured
}

/// Restricts `candidates` to a radius around `origin` and orders them by distance.
///
/// The requested radius is tried first. A missing radius means the policy's
/// default. A radius above the hard limit but below the fallback radius is
/// widened to the fallback outright, and a radius that matches nothing is
/// widened the same way. A radius at or beyond the fallback is used as given.
/// Equal distances keep their incoming order.
pub fn rank_by_distance<T: Located>(
    candidates: Vec<T>,
    origin: Coordinate,
    requested_radius_miles: Option<f64>,
    policy: &RadiusPolicy,
) -> Ranking<T> {
    let requested = requested_radius_miles
        .filter(|r| r.is_finite() && *r > 0.0)
        .unwrap_or(policy.default_radius_miles);

    let mut measured = measure(candidates, origin);

    let (effective, using_fallback) = if requested >= policy.fallback_radius_miles {
        (requested, false)
    } else if requested > policy.hard_limit_miles {
        (policy.fallback_radius_miles, true)
    } else if measured.first().map_or(true, |(_, d)| *d > requested) {
        (policy.fallback_radius_miles, true)
    } else {
        (requested, false)
    };

    if using_fallback {
        tracing::debug!(
            "Radius {} mi widened to fallback radius {} mi",
            requested,
            effective
        );
    }

    measured.retain(|(_, d)| *d <= effective);

    Ranking {
        hits: measured,
        effective_radius_miles: effective,
        using_fallback,
    }
}
