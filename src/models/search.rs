use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::container::{normalize_type_code, Container, ContainerCondition};
use crate::search::distance::Coordinate;
use crate::search::paginate::parse_page;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Type code ascending.
    #[default]
    Type,
    PriceAsc,
    PriceDesc,
    Newest,
}

impl SortKey {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "price_asc" | "price_low" | "price" => SortKey::PriceAsc,
            "price_desc" | "price_high" => SortKey::PriceDesc,
            "newest" | "new" => SortKey::Newest,
            _ => SortKey::Type,
        }
    }
}

/// One search request. Absent fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub types: Vec<String>,
    pub conditions: Vec<ContainerCondition>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub origin: Option<Coordinate>,
    /// Free-text place geocoded into an origin when `origin` is absent.
    pub location: Option<String>,
    pub radius_miles: Option<f64>,
    pub sort: SortKey,
    pub page: u32,
}

/// Raw query-string parameters of `GET /search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub container_type: Option<String>,
    pub condition: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub location: Option<String>,
    pub radius: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(value: Option<&str>) -> impl Iterator<Item = &str> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

impl SearchQuery {
    /// Builds a query from request parameters. Unparseable values are dropped
    /// rather than rejected.
    pub fn from_params(params: SearchParams) -> Self {
        let types = split_list(params.container_type.as_deref())
            .map(normalize_type_code)
            .collect();

        let conditions = split_list(params.condition.as_deref())
            .filter_map(|c| match c.parse::<ContainerCondition>() {
                Ok(condition) => Some(condition),
                Err(e) => {
                    tracing::debug!("Ignoring condition filter: {}", e);
                    None
                }
            })
            .collect();

        let price = |value: Option<String>| {
            non_empty(value)
                .and_then(|v| Decimal::from_str(&v).ok())
                .filter(|d| !d.is_sign_negative())
        };
        let float = |value: Option<String>| non_empty(value).and_then(|v| v.parse::<f64>().ok());

        let origin = match (float(params.lat), float(params.lng)) {
            (Some(lat), Some(lng)) => Coordinate::checked(lat, lng),
            _ => None,
        };

        SearchQuery {
            text: non_empty(params.q),
            types,
            conditions,
            min_price: price(params.min_price),
            max_price: price(params.max_price),
            city: non_empty(params.city),
            postal_code: non_empty(params.postal_code),
            origin,
            location: non_empty(params.location),
            radius_miles: float(params.radius).filter(|r| r.is_finite() && *r > 0.0),
            sort: params
                .sort
                .as_deref()
                .map(SortKey::parse)
                .unwrap_or_default(),
            page: parse_page(params.page.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    #[serde(flatten)]
    pub container: Container,
    pub distance_miles: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub containers: Vec<SearchHit>,
    pub total_results: u64,
    pub total_pages: u32,
    pub current_page: u32,
    /// Set when the radius was widened to the fallback radius.
    pub using_fallback: bool,
    pub distance_applied: bool,
    pub effective_radius_miles: Option<f64>,
    pub origin: Option<Coordinate>,
}

impl SearchResult {
    pub fn empty(page: u32) -> Self {
        Self {
            containers: Vec::new(),
            total_results: 0,
            total_pages: 0,
            current_page: page.max(1),
            using_fallback: false,
            distance_applied: false,
            effective_radius_miles: None,
            origin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SearchParams {
        SearchParams::default()
    }

    #[test]
    fn empty_params_give_empty_query_on_page_one() {
        let query = SearchQuery::from_params(params());
        assert_eq!(
            query,
            SearchQuery {
                page: 1,
                ..SearchQuery::default()
            }
        );
    }

    #[test]
    fn sets_are_comma_separated_and_normalized() {
        let query = SearchQuery::from_params(SearchParams {
            container_type: Some("40hc, 20DV,,".into()),
            condition: Some("Brand New,cw,bogus".into()),
            ..params()
        });
        assert_eq!(query.types, vec!["40HC", "20DV"]);
        assert_eq!(
            query.conditions,
            vec![ContainerCondition::BrandNew, ContainerCondition::CargoWorthy]
        );
    }

    #[test]
    fn invalid_numbers_are_ignored() {
        let query = SearchQuery::from_params(SearchParams {
            max_price: Some("cheap".into()),
            min_price: Some("-5".into()),
            lat: Some("32.7767".into()),
            lng: Some("west".into()),
            radius: Some("-10".into()),
            page: Some("zero".into()),
            ..params()
        });
        assert_eq!(query.max_price, None);
        assert_eq!(query.min_price, None);
        assert_eq!(query.origin, None);
        assert_eq!(query.radius_miles, None);
        assert_eq!(query.page, 1);
    }

    #[test]
    fn origin_and_price_parse() {
        let query = SearchQuery::from_params(SearchParams {
            max_price: Some("6500".into()),
            lat: Some("32.7767".into()),
            lng: Some("-96.7970".into()),
            radius: Some("100".into()),
            sort: Some("price-desc".into()),
            page: Some("3".into()),
            ..params()
        });
        assert_eq!(query.max_price, Some(Decimal::new(6500, 0)));
        assert_eq!(query.origin, Some(Coordinate::new(32.7767, -96.7970)));
        assert_eq!(query.radius_miles, Some(100.0));
        assert_eq!(query.sort, SortKey::PriceDesc);
        assert_eq!(query.page, 3);
    }

    #[test]
    fn unknown_sort_falls_back_to_type() {
        assert_eq!(SortKey::parse("relevance"), SortKey::Type);
        assert_eq!(SortKey::parse("newest"), SortKey::Newest);
    }
}
