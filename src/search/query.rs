//! Conjunctive container filters.
//!
//! A [`ContainerFilter`] has two equivalent forms: [`ContainerFilter::matches`]
//! for in-memory checks and [`ContainerFilter::to_sql`] for the catalog query.

use rust_decimal::Decimal;

use crate::db::{Dialect, SqlParam};
use crate::error::AppResult;
use crate::models::{to_cents, Container, ContainerCondition, SearchQuery, SortKey};

/// Filter dimensions combine with AND; alternatives inside one dimension with OR.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerFilter {
    pub text: Option<String>,
    pub types: Vec<String>,
    pub conditions: Vec<ContainerCondition>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl From<&SearchQuery> for ContainerFilter {
    fn from(query: &SearchQuery) -> Self {
        ContainerFilter {
            text: query.text.clone(),
            types: query.types.clone(),
            conditions: query.conditions.clone(),
            city: query.city.clone(),
            postal_code: query.postal_code.clone(),
            min_price: query.min_price,
            max_price: query.max_price,
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Lowercased `%needle%` with `\`, `%` and `_` escaped for `LIKE ... ESCAPE '\'`.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl ContainerFilter {
    pub fn is_empty(&self) -> bool {
        *self == ContainerFilter::default()
    }

    pub fn matches(&self, container: &Container) -> bool {
        if let Some(text) = &self.text {
            let hit = contains_ignore_case(&container.container_type, text)
                || contains_ignore_case(container.condition.label(), text)
                || contains_ignore_case(&container.depot_name, text);
            if !hit {
                return false;
            }
        }
        if !self.types.is_empty() && !self.types.contains(&container.container_type) {
            return false;
        }
        if !self.conditions.is_empty() && !self.conditions.contains(&container.condition) {
            return false;
        }
        if let Some(city) = &self.city {
            if !contains_ignore_case(&container.city, city) {
                return false;
            }
        }
        if let Some(postal_code) = &self.postal_code {
            if container.postal_code.as_deref() != Some(postal_code.as_str()) {
                return false;
            }
        }
        if let Some(min) = self.min_price {
            if container.price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if container.price > max {
                return false;
            }
        }
        true
    }

    /// `WHERE` conditions over `containers c JOIN depots d`, numbered from
    /// placeholder 1. Returns an empty string when nothing is constrained.
    pub fn to_sql(&self, dialect: Dialect) -> AppResult<(String, Vec<SqlParam>)> {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();
        let next = |params: &mut Vec<SqlParam>, param: SqlParam| {
            params.push(param);
            dialect.placeholder(params.len())
        };

        if let Some(text) = &self.text {
            let pattern = like_pattern(text);
            let a = next(&mut params, SqlParam::Text(pattern.clone()));
            let b = next(&mut params, SqlParam::Text(pattern.clone()));
            let c = next(&mut params, SqlParam::Text(pattern));
            conditions.push(format!(
                "(LOWER(c.container_type) LIKE {} ESCAPE '\\' OR LOWER(c.condition) LIKE {} ESCAPE '\\' OR LOWER(d.name) LIKE {} ESCAPE '\\')",
                a, b, c
            ));
        }

        if !self.types.is_empty() {
            let placeholders: Vec<String> = self
                .types
                .iter()
                .map(|t| next(&mut params, SqlParam::Text(t.clone())))
                .collect();
            conditions.push(format!("c.container_type IN ({})", placeholders.join(", ")));
        }

        if !self.conditions.is_empty() {
            let placeholders: Vec<String> = self
                .conditions
                .iter()
                .map(|c| next(&mut params, SqlParam::Text(c.label().to_string())))
                .collect();
            conditions.push(format!("c.condition IN ({})", placeholders.join(", ")));
        }

        if let Some(city) = &self.city {
            let p = next(&mut params, SqlParam::Text(like_pattern(city)));
            conditions.push(format!("LOWER(d.city) LIKE {} ESCAPE '\\'", p));
        }

        if let Some(postal_code) = &self.postal_code {
            let p = next(&mut params, SqlParam::Text(postal_code.clone()));
            conditions.push(format!("d.postal_code = {}", p));
        }

        // A bound too large for cents either excludes every row or none.
        if let Some(min) = self.min_price {
            match to_cents(min) {
                Ok(cents) => {
                    let p = next(&mut params, SqlParam::Int(cents));
                    conditions.push(format!("c.price_cents >= {}", p));
                }
                Err(_) if min.is_sign_positive() => conditions.push("1 = 0".to_string()),
                Err(_) => {}
            }
        }

        if let Some(max) = self.max_price {
            match to_cents(max) {
                Ok(cents) => {
                    let p = next(&mut params, SqlParam::Int(cents));
                    conditions.push(format!("c.price_cents <= {}", p));
                }
                Err(_) if max.is_sign_negative() => conditions.push("1 = 0".to_string()),
                Err(_) => {}
            }
        }

        Ok((conditions.join(" AND "), params))
    }
}

/// `ORDER BY` terms for a sort key. SKU always breaks ties.
pub fn order_by_sql(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Type => "c.container_type ASC, c.sku ASC",
        SortKey::PriceAsc => "c.price_cents ASC, c.sku ASC",
        SortKey::PriceDesc => "c.price_cents DESC, c.sku ASC",
        SortKey::Newest => "c.created_at DESC, c.sku ASC",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    pub(crate) fn container(sku: &str, container_type: &str, condition: ContainerCondition, price: i64) -> Container {
        Container {
            sku: sku.to_string(),
            container_type: container_type.to_string(),
            condition,
            quantity: 1,
            price: Decimal::new(price, 0),
            depot_code: "ATL".to_string(),
            depot_name: "Atlanta Depot".to_string(),
            latitude: 33.749,
            longitude: -84.388,
            address: "1 Depot Way".to_string(),
            city: "Atlanta".to_string(),
            state: Some("GA".to_string()),
            postal_code: Some("30301".to_string()),
            country: "USA".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn every_sort_key_ends_with_sku() {
        for sort in [SortKey::Type, SortKey::PriceAsc, SortKey::PriceDesc, SortKey::Newest] {
            assert!(order_by_sql(sort).ends_with("c.sku ASC"));
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = ContainerFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&container("A", "20DV", ContainerCondition::AsIs, 1)));
        let (sql, params) = filter.to_sql(Dialect::Postgres).unwrap();
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn text_matches_type_condition_or_depot_name() {
        let c = container("A", "40HC", ContainerCondition::CargoWorthy, 1);
        for text in ["40hc", "cargo", "ATLANTA"] {
            let filter = ContainerFilter {
                text: Some(text.into()),
                ..Default::default()
            };
            assert!(filter.matches(&c), "{}", text);
        }
        let filter = ContainerFilter {
            text: Some("reefer".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&c));
    }

    #[test]
    fn dimensions_combine_with_and() {
        let filter = ContainerFilter {
            types: vec!["40HC".into()],
            conditions: vec![ContainerCondition::BrandNew],
            max_price: Some(Decimal::new(6500, 0)),
            ..Default::default()
        };
        assert!(filter.matches(&container("ATL-40HC-002", "40HC", ContainerCondition::BrandNew, 6000)));
        assert!(!filter.matches(&container("ATL-40HC-003", "40HC", ContainerCondition::BrandNew, 7000)));
        assert!(!filter.matches(&container("ATL-40HC-004", "40HC", ContainerCondition::Iicl, 6000)));
        assert!(!filter.matches(&container("ATL-20DV-001", "20DV", ContainerCondition::BrandNew, 3000)));
    }

    #[test]
    fn city_is_substring_and_postal_code_is_exact() {
        let c = container("A", "20DV", ContainerCondition::AsIs, 1);
        let city = ContainerFilter {
            city: Some("lant".into()),
            ..Default::default()
        };
        assert!(city.matches(&c));
        let partial_zip = ContainerFilter {
            postal_code: Some("3030".into()),
            ..Default::default()
        };
        assert!(!partial_zip.matches(&c));
    }

    #[test]
    fn sql_numbers_postgres_placeholders_in_order() {
        let filter = ContainerFilter {
            text: Some("HC".into()),
            types: vec!["40HC".into(), "45HC".into()],
            min_price: Some(Decimal::new(100, 0)),
            ..Default::default()
        };
        let (sql, params) = filter.to_sql(Dialect::Postgres).unwrap();
        assert!(sql.contains("LIKE $1 ESCAPE"));
        assert!(sql.contains("IN ($4, $5)"));
        assert!(sql.contains("c.price_cents >= $6"));
        assert_eq!(params.len(), 6);
        assert_eq!(params[0], SqlParam::Text("%hc%".into()));
        assert_eq!(params[5], SqlParam::Int(10_000));
    }

    #[test]
    fn sql_uses_question_marks_for_sqlite() {
        let filter = ContainerFilter {
            postal_code: Some("30301".into()),
            max_price: Some(Decimal::new(6500, 0)),
            ..Default::default()
        };
        let (sql, params) = filter.to_sql(Dialect::Sqlite).unwrap();
        assert_eq!(sql, "d.postal_code = ? AND c.price_cents <= ?");
        assert_eq!(
            params,
            vec![SqlParam::Text("30301".into()), SqlParam::Int(650_000)]
        );
    }

    #[test]
    fn like_wildcards_are_literal() {
        assert_eq!(like_pattern("HC"), "%hc%");
        assert_eq!(like_pattern("_"), "%\\_%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");

        let c = container("A", "20DV", ContainerCondition::AsIs, 1);
        for text in ["_", "%"] {
            let filter = ContainerFilter {
                text: Some(text.into()),
                ..Default::default()
            };
            assert!(!filter.matches(&c), "{}", text);
            let (sql, _) = filter.to_sql(Dialect::Sqlite).unwrap();
            assert_eq!(sql.matches("ESCAPE '\\'").count(), 3);
        }
    }

    #[test]
    fn price_bounds_beyond_cents_range_do_not_fail() {
        let huge = Decimal::MAX;
        let unbounded = ContainerFilter {
            max_price: Some(huge),
            ..Default::default()
        };
        let (sql, params) = unbounded.to_sql(Dialect::Postgres).unwrap();
        assert!(sql.is_empty());
        assert!(params.is_empty());
        assert!(unbounded.matches(&container("A", "20DV", ContainerCondition::AsIs, 1_000_000)));

        let unreachable = ContainerFilter {
            min_price: Some(huge),
            ..Default::default()
        };
        let (sql, params) = unreachable.to_sql(Dialect::Sqlite).unwrap();
        assert_eq!(sql, "1 = 0");
        assert!(params.is_empty());
        assert!(!unreachable.matches(&container("A", "20DV", ContainerCondition::AsIs, 1_000_000)));
    }
}
