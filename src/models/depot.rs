use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::search::distance::{Coordinate, Located};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Depot {
    pub code: String,
    pub name: String,
    pub country: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_active: bool,
    pub services: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Located for Depot {
    fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpsertDepotRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub country: String,
    #[validate(length(min = 1, max = 64))]
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    #[serde(default)]
    pub address: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub services: Vec<String>,
}

/// Derives a depot code from a display name, e.g. `Atlanta Depot` -> `ATLANTA-DEPOT`.
pub fn depot_code_from_name(name: &str) -> String {
    let mut code = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            code.push(c.to_ascii_uppercase());
        } else if !code.is_empty() && !code.ends_with('-') {
            code.push('-');
        }
    }
    code.truncate(32);
    while code.ends_with('-') {
        code.pop();
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depot_code_is_upper_kebab() {
        assert_eq!(depot_code_from_name("Atlanta Depot"), "ATLANTA-DEPOT");
        assert_eq!(depot_code_from_name("  Denver / Commerce City  "), "DENVER-COMMERCE-CITY");
        assert_eq!(depot_code_from_name("***"), "");
    }

    #[test]
    fn out_of_range_coordinates_fail_validation() {
        let request = UpsertDepotRequest {
            code: "DEN".into(),
            name: "Denver".into(),
            country: "USA".into(),
            city: "Denver".into(),
            state: Some("CO".into()),
            postal_code: Some("80216".into()),
            address: String::new(),
            latitude: 91.0,
            longitude: -181.0,
            is_active: None,
            services: vec![],
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("latitude"));
        assert!(errors.field_errors().contains_key("longitude"));
    }
}
