use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::search::distance::{Coordinate, Located};

/// Condition grade of a container, stored by its display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerCondition {
    #[serde(rename = "Brand New")]
    BrandNew,
    #[serde(rename = "IICL")]
    Iicl,
    #[serde(rename = "Cargo Worthy")]
    CargoWorthy,
    #[serde(rename = "Wind and Water Tight")]
    WindAndWaterTight,
    #[serde(rename = "As-Is")]
    AsIs,
}

impl ContainerCondition {
    pub const ALL: [ContainerCondition; 5] = [
        ContainerCondition::BrandNew,
        ContainerCondition::Iicl,
        ContainerCondition::CargoWorthy,
        ContainerCondition::WindAndWaterTight,
        ContainerCondition::AsIs,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ContainerCondition::BrandNew => "Brand New",
            ContainerCondition::Iicl => "IICL",
            ContainerCondition::CargoWorthy => "Cargo Worthy",
            ContainerCondition::WindAndWaterTight => "Wind and Water Tight",
            ContainerCondition::AsIs => "As-Is",
        }
    }
}

impl fmt::Display for ContainerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ContainerCondition {
    type Err = String;

    /// Accepts the display label as well as the shorthands used in depot feeds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        match normalized.as_str() {
            "brandnew" | "new" | "onetrip" => Ok(ContainerCondition::BrandNew),
            "iicl" => Ok(ContainerCondition::Iicl),
            "cargoworthy" | "cw" => Ok(ContainerCondition::CargoWorthy),
            "windandwatertight" | "wwt" | "windwatertight" => {
                Ok(ContainerCondition::WindAndWaterTight)
            }
            "asis" => Ok(ContainerCondition::AsIs),
            _ => Err(format!("Unknown container condition: {}", s.trim())),
        }
    }
}

/// Type codes are compared upper-case, e.g. `40HC`.
pub fn normalize_type_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// A container listing with its depot resolved.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Container {
    pub sku: String,
    pub container_type: String,
    pub condition: ContainerCondition,
    pub quantity: i32,
    pub price: Decimal,
    pub depot_code: String,
    pub depot_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Located for Container {
    fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateContainerRequest {
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 16))]
    pub container_type: String,
    pub condition: ContainerCondition,
    #[validate(range(min = 0))]
    pub quantity: i32,
    #[validate(custom(function = "crate::models::validate_non_negative"))]
    pub price: Decimal,
    #[validate(length(min = 1, max = 32))]
    pub depot_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateContainerRequest {
    #[validate(length(min = 1, max = 16))]
    pub container_type: Option<String>,
    pub condition: Option<ContainerCondition>,
    #[validate(range(min = 0))]
    pub quantity: Option<i32>,
    #[validate(custom(function = "crate::models::validate_non_negative"))]
    pub price: Option<Decimal>,
    #[validate(length(min = 1, max = 32))]
    pub depot_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
