//! Batch loading of container and depot CSV feeds.
//!
//! Bad rows are skipped and reported in the [`ImportSummary`]; only a
//! missing header row or a datastore failure aborts an import.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    depot_code_from_name, ContainerCondition, CreateContainerRequest, UpsertDepotRequest,
    UpsertOutcome,
};
use crate::search::{haversine_miles, Coordinate, Located};

use super::{ContainerService, DepotService};

/// Rows further than this from their depot's stored position are reported as drift.
const DRIFT_TOLERANCE_MILES: f64 = 1.0;
/// Stands in for the depot code until the row's depot is resolved.
const UNRESOLVED_DEPOT: &str = "UNRESOLVED";

#[derive(Debug, Error)]
pub enum RowError {
    #[error("row {row}: {source}")]
    Malformed {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("row {row}: missing {field}")]
    Missing { row: usize, field: &'static str },
    #[error("row {row}: invalid {field} {value:?}")]
    Invalid {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("row {row}: {message}")]
    Rejected { row: usize, message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Upsert,
    /// Also removes listings whose SKU is absent from the file.
    Replace,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ImportSummary {
    pub total_rows: u32,
    pub inserted: u32,
    pub updated: u32,
    pub skipped: u32,
    pub deleted: u64,
    pub errors: Vec<String>,
}

impl ImportSummary {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    fn skip(&mut self, error: RowError) {
        tracing::warn!("Skipping import row: {}", error);
        self.skipped += 1;
        self.errors.push(error.to_string());
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContainerRecord {
    sku: Option<String>,
    #[serde(rename = "type")]
    container_type: Option<String>,
    condition: Option<String>,
    quantity: Option<String>,
    price: Option<String>,
    #[serde(alias = "depot")]
    depot_name: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DepotRecord {
    #[serde(rename = "Country")]
    country: Option<String>,
    #[serde(rename = "City")]
    city: Option<String>,
    #[serde(rename = "Code")]
    code: Option<String>,
    #[serde(rename = "Depot Name")]
    name: Option<String>,
    #[serde(rename = "Address (Short)")]
    address: Option<String>,
    #[serde(rename = "Latitude")]
    latitude: Option<String>,
    #[serde(rename = "Longitude")]
    longitude: Option<String>,
}

/// A container row that passed parsing, with the depot it claims.
struct ContainerRow {
    request: CreateContainerRequest,
    depot_name: String,
    coordinate: Option<Coordinate>,
    address: String,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: String,
}

fn required(value: Option<String>, row: usize, field: &'static str) -> Result<String, RowError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(RowError::Missing { row, field })
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_field<T: FromStr>(raw: &str, row: usize, field: &'static str) -> Result<T, RowError> {
    raw.parse::<T>().map_err(|_| RowError::Invalid {
        row,
        field,
        value: raw.to_string(),
    })
}

/// Both or neither coordinate must be present; present ones must be in range.
fn parse_coordinate(
    latitude: Option<String>,
    longitude: Option<String>,
    row: usize,
) -> Result<Option<Coordinate>, RowError> {
    let (latitude, longitude) = match (optional(latitude), optional(longitude)) {
        (None, None) => return Ok(None),
        (Some(lat), Some(lng)) => (lat, lng),
        (None, Some(_)) => return Err(RowError::Missing { row, field: "latitude" }),
        (Some(_), None) => return Err(RowError::Missing { row, field: "longitude" }),
    };
    let lat: f64 = parse_field(&latitude, row, "latitude")?;
    let lng: f64 = parse_field(&longitude, row, "longitude")?;
    Coordinate::checked(lat, lng)
        .map(Some)
        .ok_or(RowError::Invalid {
            row,
            field: "coordinates",
            value: format!("{}, {}", latitude, longitude),
        })
}

fn parse_price(raw: &str, row: usize) -> Result<Decimal, RowError> {
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    let price = Decimal::from_str(cleaned.trim()).map_err(|_| RowError::Invalid {
        row,
        field: "price",
        value: raw.to_string(),
    })?;
    if price.is_sign_negative() && !price.is_zero() {
        return Err(RowError::Invalid {
            row,
            field: "price",
            value: raw.to_string(),
        });
    }
    Ok(price)
}

fn parse_container_record(record: ContainerRecord, row: usize) -> Result<ContainerRow, RowError> {
    let condition_raw = required(record.condition, row, "condition")?;
    let condition: ContainerCondition = parse_field(&condition_raw, row, "condition")?;
    let quantity_raw = required(record.quantity, row, "quantity")?;
    let quantity: i32 = parse_field(&quantity_raw, row, "quantity")?;
    let price = parse_price(&required(record.price, row, "price")?, row)?;

    let request = CreateContainerRequest {
        sku: required(record.sku, row, "sku")?,
        container_type: required(record.container_type, row, "type")?,
        condition,
        quantity,
        price,
        depot_code: UNRESOLVED_DEPOT.to_string(),
    };

    Ok(ContainerRow {
        request,
        depot_name: required(record.depot_name, row, "depot_name")?,
        coordinate: parse_coordinate(record.latitude, record.longitude, row)?,
        address: optional(record.address).unwrap_or_default(),
        city: optional(record.city),
        state: optional(record.state),
        postal_code: optional(record.postal_code),
        country: optional(record.country).unwrap_or_else(|| "USA".to_string()),
    })
}

fn parse_depot_record(record: DepotRecord, row: usize) -> Result<UpsertDepotRequest, RowError> {
    let name = required(record.name, row, "Depot Name")?;
    let code = optional(record.code).unwrap_or_else(|| depot_code_from_name(&name));
    if code.is_empty() {
        return Err(RowError::Missing { row, field: "Code" });
    }
    let coordinate = parse_coordinate(record.latitude, record.longitude, row)?
        .ok_or(RowError::Missing { row, field: "Latitude" })?;

    Ok(UpsertDepotRequest {
        code,
        name,
        country: required(record.country, row, "Country")?,
        city: required(record.city, row, "City")?,
        state: None,
        postal_code: None,
        address: optional(record.address).unwrap_or_default(),
        latitude: coordinate.latitude,
        longitude: coordinate.longitude,
        is_active: None,
        services: Vec::new(),
    })
}

fn reader(csv_text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(csv_text.as_bytes())
}

pub struct ImportService {
    containers: Arc<ContainerService>,
    depots: Arc<DepotService>,
}

impl ImportService {
    pub fn new(containers: Arc<ContainerService>, depots: Arc<DepotService>) -> Self {
        Self { containers, depots }
    }

    pub async fn import_containers(&self, csv_text: &str, mode: ImportMode) -> AppResult<ImportSummary> {
        let mut reader = reader(csv_text);
        reader.headers()?;

        let mut summary = ImportSummary::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut depot_codes: HashMap<String, String> = HashMap::new();

        for (index, result) in reader.deserialize::<ContainerRecord>().enumerate() {
            // Header is line 1
            let row = index + 2;
            summary.total_rows += 1;

            let parsed = result
                .map_err(|source| RowError::Malformed { row, source })
                .and_then(|record| parse_container_record(record, row));
            let mut parsed = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    summary.skip(e);
                    continue;
                }
            };

            if let Err(e) = parsed.request.validate() {
                summary.skip(RowError::Rejected {
                    row,
                    message: e.to_string(),
                });
                continue;
            }

            let key = parsed.depot_name.to_lowercase();
            let depot_code = match depot_codes.get(&key) {
                Some(code) => code.clone(),
                None => match self.resolve_depot(&parsed, row).await? {
                    Ok(code) => {
                        depot_codes.insert(key, code.clone());
                        code
                    }
                    Err(e) => {
                        summary.skip(e);
                        continue;
                    }
                },
            };
            parsed.request.depot_code = depot_code;

            let outcome = self.containers.upsert_container(&parsed.request).await?;
            summary.record(outcome);
            seen.insert(parsed.request.sku);
        }

        if mode == ImportMode::Replace {
            if seen.is_empty() {
                tracing::warn!("Replace import had no valid rows, leaving catalog untouched");
            } else {
                let keep: Vec<String> = seen.into_iter().collect();
                summary.deleted = self.containers.delete_except(&keep).await?;
            }
        }

        tracing::info!(
            "Container import: {} rows, {} inserted, {} updated, {} skipped, {} deleted",
            summary.total_rows,
            summary.inserted,
            summary.updated,
            summary.skipped,
            summary.deleted
        );
        Ok(summary)
    }

    /// Finds the row's depot by name, creating it from the row when unknown.
    /// The inner error skips the row; the outer one aborts the import.
    async fn resolve_depot(&self, parsed: &ContainerRow, row: usize) -> AppResult<Result<String, RowError>> {
        if let Some(depot) = self.depots.find_by_name(&parsed.depot_name).await? {
            if let Some(coordinate) = parsed.coordinate {
                let drift = haversine_miles(depot.coordinate(), coordinate);
                if drift > DRIFT_TOLERANCE_MILES {
                    tracing::warn!(
                        "Row {} places depot {} {:.1} mi from its stored position; keeping stored coordinates",
                        row,
                        depot.code,
                        drift
                    );
                }
            }
            return Ok(Ok(depot.code));
        }

        let Some(coordinate) = parsed.coordinate else {
            return Ok(Err(RowError::Rejected {
                row,
                message: format!("unknown depot {:?} and no coordinates to create it", parsed.depot_name),
            }));
        };
        let Some(city) = parsed.city.clone() else {
            return Ok(Err(RowError::Missing { row, field: "city" }));
        };
        let code = depot_code_from_name(&parsed.depot_name);
        if code.is_empty() {
            return Ok(Err(RowError::Invalid {
                row,
                field: "depot_name",
                value: parsed.depot_name.clone(),
            }));
        }

        match self.depots.get_depot(&code).await {
            Ok(existing) => {
                tracing::warn!(
                    "Depot name {:?} maps to existing code {} ({})",
                    parsed.depot_name,
                    existing.code,
                    existing.name
                );
                return Ok(Ok(existing.code));
            }
            Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let request = UpsertDepotRequest {
            code,
            name: parsed.depot_name.clone(),
            country: parsed.country.clone(),
            city,
            state: parsed.state.clone(),
            postal_code: parsed.postal_code.clone(),
            address: parsed.address.clone(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            is_active: None,
            services: Vec::new(),
        };
        if let Err(e) = request.validate() {
            return Ok(Err(RowError::Rejected {
                row,
                message: e.to_string(),
            }));
        }

        let (depot, _) = self.depots.upsert_depot(request).await?;
        tracing::info!("Created depot {} from import row {}", depot.code, row);
        Ok(Ok(depot.code))
    }

    /// Upserts depots keyed on code. Existing depots keep their services and
    /// active flag.
    pub async fn import_depots(&self, csv_text: &str) -> AppResult<ImportSummary> {
        let mut reader = reader(csv_text);
        reader.headers()?;

        let mut summary = ImportSummary::default();

        for (index, result) in reader.deserialize::<DepotRecord>().enumerate() {
            let row = index + 2;
            summary.total_rows += 1;

            let parsed = result
                .map_err(|source| RowError::Malformed { row, source })
                .and_then(|record| parse_depot_record(record, row));
            let mut request = match parsed {
                Ok(request) => request,
                Err(e) => {
                    summary.skip(e);
                    continue;
                }
            };

            if let Err(e) = request.validate() {
                summary.skip(RowError::Rejected {
                    row,
                    message: e.to_string(),
                });
                continue;
            }

            match self.depots.get_depot(&request.code).await {
                Ok(existing) => {
                    request.services = existing.services;
                    request.is_active = Some(existing.is_active);
                    request.state = existing.state;
                    request.postal_code = existing.postal_code;
                }
                Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }

            let (_, outcome) = self.depots.upsert_depot(request).await?;
            summary.record(outcome);
        }

        tracing::info!(
            "Depot import: {} rows, {} inserted, {} updated, {} skipped",
            summary.total_rows,
            summary.inserted,
            summary.updated,
            summary.skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::services::container_service::tests::seeded_pool;

    async fn service_on(pool: crate::db::DatabasePool) -> ImportService {
        ImportService::new(
            Arc::new(ContainerService::new(pool.clone())),
            Arc::new(DepotService::new(pool)),
        )
    }

    const DEPOT_CSV: &str = "\
Country,City,Code,Depot Name,Address (Short),Latitude,Longitude
USA,Dallas,DAL,Dallas Depot,2100 Yard Rd,32.78,-96.80
USA,Houston,HOU,Houston Depot,9 Port Ave,north,-95.37
USA,Memphis,,Memphis Rail Yard,1 Rail St,35.15,-90.05
";

    #[tokio::test]
    async fn depot_rows_with_bad_coordinates_are_skipped() {
        let service = service_on(memory_pool().await).await;
        let summary = service.import_depots(DEPOT_CSV).await.unwrap();

        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 1);
        assert!(summary.errors[0].contains("row 3"));

        assert!(service.depots.get_depot("DAL").await.is_ok());
        assert!(service.depots.get_depot("MEMPHIS-RAIL-YARD").await.is_ok());
        assert!(matches!(
            service.depots.get_depot("HOU").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn depot_reimport_updates_and_keeps_services() {
        let service = service_on(memory_pool().await).await;
        service.import_depots(DEPOT_CSV).await.unwrap();
        let summary = service.import_depots(DEPOT_CSV).await.unwrap();
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.inserted, 0);
    }

    #[tokio::test]
    async fn container_rows_resolve_or_create_depots() {
        let service = service_on(seeded_pool().await).await;
        let csv = "\
sku,type,condition,quantity,price,depot_name,latitude,longitude,address,city,state,postal_code,country
ATL-40HC-002,40hc,Brand New,4,\"$5,900\",atlanta depot,33.749,-84.388,,Atlanta,GA,30301,USA
SAV-20DV-001,20DV,cw,1,1800,Savannah Depot,32.08,-81.09,5 Dock Rd,Savannah,GA,31401,USA
SAV-20DV-002,20DV,scrap,1,1800,Savannah Depot,32.08,-81.09,5 Dock Rd,Savannah,GA,31401,USA
BOS-20DV-001,20DV,As-Is,1,900,Boston Depot,,,,Boston,MA,02101,USA
";
        let summary = service
            .import_containers(csv, ImportMode::Upsert)
            .await
            .unwrap();

        assert_eq!(summary.total_rows, 4);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 2);

        let updated = service.containers.get_container("ATL-40HC-002").await.unwrap();
        assert_eq!(updated.price, Decimal::new(5900, 0));
        assert_eq!(updated.depot_code, "ATL");

        let created = service.containers.get_container("SAV-20DV-001").await.unwrap();
        assert_eq!(created.depot_code, "SAVANNAH-DEPOT");
        assert_eq!(created.condition, ContainerCondition::CargoWorthy);
    }

    #[tokio::test]
    async fn rejected_row_creates_no_depot() {
        let service = service_on(seeded_pool().await).await;
        let csv = "\
sku,type,condition,quantity,price,depot_name,latitude,longitude,city,country
GHO-20DV-001,20DV,As-Is,-1,900,Ghost Depot,41.88,-87.63,Chicago,USA
";
        let summary = service
            .import_containers(csv, ImportMode::Upsert)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.inserted, 0);
        assert!(!service.containers.container_exists("GHO-20DV-001").await.unwrap());
        assert!(service.depots.find_by_name("Ghost Depot").await.unwrap().is_none());
        assert!(matches!(
            service.depots.get_depot("GHOST-DEPOT").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn container_row_with_non_numeric_latitude_is_skipped() {
        let service = service_on(seeded_pool().await).await;
        let csv = "\
sku,type,condition,quantity,price,depot_name,latitude,longitude
ATL-45HC-009,45HC,Brand New,1,7000,Atlanta Depot,abc,-84.388
";
        let summary = service
            .import_containers(csv, ImportMode::Upsert)
            .await
            .unwrap();

        assert_eq!(summary.total_rows, 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.errors[0].contains("row 2"));
        assert!(!service.containers.container_exists("ATL-45HC-009").await.unwrap());
    }

    #[tokio::test]
    async fn replace_mode_removes_listings_missing_from_file() {
        let service = service_on(seeded_pool().await).await;
        let csv = "\
sku,type,condition,quantity,price,depot_name
ATL-40HC-002,40HC,Brand New,1,6000,Atlanta Depot
DEN-40HC-001,40HC,IICL,1,5200,Denver Depot
";
        let summary = service
            .import_containers(csv, ImportMode::Replace)
            .await
            .unwrap();

        assert_eq!(summary.updated, 2);
        assert_eq!(summary.deleted, 3);
        assert!(!service.containers.container_exists("ATL-20DV-001").await.unwrap());
    }

    #[tokio::test]
    async fn replace_with_no_valid_rows_deletes_nothing() {
        let service = service_on(seeded_pool().await).await;
        let csv = "sku,type,condition,quantity,price,depot_name\nX,20DV,bogus,1,1,Atlanta Depot\n";
        let summary = service
            .import_containers(csv, ImportMode::Replace)
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.deleted, 0);
    }

    #[test]
    fn import_mode_defaults_to_upsert() {
        assert_eq!(ImportMode::default(), ImportMode::Upsert);
        let mode: ImportMode = serde_json::from_str("\"replace\"").unwrap();
        assert_eq!(mode, ImportMode::Replace);
    }
}
