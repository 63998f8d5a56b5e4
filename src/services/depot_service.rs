use chrono::Utc;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::DatabasePool;
use crate::error::{AppError, AppResult};
use crate::models::{Depot, UpsertDepotRequest, UpsertOutcome};
use crate::search::{within_radius, Coordinate};

const DEPOT_COLUMNS: &str = "code, name, country, city, state, postal_code, address, latitude, longitude, is_active, services, created_at, updated_at";

macro_rules! depot_from_row {
    ($row:expr) => {{
        let row = $row;
        let services: String = row.try_get("services")?;
        let services: Vec<String> = serde_json::from_str(&services).map_err(|e| {
            AppError::InternalServerError(format!("Corrupt services list: {}", e))
        })?;
        Depot {
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            country: row.try_get("country")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            postal_code: row.try_get("postal_code")?,
            address: row.try_get("address")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            is_active: row.try_get("is_active")?,
            services,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }
    }};
}

fn depot_from_pg(row: &PgRow) -> AppResult<Depot> {
    Ok(depot_from_row!(row))
}

fn depot_from_sqlite(row: &SqliteRow) -> AppResult<Depot> {
    Ok(depot_from_row!(row))
}

#[derive(Debug, Clone, Serialize)]
pub struct DepotWithDistance {
    #[serde(flatten)]
    pub depot: Depot,
    pub distance_miles: f64,
}

pub struct DepotService {
    db: DatabasePool,
}

impl DepotService {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// Creates the depot or replaces every field of an existing one with the same code.
    pub async fn upsert_depot(&self, request: UpsertDepotRequest) -> AppResult<(Depot, UpsertOutcome)> {
        if Coordinate::checked(request.latitude, request.longitude).is_none() {
            return Err(AppError::ValidationError(format!(
                "Depot {} has out-of-range coordinates",
                request.code
            )));
        }

        let exists = self.depot_exists(&request.code).await?;
        let now = Utc::now();
        let services = serde_json::to_string(&request.services)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        let is_active = request.is_active.unwrap_or(true);

        match &self.db {
            DatabasePool::Postgres(pool) => {
                if exists {
                    sqlx::query(
                        r#"
                        UPDATE depots
                        SET name = $1, country = $2, city = $3, state = $4, postal_code = $5, address = $6,
                            latitude = $7, longitude = $8, is_active = $9, services = $10, updated_at = $11
                        WHERE code = $12
                        "#,
                    )
                    .bind(&request.name)
                    .bind(&request.country)
                    .bind(&request.city)
                    .bind(&request.state)
                    .bind(&request.postal_code)
                    .bind(&request.address)
                    .bind(request.latitude)
                    .bind(request.longitude)
                    .bind(is_active)
                    .bind(&services)
                    .bind(now)
                    .bind(&request.code)
                    .execute(pool)
                    .await?;
                } else {
                    sqlx::query(
                        r#"
                        INSERT INTO depots (code, name, country, city, state, postal_code, address, latitude, longitude, is_active, services, created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                        "#,
                    )
                    .bind(&request.code)
                    .bind(&request.name)
                    .bind(&request.country)
                    .bind(&request.city)
                    .bind(&request.state)
                    .bind(&request.postal_code)
                    .bind(&request.address)
                    .bind(request.latitude)
                    .bind(request.longitude)
                    .bind(is_active)
                    .bind(&services)
                    .bind(now)
                    .bind(now)
                    .execute(pool)
                    .await?;
                }
            }
            DatabasePool::Sqlite(pool) => {
                if exists {
                    sqlx::query(
                        r#"
                        UPDATE depots
                        SET name = ?, country = ?, city = ?, state = ?, postal_code = ?, address = ?,
                            latitude = ?, longitude = ?, is_active = ?, services = ?, updated_at = ?
                        WHERE code = ?
                        "#,
                    )
                    .bind(&request.name)
                    .bind(&request.country)
                    .bind(&request.city)
                    .bind(&request.state)
                    .bind(&request.postal_code)
                    .bind(&request.address)
                    .bind(request.latitude)
                    .bind(request.longitude)
                    .bind(is_active)
                    .bind(&services)
                    .bind(now)
                    .bind(&request.code)
                    .execute(pool)
                    .await?;
                } else {
                    sqlx::query(
                        r#"
                        INSERT INTO depots (code, name, country, city, state, postal_code, address, latitude, longitude, is_active, services, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&request.code)
                    .bind(&request.name)
                    .bind(&request.country)
                    .bind(&request.city)
                    .bind(&request.state)
                    .bind(&request.postal_code)
                    .bind(&request.address)
                    .bind(request.latitude)
                    .bind(request.longitude)
                    .bind(is_active)
                    .bind(&services)
                    .bind(now)
                    .bind(now)
                    .execute(pool)
                    .await?;
                }
            }
        }

        let outcome = if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        let depot = self.get_depot(&request.code).await?;
        Ok((depot, outcome))
    }

    pub async fn get_depot(&self, code: &str) -> AppResult<Depot> {
        let depot = match &self.db {
            DatabasePool::Postgres(pool) => {
                let row = sqlx::query(&format!("SELECT {} FROM depots WHERE code = $1", DEPOT_COLUMNS))
                    .bind(code)
                    .fetch_optional(pool)
                    .await?;
                row.as_ref().map(depot_from_pg).transpose()?
            }
            DatabasePool::Sqlite(pool) => {
                let row = sqlx::query(&format!("SELECT {} FROM depots WHERE code = ?", DEPOT_COLUMNS))
                    .bind(code)
                    .fetch_optional(pool)
                    .await?;
                row.as_ref().map(depot_from_sqlite).transpose()?
            }
        };

        depot.ok_or_else(|| AppError::NotFound(format!("Depot {} not found", code)))
    }

    /// Case-insensitive lookup by display name.
    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<Depot>> {
        match &self.db {
            DatabasePool::Postgres(pool) => {
                let row = sqlx::query(&format!(
                    "SELECT {} FROM depots WHERE LOWER(name) = LOWER($1) ORDER BY code LIMIT 1",
                    DEPOT_COLUMNS
                ))
                .bind(name.trim())
                .fetch_optional(pool)
                .await?;
                row.as_ref().map(depot_from_pg).transpose()
            }
            DatabasePool::Sqlite(pool) => {
                let row = sqlx::query(&format!(
                    "SELECT {} FROM depots WHERE LOWER(name) = LOWER(?) ORDER BY code LIMIT 1",
                    DEPOT_COLUMNS
                ))
                .bind(name.trim())
                .fetch_optional(pool)
                .await?;
                row.as_ref().map(depot_from_sqlite).transpose()
            }
        }
    }

    pub async fn list_depots(&self, active_only: bool) -> AppResult<Vec<Depot>> {
        let filter = if active_only {
            "WHERE is_active = TRUE"
        } else {
            ""
        };
        let query = format!("SELECT {} FROM depots {} ORDER BY code", DEPOT_COLUMNS, filter);

        match &self.db {
            DatabasePool::Postgres(pool) => {
                let rows = sqlx::query(&query).fetch_all(pool).await?;
                rows.iter().map(depot_from_pg).collect()
            }
            DatabasePool::Sqlite(pool) => {
                let rows = sqlx::query(&query).fetch_all(pool).await?;
                rows.iter().map(depot_from_sqlite).collect()
            }
        }
    }

    /// Depots within `radius_miles` of `origin`, nearest first. No widening.
    pub async fn depots_near(
        &self,
        origin: Coordinate,
        radius_miles: f64,
        active_only: bool,
    ) -> AppResult<Vec<DepotWithDistance>> {
        let depots = self.list_depots(active_only).await?;
        Ok(within_radius(depots, origin, radius_miles)
            .into_iter()
            .map(|(depot, distance_miles)| DepotWithDistance {
                depot,
                distance_miles,
            })
            .collect())
    }

    pub async fn delete_depot(&self, code: &str) -> AppResult<()> {
        let result = match &self.db {
            DatabasePool::Postgres(pool) => {
                let count: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM containers WHERE depot_code = $1")
                        .bind(code)
                        .fetch_one(pool)
                        .await?;
                if count > 0 {
                    return Err(AppError::Conflict(format!(
                        "Depot {} still holds {} container listings",
                        code, count
                    )));
                }
                sqlx::query("DELETE FROM depots WHERE code = $1")
                    .bind(code)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
            DatabasePool::Sqlite(pool) => {
                let count: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM containers WHERE depot_code = ?")
                        .bind(code)
                        .fetch_one(pool)
                        .await?;
                if count > 0 {
                    return Err(AppError::Conflict(format!(
                        "Depot {} still holds {} container listings",
                        code, count
                    )));
                }
                sqlx::query("DELETE FROM depots WHERE code = ?")
                    .bind(code)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
        };

        if result == 0 {
            return Err(AppError::NotFound(format!("Depot {} not found", code)));
        }
        Ok(())
    }

    async fn depot_exists(&self, code: &str) -> AppResult<bool> {
        match &self.db {
            DatabasePool::Postgres(pool) => {
                let result: (bool,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM depots WHERE code = $1)")
                        .bind(code)
                        .fetch_one(pool)
                        .await?;
                Ok(result.0)
            }
            DatabasePool::Sqlite(pool) => {
                let result: (i32,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM depots WHERE code = ?)")
                        .bind(code)
                        .fetch_one(pool)
                        .await?;
                Ok(result.0 == 1)
            }
        }
    }
}
