use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::{bind_postgres, bind_sqlite, DatabasePool, SqlParam};
use crate::error::{AppError, AppResult};
use crate::models::{
    from_cents, normalize_type_code, to_cents, Container, ContainerCondition,
    CreateContainerRequest, SortKey, UpdateContainerRequest, UpsertOutcome,
};
use crate::search::{order_by_sql, ContainerFilter};

const CONTAINER_SELECT: &str = r#"
    SELECT
        c.sku, c.container_type, c.condition, c.quantity, c.price_cents, c.depot_code,
        c.created_at, c.updated_at,
        d.name AS depot_name, d.latitude, d.longitude, d.address, d.city, d.state,
        d.postal_code, d.country
    FROM containers c
    JOIN depots d ON d.code = c.depot_code
"#;

macro_rules! container_from_row {
    ($row:expr) => {{
        let row = $row;
        let condition: String = row.try_get("condition")?;
        let price_cents: i64 = row.try_get("price_cents")?;
        Container {
            sku: row.try_get("sku")?,
            container_type: row.try_get("container_type")?,
            condition: condition
                .parse::<ContainerCondition>()
                .map_err(AppError::InternalServerError)?,
            quantity: row.try_get("quantity")?,
            price: from_cents(price_cents),
            depot_code: row.try_get("depot_code")?,
            depot_name: row.try_get("depot_name")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            postal_code: row.try_get("postal_code")?,
            country: row.try_get("country")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }
    }};
}

fn container_from_pg(row: &PgRow) -> AppResult<Container> {
    Ok(container_from_row!(row))
}

fn container_from_sqlite(row: &SqliteRow) -> AppResult<Container> {
    Ok(container_from_row!(row))
}

pub struct ContainerService {
    db: DatabasePool,
}

impl ContainerService {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    pub async fn create_container(&self, request: CreateContainerRequest) -> AppResult<Container> {
        if self.container_exists(&request.sku).await? {
            return Err(AppError::Conflict(format!(
                "Container {} already exists",
                request.sku
            )));
        }
        self.ensure_depot(&request.depot_code).await?;
        self.insert_container(&request).await?;
        self.get_container(&request.sku).await
    }

    /// Insert-or-update keyed on SKU, used by batch import.
    pub async fn upsert_container(&self, request: &CreateContainerRequest) -> AppResult<UpsertOutcome> {
        if !self.container_exists(&request.sku).await? {
            self.insert_container(request).await?;
            return Ok(UpsertOutcome::Inserted);
        }

        let price_cents = to_cents(request.price)?;
        let container_type = normalize_type_code(&request.container_type);
        let now = Utc::now();

        match &self.db {
            DatabasePool::Postgres(pool) => {
                sqlx::query(
                    r#"
                    UPDATE containers
                    SET container_type = $1, condition = $2, quantity = $3, price_cents = $4, depot_code = $5, updated_at = $6
                    WHERE sku = $7
                    "#,
                )
                .bind(&container_type)
                .bind(request.condition.label())
                .bind(request.quantity)
                .bind(price_cents)
                .bind(&request.depot_code)
                .bind(now)
                .bind(&request.sku)
                .execute(pool)
                .await?;
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query(
                    r#"
                    UPDATE containers
                    SET container_type = ?, condition = ?, quantity = ?, price_cents = ?, depot_code = ?, updated_at = ?
                    WHERE sku = ?
                    "#,
                )
                .bind(&container_type)
                .bind(request.condition.label())
                .bind(request.quantity)
                .bind(price_cents)
                .bind(&request.depot_code)
                .bind(now)
                .bind(&request.sku)
                .execute(pool)
                .await?;
            }
        }

        Ok(UpsertOutcome::Updated)
    }

    async fn insert_container(&self, request: &CreateContainerRequest) -> AppResult<()> {
        let price_cents = to_cents(request.price)?;
        let container_type = normalize_type_code(&request.container_type);
        let now = Utc::now();

        match &self.db {
            DatabasePool::Postgres(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO containers (sku, container_type, condition, quantity, price_cents, depot_code, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(&request.sku)
                .bind(&container_type)
                .bind(request.condition.label())
                .bind(request.quantity)
                .bind(price_cents)
                .bind(&request.depot_code)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await?;
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO containers (sku, container_type, condition, quantity, price_cents, depot_code, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&request.sku)
                .bind(&container_type)
                .bind(request.condition.label())
                .bind(request.quantity)
                .bind(price_cents)
                .bind(&request.depot_code)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn get_container(&self, sku: &str) -> AppResult<Container> {
        let container = match &self.db {
            DatabasePool::Postgres(pool) => {
                let row = sqlx::query(&format!("{} WHERE c.sku = $1", CONTAINER_SELECT))
                    .bind(sku)
                    .fetch_optional(pool)
                    .await?;
                row.as_ref().map(container_from_pg).transpose()?
            }
            DatabasePool::Sqlite(pool) => {
                let row = sqlx::query(&format!("{} WHERE c.sku = ?", CONTAINER_SELECT))
                    .bind(sku)
                    .fetch_optional(pool)
                    .await?;
                row.as_ref().map(container_from_sqlite).transpose()?
            }
        };

        container.ok_or_else(|| AppError::NotFound(format!("Container {} not found", sku)))
    }

    /// Every listing matching `filter`, in `sort` order.
    pub async fn find_containers(
        &self,
        filter: &ContainerFilter,
        sort: SortKey,
    ) -> AppResult<Vec<Container>> {
        let (where_clause, params) = filter.to_sql(self.db.dialect())?;

        let mut query = String::from(CONTAINER_SELECT);
        if !where_clause.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&where_clause);
        }
        query.push_str(" ORDER BY ");
        query.push_str(order_by_sql(sort));

        match &self.db {
            DatabasePool::Postgres(pool) => {
                let rows = bind_postgres(sqlx::query(&query), &params)
                    .fetch_all(pool)
                    .await?;
                rows.iter().map(container_from_pg).collect()
            }
            DatabasePool::Sqlite(pool) => {
                let rows = bind_sqlite(sqlx::query(&query), &params)
                    .fetch_all(pool)
                    .await?;
                rows.iter().map(container_from_sqlite).collect()
            }
        }
    }

    pub async fn update_container(
        &self,
        sku: &str,
        request: UpdateContainerRequest,
    ) -> AppResult<Container> {
        let dialect = self.db.dialect();
        let mut updates: Vec<String> = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();
        let mut set = |column: &str, param: SqlParam| {
            params.push(param);
            updates.push(format!("{} = {}", column, dialect.placeholder(params.len())));
        };

        if let Some(container_type) = &request.container_type {
            set("container_type", SqlParam::Text(normalize_type_code(container_type)));
        }
        if let Some(condition) = request.condition {
            set("condition", SqlParam::Text(condition.label().to_string()));
        }
        if let Some(quantity) = request.quantity {
            set("quantity", SqlParam::Int(i64::from(quantity)));
        }
        if let Some(price) = request.price {
            set("price_cents", SqlParam::Int(to_cents(price)?));
        }
        if let Some(depot_code) = &request.depot_code {
            self.ensure_depot(depot_code).await?;
            set("depot_code", SqlParam::Text(depot_code.clone()));
        }

        if updates.is_empty() {
            return Err(AppError::BadRequest("No fields to update".to_string()));
        }

        let now = Utc::now();
        let query = format!(
            "UPDATE containers SET {}, updated_at = {} WHERE sku = {}",
            updates.join(", "),
            dialect.placeholder(params.len() + 1),
            dialect.placeholder(params.len() + 2)
        );

        let affected = match &self.db {
            DatabasePool::Postgres(pool) => bind_postgres(sqlx::query(&query), &params)
                .bind(now)
                .bind(sku)
                .execute(pool)
                .await?
                .rows_affected(),
            DatabasePool::Sqlite(pool) => bind_sqlite(sqlx::query(&query), &params)
                .bind(now)
                .bind(sku)
                .execute(pool)
                .await?
                .rows_affected(),
        };

        if affected == 0 {
            return Err(AppError::NotFound(format!("Container {} not found", sku)));
        }

        self.get_container(sku).await
    }

    pub async fn delete_container(&self, sku: &str) -> AppResult<()> {
        let (leases, result) = match &self.db {
            DatabasePool::Postgres(pool) => {
                let leases: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM leases WHERE container_sku = $1")
                        .bind(sku)
                        .fetch_one(pool)
                        .await?;
                if leases > 0 {
                    (leases, 0)
                } else {
                    let result = sqlx::query("DELETE FROM containers WHERE sku = $1")
                        .bind(sku)
                        .execute(pool)
                        .await?;
                    (0, result.rows_affected())
                }
            }
            DatabasePool::Sqlite(pool) => {
                let leases: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM leases WHERE container_sku = ?")
                        .bind(sku)
                        .fetch_one(pool)
                        .await?;
                if leases > 0 {
                    (leases, 0)
                } else {
                    let result = sqlx::query("DELETE FROM containers WHERE sku = ?")
                        .bind(sku)
                        .execute(pool)
                        .await?;
                    (0, result.rows_affected())
                }
            }
        };

        if leases > 0 {
            return Err(AppError::Conflict(format!(
                "Container {} has {} lease records and cannot be deleted",
                sku, leases
            )));
        }
        if result == 0 {
            return Err(AppError::NotFound(format!("Container {} not found", sku)));
        }
        Ok(())
    }

    /// Hard-deletes every listing whose SKU is not in `keep`, except leased ones.
    /// `keep` travels as a single bound value, so its length is not limited by
    /// the backend's parameter cap.
    pub async fn delete_except(&self, keep: &[String]) -> AppResult<u64> {
        let deleted = match &self.db {
            DatabasePool::Postgres(pool) => sqlx::query(
                "DELETE FROM containers WHERE sku NOT IN (SELECT container_sku FROM leases) AND sku <> ALL($1)",
            )
            .bind(keep.to_vec())
            .execute(pool)
            .await?
            .rows_affected(),
            DatabasePool::Sqlite(pool) => {
                let keep = serde_json::to_string(keep).map_err(|e| {
                    AppError::InternalServerError(format!("Failed to encode SKU list: {}", e))
                })?;
                sqlx::query(
                    "DELETE FROM containers WHERE sku NOT IN (SELECT container_sku FROM leases) AND sku NOT IN (SELECT value FROM json_each(?))",
                )
                .bind(keep)
                .execute(pool)
                .await?
                .rows_affected()
            }
        };
        Ok(deleted)
    }

    pub async fn container_exists(&self, sku: &str) -> AppResult<bool> {
        match &self.db {
            DatabasePool::Postgres(pool) => {
                let result: (bool,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM containers WHERE sku = $1)")
                        .bind(sku)
                        .fetch_one(pool)
                        .await?;
                Ok(result.0)
            }
            DatabasePool::Sqlite(pool) => {
                let result: (i32,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM containers WHERE sku = ?)")
                        .bind(sku)
                        .fetch_one(pool)
                        .await?;
                Ok(result.0 == 1)
            }
        }
    }

    async fn ensure_depot(&self, code: &str) -> AppResult<()> {
        let exists = match &self.db {
            DatabasePool::Postgres(pool) => {
                let result: (bool,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM depots WHERE code = $1)")
                        .bind(code)
                        .fetch_one(pool)
                        .await?;
                result.0
            }
            DatabasePool::Sqlite(pool) => {
                let result: (i32,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM depots WHERE code = ?)")
                        .bind(code)
                        .fetch_one(pool)
                        .await?;
                result.0 == 1
            }
        };

        if !exists {
            return Err(AppError::BadRequest(format!("Unknown depot {}", code)));
        }
        Ok(())
    }
}
