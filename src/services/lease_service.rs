use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabasePool;
use crate::error::{AppError, AppResult};
use crate::models::{
    from_cents, to_cents, CloseLeaseRequest, CreateLeaseRequest, Lease, LeaseCharge, LeaseStatus,
    SweepSummary,
};

use super::scheduler::SweepJob;

const LEASE_COLUMNS: &str = "id, container_sku, customer_name, per_diem_cents, start_date, end_date, billed_through, status, created_at";

fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| AppError::InternalServerError(format!("Corrupt lease id {}: {}", raw, e)))
}

macro_rules! lease_from_row {
    ($row:expr) => {{
        let row = $row;
        let id: String = row.try_get("id")?;
        let status: String = row.try_get("status")?;
        let per_diem_cents: i64 = row.try_get("per_diem_cents")?;
        Lease {
            id: parse_id(&id)?,
            container_sku: row.try_get("container_sku")?,
            customer_name: row.try_get("customer_name")?,
            per_diem_rate: from_cents(per_diem_cents),
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            billed_through: row.try_get("billed_through")?,
            status: status
                .parse::<LeaseStatus>()
                .map_err(AppError::InternalServerError)?,
            created_at: row.try_get("created_at")?,
        }
    }};
}

macro_rules! charge_from_row {
    ($row:expr) => {{
        let row = $row;
        let lease_id: String = row.try_get("lease_id")?;
        let amount_cents: i64 = row.try_get("amount_cents")?;
        LeaseCharge {
            id: row.try_get("id")?,
            lease_id: parse_id(&lease_id)?,
            charge_date: row.try_get("charge_date")?,
            amount: from_cents(amount_cents),
            created_at: row.try_get("created_at")?,
        }
    }};
}

fn lease_from_pg(row: &PgRow) -> AppResult<Lease> {
    Ok(lease_from_row!(row))
}

fn lease_from_sqlite(row: &SqliteRow) -> AppResult<Lease> {
    Ok(lease_from_row!(row))
}

fn charge_from_pg(row: &PgRow) -> AppResult<LeaseCharge> {
    Ok(charge_from_row!(row))
}

fn charge_from_sqlite(row: &SqliteRow) -> AppResult<LeaseCharge> {
    Ok(charge_from_row!(row))
}

pub struct LeaseService {
    db: DatabasePool,
}

impl LeaseService {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    pub async fn create_lease(&self, request: CreateLeaseRequest) -> AppResult<Lease> {
        if let Some(end) = request.end_date {
            if end < request.start_date {
                return Err(AppError::ValidationError(
                    "Lease end date precedes its start date".to_string(),
                ));
            }
        }

        let id = Uuid::new_v4();
        let per_diem_cents = to_cents(request.per_diem_rate)?;
        let now = Utc::now();

        let container_exists = match &self.db {
            DatabasePool::Postgres(pool) => {
                let result: (bool,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM containers WHERE sku = $1)")
                        .bind(&request.container_sku)
                        .fetch_one(pool)
                        .await?;
                result.0
            }
            DatabasePool::Sqlite(pool) => {
                let result: (i32,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM containers WHERE sku = ?)")
                        .bind(&request.container_sku)
                        .fetch_one(pool)
                        .await?;
                result.0 == 1
            }
        };
        if !container_exists {
            return Err(AppError::NotFound(format!(
                "Container {} not found",
                request.container_sku
            )));
        }

        match &self.db {
            DatabasePool::Postgres(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO leases (id, container_sku, customer_name, per_diem_cents, start_date, end_date, status, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(id.to_string())
                .bind(&request.container_sku)
                .bind(&request.customer_name)
                .bind(per_diem_cents)
                .bind(request.start_date)
                .bind(request.end_date)
                .bind(LeaseStatus::Active.as_str())
                .bind(now)
                .execute(pool)
                .await?;
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO leases (id, container_sku, customer_name, per_diem_cents, start_date, end_date, status, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(id.to_string())
                .bind(&request.container_sku)
                .bind(&request.customer_name)
                .bind(per_diem_cents)
                .bind(request.start_date)
                .bind(request.end_date)
                .bind(LeaseStatus::Active.as_str())
                .bind(now)
                .execute(pool)
                .await?;
            }
        }

        tracing::info!("Opened lease {} on {}", id, request.container_sku);
        self.get_lease(id).await
    }

    pub async fn get_lease(&self, id: Uuid) -> AppResult<Lease> {
        let lease = match &self.db {
            DatabasePool::Postgres(pool) => {
                let row = sqlx::query(&format!("SELECT {} FROM leases WHERE id = $1", LEASE_COLUMNS))
                    .bind(id.to_string())
                    .fetch_optional(pool)
                    .await?;
                row.as_ref().map(lease_from_pg).transpose()?
            }
            DatabasePool::Sqlite(pool) => {
                let row = sqlx::query(&format!("SELECT {} FROM leases WHERE id = ?", LEASE_COLUMNS))
                    .bind(id.to_string())
                    .fetch_optional(pool)
                    .await?;
                row.as_ref().map(lease_from_sqlite).transpose()?
            }
        };

        lease.ok_or_else(|| AppError::NotFound(format!("Lease {} not found", id)))
    }

    pub async fn list_leases(&self, status: Option<LeaseStatus>) -> AppResult<Vec<Lease>> {
        match &self.db {
            DatabasePool::Postgres(pool) => {
                let rows = match status {
                    Some(status) => {
                        sqlx::query(&format!(
                            "SELECT {} FROM leases WHERE status = $1 ORDER BY start_date, id",
                            LEASE_COLUMNS
                        ))
                        .bind(status.as_str())
                        .fetch_all(pool)
                        .await?
                    }
                    None => {
                        sqlx::query(&format!(
                            "SELECT {} FROM leases ORDER BY start_date, id",
                            LEASE_COLUMNS
                        ))
                        .fetch_all(pool)
                        .await?
                    }
                };
                rows.iter().map(lease_from_pg).collect()
            }
            DatabasePool::Sqlite(pool) => {
                let rows = match status {
                    Some(status) => {
                        sqlx::query(&format!(
                            "SELECT {} FROM leases WHERE status = ? ORDER BY start_date, id",
                            LEASE_COLUMNS
                        ))
                        .bind(status.as_str())
                        .fetch_all(pool)
                        .await?
                    }
                    None => {
                        sqlx::query(&format!(
                            "SELECT {} FROM leases ORDER BY start_date, id",
                            LEASE_COLUMNS
                        ))
                        .fetch_all(pool)
                        .await?
                    }
                };
                rows.iter().map(lease_from_sqlite).collect()
            }
        }
    }

    /// Ends an active lease. Days up to the end date remain billable.
    pub async fn close_lease(&self, id: Uuid, request: CloseLeaseRequest) -> AppResult<Lease> {
        let lease = self.get_lease(id).await?;
        if lease.status == LeaseStatus::Closed {
            return Err(AppError::Conflict(format!("Lease {} is already closed", id)));
        }

        let end_date = request
            .end_date
            .or(lease.end_date)
            .unwrap_or_else(|| Utc::now().date_naive());
        if end_date < lease.start_date {
            return Err(AppError::BadRequest(format!(
                "End date {} precedes lease start {}",
                end_date, lease.start_date
            )));
        }

        match &self.db {
            DatabasePool::Postgres(pool) => {
                sqlx::query("UPDATE leases SET status = $1, end_date = $2 WHERE id = $3")
                    .bind(LeaseStatus::Closed.as_str())
                    .bind(end_date)
                    .bind(id.to_string())
                    .execute(pool)
                    .await?;
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query("UPDATE leases SET status = ?, end_date = ? WHERE id = ?")
                    .bind(LeaseStatus::Closed.as_str())
                    .bind(end_date)
                    .bind(id.to_string())
                    .execute(pool)
                    .await?;
            }
        }

        tracing::info!("Closed lease {} as of {}", id, end_date);
        self.get_lease(id).await
    }

    pub async fn list_charges(&self, id: Uuid) -> AppResult<Vec<LeaseCharge>> {
        // 404 for unknown leases rather than an empty list
        self.get_lease(id).await?;

        match &self.db {
            DatabasePool::Postgres(pool) => {
                let rows = sqlx::query(
                    "SELECT id, lease_id, charge_date, amount_cents, created_at FROM lease_charges WHERE lease_id = $1 ORDER BY charge_date",
                )
                .bind(id.to_string())
                .fetch_all(pool)
                .await?;
                rows.iter().map(charge_from_pg).collect()
            }
            DatabasePool::Sqlite(pool) => {
                let rows = sqlx::query(
                    "SELECT id, lease_id, charge_date, amount_cents, created_at FROM lease_charges WHERE lease_id = ? ORDER BY charge_date",
                )
                .bind(id.to_string())
                .fetch_all(pool)
                .await?;
                rows.iter().map(charge_from_sqlite).collect()
            }
        }
    }

    /// Raises one charge per unbilled lease day up to `today`.
    ///
    /// Each lease is billed in its own transaction that also advances
    /// `billed_through`. Charges are unique per lease and day, so a repeated
    /// sweep for the same day creates nothing.
    pub async fn sweep(&self, today: NaiveDate) -> AppResult<SweepSummary> {
        let mut summary = SweepSummary {
            run_date: Some(today),
            ..Default::default()
        };

        for lease in self.list_leases(None).await? {
            let days = lease.unbilled_days(today);
            let Some(last_day) = days.last().copied() else {
                continue;
            };

            let created = self.bill_days(&lease, &days, last_day).await?;
            summary.leases_processed += 1;
            summary.charges_created += created;
            summary.total_amount += lease.per_diem_rate * Decimal::from(created);
        }

        tracing::info!(
            "Billing sweep for {}: {} leases, {} charges, total {}",
            today,
            summary.leases_processed,
            summary.charges_created,
            summary.total_amount
        );
        Ok(summary)
    }

    async fn bill_days(&self, lease: &Lease, days: &[NaiveDate], last_day: NaiveDate) -> AppResult<u32> {
        let amount_cents = to_cents(lease.per_diem_rate)?;
        let lease_id = lease.id.to_string();
        let now = Utc::now();
        let mut created: u64 = 0;

        match &self.db {
            DatabasePool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                for day in days {
                    created += sqlx::query(
                        r#"
                        INSERT INTO lease_charges (lease_id, charge_date, amount_cents, created_at)
                        VALUES ($1, $2, $3, $4)
                        ON CONFLICT (lease_id, charge_date) DO NOTHING
                        "#,
                    )
                    .bind(&lease_id)
                    .bind(*day)
                    .bind(amount_cents)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                }
                sqlx::query("UPDATE leases SET billed_through = $1 WHERE id = $2")
                    .bind(last_day)
                    .bind(&lease_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
            DatabasePool::Sqlite(pool) => {
                let mut tx = pool.begin().await?;
                for day in days {
                    created += sqlx::query(
                        r#"
                        INSERT INTO lease_charges (lease_id, charge_date, amount_cents, created_at)
                        VALUES (?, ?, ?, ?)
                        ON CONFLICT (lease_id, charge_date) DO NOTHING
                        "#,
                    )
                    .bind(&lease_id)
                    .bind(*day)
                    .bind(amount_cents)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                }
                sqlx::query("UPDATE leases SET billed_through = ? WHERE id = ?")
                    .bind(last_day)
                    .bind(&lease_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
        }

        u32::try_from(created)
            .map_err(|_| AppError::InternalServerError("Charge count overflow".to_string()))
    }
}

#[async_trait]
impl SweepJob for LeaseService {
    async fn run(&self, today: NaiveDate) -> AppResult<SweepSummary> {
        self.sweep(today).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::container_service::tests::seeded_pool;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn lease_request(sku: &str, rate_cents: i64) -> CreateLeaseRequest {
        CreateLeaseRequest {
            container_sku: sku.to_string(),
            customer_name: "Acme Storage".to_string(),
            per_diem_rate: Decimal::new(rate_cents, 2),
            start_date: day(1),
            end_date: None,
        }
    }

    #[tokio::test]
    async fn create_requires_existing_container() {
        let service = LeaseService::new(seeded_pool().await);
        let lease = service.create_lease(lease_request("DEN-40HC-001", 250)).await.unwrap();
        assert_eq!(lease.status, LeaseStatus::Active);
        assert_eq!(lease.per_diem_rate, Decimal::new(250, 2));
        assert_eq!(lease.billed_through, None);

        assert!(matches!(
            service.create_lease(lease_request("NOPE", 250)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let service = LeaseService::new(seeded_pool().await);
        let lease = service.create_lease(lease_request("DEN-40HC-001", 250)).await.unwrap();

        let first = service.sweep(day(3)).await.unwrap();
        assert_eq!(first.leases_processed, 1);
        assert_eq!(first.charges_created, 3);
        assert_eq!(first.total_amount, Decimal::new(750, 2));

        let again = service.sweep(day(3)).await.unwrap();
        assert_eq!(again.charges_created, 0);
        assert_eq!(again.leases_processed, 0);

        let later = service.sweep(day(5)).await.unwrap();
        assert_eq!(later.charges_created, 2);

        let charges = service.list_charges(lease.id).await.unwrap();
        let dates: Vec<_> = charges.iter().map(|c| c.charge_date).collect();
        assert_eq!(dates, vec![day(1), day(2), day(3), day(4), day(5)]);
        assert_eq!(
            service.get_lease(lease.id).await.unwrap().billed_through,
            Some(day(5))
        );
    }

    #[tokio::test]
    async fn closed_leases_bill_through_end_date_only() {
        let service = LeaseService::new(seeded_pool().await);
        let lease = service.create_lease(lease_request("ATL-20DV-001", 100)).await.unwrap();

        let closed = service
            .close_lease(lease.id, CloseLeaseRequest { end_date: Some(day(4)) })
            .await
            .unwrap();
        assert_eq!(closed.status, LeaseStatus::Closed);

        let summary = service.sweep(day(20)).await.unwrap();
        assert_eq!(summary.charges_created, 4);

        assert!(matches!(
            service.close_lease(lease.id, CloseLeaseRequest::default()).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn leased_containers_cannot_be_deleted() {
        let pool = seeded_pool().await;
        let service = LeaseService::new(pool.clone());
        service.create_lease(lease_request("ATL-40HC-002", 100)).await.unwrap();

        let containers = crate::services::ContainerService::new(pool);
        assert!(matches!(
            containers.delete_container("ATL-40HC-002").await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(containers.delete_except(&[]).await.unwrap(), 4);
        assert!(containers.container_exists("ATL-40HC-002").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_lease_is_not_found() {
        let service = LeaseService::new(seeded_pool().await);
        assert!(matches!(
            service.list_charges(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
