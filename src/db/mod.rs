use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Postgres, Sqlite};
use std::str::FromStr;

use crate::config::Config;
use crate::error::{AppError, AppResult};

static POSTGRES_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgres");
static SQLITE_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

#[derive(Clone)]
pub enum DatabasePool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Placeholder syntax of the backing database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => "?".to_string(),
        }
    }
}

/// A dynamically built query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

impl DatabasePool {
    pub async fn new(config: &Config) -> AppResult<Self> {
        Self::connect(&config.database.url, config.database.max_connections).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(database_url)
                .await?;

            Ok(DatabasePool::Postgres(pool))
        } else if database_url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(database_url)?
                .create_if_missing(true)
                .foreign_keys(true);

            let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
            if database_url.contains(":memory:") {
                // Every connection to :memory: is a separate database, so keep exactly one alive
                pool_options = pool_options
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None);
            }
            let pool = pool_options.connect_with(options).await?;

            Ok(DatabasePool::Sqlite(pool))
        } else {
            Err(AppError::ConfigError(config::ConfigError::Message(
                "Invalid database URL. Must start with postgres:// or sqlite:".to_string(),
            )))
        }
    }

    pub async fn migrate(&self) -> AppResult<()> {
        match self {
            DatabasePool::Postgres(pool) => POSTGRES_MIGRATOR.run(pool).await?,
            DatabasePool::Sqlite(pool) => SQLITE_MIGRATOR.run(pool).await?,
        }
        Ok(())
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            DatabasePool::Postgres(_) => Dialect::Postgres,
            DatabasePool::Sqlite(_) => Dialect::Sqlite,
        }
    }
}

pub fn bind_postgres<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(value) => query.bind(value.clone()),
            SqlParam::Int(value) => query.bind(*value),
        };
    }
    query
}

pub fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Text(value) => query.bind(value.clone()),
            SqlParam::Int(value) => query.bind(*value),
        };
    }
    query
}

/// A migrated in-memory SQLite database for tests.
#[cfg(test)]
pub async fn memory_pool() -> DatabasePool {
    let pool = DatabasePool::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory sqlite");
    pool.migrate().await.expect("migrations");
    pool
}
