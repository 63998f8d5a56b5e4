use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub billing: BillingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Paging and radius policy for container search.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub page_size: u32,
    /// Radius used when an origin is given without one.
    pub default_radius_miles: f64,
    /// Requests above this are replaced by the fallback radius.
    pub hard_limit_miles: f64,
    pub fallback_radius_miles: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: 12,
            default_radius_miles: 500.0,
            hard_limit_miles: 1000.0,
            fallback_radius_miles: 5000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let search = SearchConfig::default();

        let s = ConfigBuilder::builder()
            .set_default("database.url", "sqlite://container_exchange.db")?
            .set_default("database.max_connections", i64::from(default_max_connections()))?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("search.page_size", i64::from(search.page_size))?
            .set_default("search.default_radius_miles", search.default_radius_miles)?
            .set_default("search.hard_limit_miles", search.hard_limit_miles)?
            .set_default("search.fallback_radius_miles", search.fallback_radius_miles)?
            .set_default("billing.enabled", true)?
            .set_default("billing.sweep_interval_secs", 3600)?
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // This file shouldn't be checked in to git
            .add_source(File::with_name("config/local").required(false))
            // Eg.. `EXCHANGE__SEARCH__PAGE_SIZE=24 ./target/app`
            .add_source(
                Environment::with_prefix("EXCHANGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            // Conventional deployment variables win over everything else
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("server.host", env::var("SERVER_HOST").ok())?
            .set_override_option(
                "server.port",
                env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse::<u16>().ok())
                    .map(i64::from),
            )?
            .build()?;

        let config: Config = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.search.page_size == 0 {
            return Err(ConfigError::Message(
                "search.page_size must be at least 1".to_string(),
            ));
        }
        if self.search.fallback_radius_miles < self.search.hard_limit_miles {
            return Err(ConfigError::Message(
                "search.fallback_radius_miles must not be below search.hard_limit_miles"
                    .to_string(),
            ));
        }
        if self.billing.enabled && self.billing.sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "billing.sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
