use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod search;
mod services;

use crate::config::Config;
use crate::db::DatabasePool;
use crate::services::{
    BillingScheduler, ContainerService, DepotService, ImportService, LeaseService, SearchService,
};

pub type AppState = (
    Arc<ContainerService>,
    Arc<DepotService>,
    Arc<SearchService>,
    Arc<ImportService>,
    Arc<LeaseService>,
    Arc<BillingScheduler>,
);

/// Wires every service onto one pool. The scheduler is built but not started.
fn build_state(db_pool: DatabasePool, config: &Config) -> AppState {
    let container_service = Arc::new(ContainerService::new(db_pool.clone()));
    let depot_service = Arc::new(DepotService::new(db_pool.clone()));
    let search_service = Arc::new(SearchService::new(container_service.clone(), &config.search));
    let import_service = Arc::new(ImportService::new(
        container_service.clone(),
        depot_service.clone(),
    ));
    let lease_service = Arc::new(LeaseService::new(db_pool));
    let scheduler = Arc::new(BillingScheduler::new(
        lease_service.clone(),
        Duration::from_secs(config.billing.sweep_interval_secs),
    ));

    (
        container_service,
        depot_service,
        search_service,
        import_service,
        lease_service,
        scheduler,
    )
}

fn build_router(app_state: AppState) -> Router {
    let api_routes = Router::new()
        // Search
        .route("/search", get(handlers::search_containers))
        // Container routes
        .route("/containers", post(handlers::create_container))
        .route(
            "/containers/:sku",
            get(handlers::get_container)
                .put(handlers::update_container)
                .delete(handlers::delete_container),
        )
        // Depot routes
        .route(
            "/depots",
            get(handlers::list_depots).post(handlers::upsert_depot),
        )
        .route(
            "/depots/:code",
            get(handlers::get_depot).delete(handlers::delete_depot),
        )
        .route("/geocode/:postal_code", get(handlers::geocode))
        // Batch import routes
        .route("/imports/containers", post(handlers::import_containers))
        .route("/imports/depots", post(handlers::import_depots))
        // Lease routes
        .route(
            "/leases",
            get(handlers::list_leases).post(handlers::create_lease),
        )
        .route("/leases/:id", get(handlers::get_lease))
        .route("/leases/:id/close", post(handlers::close_lease))
        .route("/leases/:id/charges", get(handlers::list_lease_charges))
        // Billing
        .route("/billing/sweep", post(handlers::trigger_sweep))
        .with_state(app_state);

    Router::new()
        .route("/", get(root))
        .route("/api/v1/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_credentials(false),
        )
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "container_exchange_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting container exchange server...");

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded: {:?}", config);

    // Initialize database connection
    let db_pool = DatabasePool::new(&config).await?;
    info!("Database connection established");

    // Run migrations
    db_pool.migrate().await?;
    info!("Database migrations completed");

    let app_state = build_state(db_pool, &config);
    let scheduler = app_state.5.clone();
    if config.billing.enabled {
        scheduler.start();
    } else {
        info!("Billing scheduler disabled");
    }

    let app = build_router(app_state);

    // Start server
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn root() -> &'static str {
    "Container Exchange Server"
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::{BillingConfig, DatabaseConfig, SearchConfig, ServerConfig};
    use crate::services::container_service::tests::seeded_pool;

    fn test_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            search: SearchConfig::default(),
            billing: BillingConfig {
                enabled: false,
                sweep_interval_secs: 3600,
            },
        }
    }

    async fn app() -> Router {
        build_router(build_state(seeded_pool().await, &test_config()))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = tokio_test::assert_ok!(app.oneshot(request).await);
        let status = response.status();
        let bytes = tokio_test::assert_ok!(to_bytes(response.into_body(), usize::MAX).await);
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, json: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = app().await.oneshot(get("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn search_filters_by_query_string() {
        let (status, body) = send(
            app().await,
            get("/api/v1/search?type=40HC&condition=Brand%20New&max_price=6500"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_results"], 1);
        assert_eq!(body["containers"][0]["sku"], "ATL-40HC-002");
        assert_eq!(body["containers"][0]["condition"], "Brand New");
        assert_eq!(body["using_fallback"], false);
    }

    #[tokio::test]
    async fn search_ignores_garbage_parameters() {
        let (status, body) = send(
            app().await,
            get("/api/v1/search?page=abc&max_price=cheap&radius=far"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_page"], 1);
        assert_eq!(body["total_results"], 5);
    }

    #[tokio::test]
    async fn search_from_dallas_reports_fallback() {
        let (_, body) = send(
            app().await,
            get("/api/v1/search?lat=32.7767&lng=-96.7970&radius=100&type=20DV"),
        )
        .await;
        assert_eq!(body["using_fallback"], true);
        assert_eq!(body["containers"][0]["depot_code"], "DEN");
    }

    #[tokio::test]
    async fn missing_container_is_404() {
        let (status, body) = send(app().await, get("/api/v1/containers/NOPE")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("NOPE"));
    }

    #[tokio::test]
    async fn invalid_container_is_rejected() {
        let (status, _) = send(
            app().await,
            post_json(
                "/api/v1/containers",
                serde_json::json!({
                    "sku": "",
                    "container_type": "20DV",
                    "condition": "As-Is",
                    "quantity": 1,
                    "price": 100,
                    "depot_code": "ATL"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn geocode_known_postal_code() {
        let (status, body) = send(app().await, get("/api/v1/geocode/75201")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["city"], "Dallas");
        assert_eq!(body["approximate"], false);
    }

    #[tokio::test]
    async fn depot_proximity_listing() {
        let (status, body) = send(
            app().await,
            get("/api/v1/depots?lat=33.75&lng=-84.39&radius=50"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let depots = body["depots"].as_array().unwrap();
        assert_eq!(depots.len(), 1);
        assert_eq!(depots[0]["code"], "ATL");
        assert!(depots[0]["distance_miles"].as_f64().unwrap() < 1.0);
    }

    #[tokio::test]
    async fn lease_then_manual_sweep() {
        let app = app().await;
        let (status, lease) = send(
            app.clone(),
            post_json(
                "/api/v1/leases",
                serde_json::json!({
                    "container_sku": "DEN-40HC-001",
                    "customer_name": "Acme Storage",
                    "per_diem_rate": 2.5,
                    "start_date": "2024-01-01",
                    "end_date": "2024-01-10"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, sweep) = send(
            app.clone(),
            Request::builder()
                .method("POST")
                .uri("/api/v1/billing/sweep")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sweep["status"], "completed");
        assert_eq!(sweep["charges_created"], 10);

        let id = lease["id"].as_str().unwrap();
        let (_, charges) = send(app, get(&format!("/api/v1/leases/{}/charges", id))).await;
        assert_eq!(charges.as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn replace_import_over_http() {
        let app = app().await;
        let csv = "sku,type,condition,quantity,price,depot_name\nATL-40HC-002,40HC,Brand New,1,6000,Atlanta Depot\n";
        let (status, summary) = send(
            app,
            Request::builder()
                .method("POST")
                .uri("/api/v1/imports/containers?mode=replace")
                .header("content-type", "text/csv")
                .body(Body::from(csv))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["updated"], 1);
        assert_eq!(summary["deleted"], 4);
    }
}
