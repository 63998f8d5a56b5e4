use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Depot, UpsertDepotRequest, UpsertOutcome};
use crate::search::{geocode_postal_code, Coordinate, GeocodeResult};

#[derive(Debug, Deserialize)]
pub struct DepotsQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<f64>,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Serialize)]
pub struct DepotEntry {
    #[serde(flatten)]
    pub depot: Depot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct DepotsListResponse {
    pub depots: Vec<DepotEntry>,
}

/// Radius used by the proximity listing when none is given.
const DEFAULT_DEPOT_RADIUS_MILES: f64 = 500.0;

pub async fn list_depots(
    State((_, depot_service, ..)): State<crate::AppState>,
    Query(params): Query<DepotsQuery>,
) -> AppResult<Json<DepotsListResponse>> {
    let origin = match (params.lat, params.lng) {
        (Some(lat), Some(lng)) => Some(
            Coordinate::checked(lat, lng)
                .ok_or_else(|| AppError::BadRequest("Coordinates out of range".to_string()))?,
        ),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "lat and lng must be given together".to_string(),
            ))
        }
    };

    let depots = match origin {
        Some(origin) => {
            let radius = params
                .radius
                .filter(|r| r.is_finite() && *r > 0.0)
                .unwrap_or(DEFAULT_DEPOT_RADIUS_MILES);
            depot_service
                .depots_near(origin, radius, params.active_only)
                .await?
                .into_iter()
                .map(|near| DepotEntry {
                    depot: near.depot,
                    distance_miles: Some(near.distance_miles),
                })
                .collect()
        }
        None => depot_service
            .list_depots(params.active_only)
            .await?
            .into_iter()
            .map(|depot| DepotEntry {
                depot,
                distance_miles: None,
            })
            .collect(),
    };

    Ok(Json(DepotsListResponse { depots }))
}

pub async fn get_depot(
    State((_, depot_service, ..)): State<crate::AppState>,
    Path(code): Path<String>,
) -> AppResult<Json<Depot>> {
    let depot = depot_service.get_depot(&code).await?;
    Ok(Json(depot))
}

pub async fn upsert_depot(
    State((_, depot_service, ..)): State<crate::AppState>,
    Json(request): Json<UpsertDepotRequest>,
) -> AppResult<(StatusCode, Json<Depot>)> {
    request
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let (depot, outcome) = depot_service.upsert_depot(request).await?;
    let status = match outcome {
        UpsertOutcome::Inserted => StatusCode::CREATED,
        UpsertOutcome::Updated => StatusCode::OK,
    };
    Ok((status, Json(depot)))
}

pub async fn delete_depot(
    State((_, depot_service, ..)): State<crate::AppState>,
    Path(code): Path<String>,
) -> AppResult<StatusCode> {
    depot_service.delete_depot(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn geocode(Path(postal_code): Path<String>) -> AppResult<Json<GeocodeResult>> {
    geocode_postal_code(&postal_code)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Cannot geocode {:?}", postal_code)))
}
