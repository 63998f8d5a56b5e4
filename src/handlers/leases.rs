use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{CloseLeaseRequest, CreateLeaseRequest, Lease, LeaseCharge, LeaseStatus};

#[derive(Debug, Deserialize)]
pub struct LeasesQuery {
    pub status: Option<LeaseStatus>,
}

pub async fn list_leases(
    State((_, _, _, _, lease_service, _)): State<crate::AppState>,
    Query(params): Query<LeasesQuery>,
) -> AppResult<Json<Vec<Lease>>> {
    let leases = lease_service.list_leases(params.status).await?;
    Ok(Json(leases))
}

pub async fn create_lease(
    State((_, _, _, _, lease_service, _)): State<crate::AppState>,
    Json(request): Json<CreateLeaseRequest>,
) -> AppResult<(StatusCode, Json<Lease>)> {
    request
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let lease = lease_service.create_lease(request).await?;
    Ok((StatusCode::CREATED, Json(lease)))
}

pub async fn get_lease(
    State((_, _, _, _, lease_service, _)): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Lease>> {
    let lease = lease_service.get_lease(id).await?;
    Ok(Json(lease))
}

/// The body is optional; without one the lease ends today.
pub async fn close_lease(
    State((_, _, _, _, lease_service, _)): State<crate::AppState>,
    Path(id): Path<Uuid>,
    request: Option<Json<CloseLeaseRequest>>,
) -> AppResult<Json<Lease>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let lease = lease_service.close_lease(id, request).await?;
    Ok(Json(lease))
}

pub async fn list_lease_charges(
    State((_, _, _, _, lease_service, _)): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<LeaseCharge>>> {
    let charges = lease_service.list_charges(id).await?;
    Ok(Json(charges))
}
