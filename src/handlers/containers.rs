use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Container, CreateContainerRequest, UpdateContainerRequest};

pub async fn create_container(
    State((container_service, ..)): State<crate::AppState>,
    Json(request): Json<CreateContainerRequest>,
) -> AppResult<(StatusCode, Json<Container>)> {
    request
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let container = container_service.create_container(request).await?;
    Ok((StatusCode::CREATED, Json(container)))
}

pub async fn get_container(
    State((container_service, ..)): State<crate::AppState>,
    Path(sku): Path<String>,
) -> AppResult<Json<Container>> {
    let container = container_service.get_container(&sku).await?;
    Ok(Json(container))
}

pub async fn update_container(
    State((container_service, ..)): State<crate::AppState>,
    Path(sku): Path<String>,
    Json(request): Json<UpdateContainerRequest>,
) -> AppResult<Json<Container>> {
    request
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let container = container_service.update_container(&sku, request).await?;
    Ok(Json(container))
}

pub async fn delete_container(
    State((container_service, ..)): State<crate::AppState>,
    Path(sku): Path<String>,
) -> AppResult<StatusCode> {
    container_service.delete_container(&sku).await?;
    Ok(StatusCode::NO_CONTENT)
}
