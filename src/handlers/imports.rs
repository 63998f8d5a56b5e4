use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::services::{ImportMode, ImportSummary};

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub mode: ImportMode,
}

pub async fn import_containers(
    State((_, _, _, import_service, ..)): State<crate::AppState>,
    Query(params): Query<ImportQuery>,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let summary = import_service.import_containers(&body, params.mode).await?;
    Ok(Json(summary))
}

pub async fn import_depots(
    State((_, _, _, import_service, ..)): State<crate::AppState>,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let summary = import_service.import_depots(&body).await?;
    Ok(Json(summary))
}
