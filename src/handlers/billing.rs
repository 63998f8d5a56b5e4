use axum::{extract::State, http::StatusCode, Json};

use crate::error::{AppError, AppResult};
use crate::services::TickOutcome;

/// Runs a sweep now. 409 while a scheduled sweep is still running.
pub async fn trigger_sweep(
    State((.., scheduler)): State<crate::AppState>,
) -> AppResult<(StatusCode, Json<TickOutcome>)> {
    match scheduler.trigger().await {
        TickOutcome::Failed { error } => Err(AppError::InternalServerError(error)),
        outcome @ TickOutcome::Skipped => Ok((StatusCode::CONFLICT, Json(outcome))),
        outcome => Ok((StatusCode::OK, Json(outcome))),
    }
}
