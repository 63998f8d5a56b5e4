use axum::{
    extract::{Query, State},
    Json,
};

use crate::models::{SearchParams, SearchQuery, SearchResult};

/// Always 200: search failures surface as an empty result.
pub async fn search_containers(
    State((_, _, search_service, ..)): State<crate::AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResult> {
    let query = SearchQuery::from_params(params);
    Json(search_service.search(&query).await)
}
