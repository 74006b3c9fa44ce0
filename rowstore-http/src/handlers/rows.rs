use std::sync::Arc;

use axum::{extract::State, Json};
use rowstore::{ResolveRequest, RowQuery, RowStoreError};

use super::AppState;

/// POST /1/rows/query
pub async fn query_rows(
    State(state): State<Arc<AppState>>,
    Json(query): Json<RowQuery>,
) -> Result<Json<serde_json::Value>, RowStoreError> {
    let rows = state.manager.query_rows(&query).await?;
    Ok(Json(serde_json::json!({
        "nbRows": rows.len(),
        "rows": rows,
    })))
}

/// POST /1/rows/resolve
///
/// Fuzzy candidates from the vector index, each with the rows stored under
/// its exact key.
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<serde_json::Value>, RowStoreError> {
    let matches = state.manager.resolve(&request).await?;
    Ok(Json(serde_json::json!({ "matches": matches })))
}
