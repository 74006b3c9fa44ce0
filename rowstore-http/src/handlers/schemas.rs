use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use rowstore::{RowSchema, RowStoreError};

use super::AppState;

/// PUT /1/schemas/:name
///
/// The body is a schema document; its `name` defaults to the path segment.
pub async fn put_schema(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, RowStoreError> {
    let schema = RowSchema::from_json(&name, &body)?;
    let indexes = schema.index_names();
    state.manager.put_schema(&name, schema)?;
    Ok(Json(serde_json::json!({
        "name": name,
        "indexes": indexes,
        "updatedAt": chrono::Utc::now().to_rfc3339(),
    })))
}

/// GET /1/schemas
pub async fn list_schemas(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "schemas": state.manager.schemas().all() }))
}

/// GET /1/schemas/:name
pub async fn get_schema(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RowSchema>, RowStoreError> {
    Ok(Json(state.manager.get_schema(&name)?))
}

/// DELETE /1/schemas/:name
///
/// Only the definition goes away; stored rows stay until their collection or
/// schema is deleted through the collection routes.
pub async fn delete_schema(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, RowStoreError> {
    state.manager.remove_schema(&name)?;
    Ok(Json(serde_json::json!({
        "name": name,
        "deletedAt": chrono::Utc::now().to_rfc3339(),
    })))
}
