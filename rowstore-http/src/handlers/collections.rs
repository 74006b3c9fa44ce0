use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rowstore::{CollectionInfo, DeletionReport, RowStoreError};
use serde::Deserialize;

use super::{AppState, OwnerParams};

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    #[serde(default)]
    pub owner: String,
    pub collection: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// POST /1/collections
pub async fn create_collection(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCollectionRequest>,
) -> Result<(StatusCode, Json<CollectionInfo>), RowStoreError> {
    if body.collection.trim().is_empty() {
        return Err(RowStoreError::InvalidRecord("collection is required".into()));
    }
    let owner = state.manager.owner_or_default(&body.owner);
    let info = state.manager.collections().create(
        &owner,
        &body.collection,
        body.name,
        body.description,
        body.tags,
    );
    Ok((StatusCode::CREATED, Json(info)))
}

/// GET /1/collections?owner=
pub async fn list_collections(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OwnerParams>,
) -> Json<serde_json::Value> {
    let owner = state.manager.owner_or_default(&params.owner);
    let items = state.manager.collections().list(&owner);
    Json(serde_json::json!({
        "owner": owner,
        "nbCollections": items.len(),
        "items": items,
    }))
}

/// GET /1/collections/:collection/partitions?owner=
pub async fn list_partitions(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<serde_json::Value>, RowStoreError> {
    let partitions = state
        .manager
        .list_partitions(&params.owner, &collection)
        .await?;
    Ok(Json(serde_json::json!({
        "collection": collection,
        "partitions": partitions,
    })))
}

/// DELETE /1/collections/:collection?owner=
///
/// Deletes every row, catalog entry and vector collection of the collection,
/// then unregisters it. Safe to repeat after a partial failure.
pub async fn delete_collection(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<DeletionReport>, RowStoreError> {
    let report = state
        .manager
        .delete_collection(&params.owner, &collection)
        .await?;
    Ok(Json(report))
}

/// DELETE /1/collections/:collection/schemas/:schema?owner=
pub async fn delete_collection_schema(
    State(state): State<Arc<AppState>>,
    Path((collection, schema)): Path<(String, String)>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<DeletionReport>, RowStoreError> {
    let report = state
        .manager
        .delete_schema(&params.owner, &collection, &schema)
        .await?;
    Ok(Json(report))
}
