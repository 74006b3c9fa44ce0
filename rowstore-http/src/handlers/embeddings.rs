use std::sync::Arc;

use axum::{extract::State, Json};
use rowstore::{RowEmbeddingsRequest, RowEmbeddingsResponse};

use super::AppState;

/// POST /1/row-embeddings/query
///
/// Always 200: query failures are reported in the body's `error` field.
pub async fn query_embeddings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RowEmbeddingsRequest>,
) -> Json<RowEmbeddingsResponse> {
    Json(state.manager.query_embeddings(&request).await)
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::{send, state};
    use crate::server::build_router;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn empty_vector_reports_error_in_body() {
        let state = state();
        let manager = std::sync::Arc::clone(&state.manager);
        let app = build_router(state);

        let (status, json) = send(
            &app,
            "POST",
            "/1/row-embeddings/query",
            Some(json!({
                "vectors": [[]],
                "collection": "geo",
                "schema_name": "streets"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["error"]["type"], "row-embeddings-query-error");
        assert_eq!(json["matches"], json!([]));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn zero_limit_returns_no_matches() {
        let state = state();
        let manager = std::sync::Arc::clone(&state.manager);
        let app = build_router(state);

        let (status, json) = send(
            &app,
            "POST",
            "/1/row-embeddings/query",
            Some(json!({
                "vectors": [[0.5, 0.5]],
                "collection": "geo",
                "schema_name": "streets",
                "limit": 0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.get("error").is_none());
        assert_eq!(json["matches"], json!([]));
        manager.shutdown().await;
    }
}
