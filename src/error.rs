use http::StatusCode;
use thiserror::Error;

use crate::vector::VectorError;

#[derive(Error, Debug, Clone)]
pub enum RowStoreError {
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Collection not found: {owner}/{collection}")]
    CollectionNotFound { owner: String, collection: String },

    #[error("Transient failure during {operation}: {message}")]
    Transient { operation: String, message: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Partial embedding failure: {failed} of {total} texts failed to embed")]
    PartialEmbedding { failed: usize, total: usize },

    #[error("Inconsistent partition state for collection {collection}: {pending} partition(s) still pending deletion")]
    InconsistentPartitionState { collection: String, pending: usize },

    #[error("Stream closed: {0}")]
    StreamClosed(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RowStoreError>;

impl RowStoreError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        RowStoreError::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether re-running the failed operation may succeed.
    ///
    /// `InconsistentPartitionState` counts as transient: a deletion that left
    /// partitions behind converges when it is invoked again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RowStoreError::Transient { .. } | RowStoreError::InconsistentPartitionState { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RowStoreError::SchemaNotFound(_) => StatusCode::NOT_FOUND,
            RowStoreError::InvalidSchema(_) => StatusCode::BAD_REQUEST,
            RowStoreError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
            RowStoreError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            RowStoreError::CollectionNotFound { .. } => StatusCode::NOT_FOUND,
            RowStoreError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RowStoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RowStoreError::Embedding(_) => StatusCode::BAD_GATEWAY,
            RowStoreError::PartialEmbedding { .. } => StatusCode::BAD_GATEWAY,
            RowStoreError::InconsistentPartitionState { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RowStoreError::StreamClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            RowStoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RowStoreError::Json(_) => StatusCode::BAD_REQUEST,
            RowStoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for RowStoreError {
    fn from(e: std::io::Error) -> Self {
        RowStoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RowStoreError {
    fn from(e: serde_json::Error) -> Self {
        RowStoreError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for RowStoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            RowStoreError::transient("http request", e.to_string())
        } else {
            RowStoreError::Store(e.to_string())
        }
    }
}

impl From<VectorError> for RowStoreError {
    fn from(e: VectorError) -> Self {
        match e {
            VectorError::Unavailable(msg) => RowStoreError::transient("vector store", msg),
            VectorError::EmbeddingUnavailable(msg) => RowStoreError::transient("embedding", msg),
            VectorError::EmbeddingError(msg) => RowStoreError::Embedding(msg),
            VectorError::DimensionMismatch { expected, got } => RowStoreError::InvalidQuery(
                format!("dimension mismatch: expected {expected}, got {got}"),
            ),
            other => RowStoreError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── status_code mapping ─────────────────────────────────────────────

    #[test]
    fn schema_not_found_is_404() {
        let e = RowStoreError::SchemaNotFound("customers".into());
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn collection_not_found_is_404() {
        let e = RowStoreError::CollectionNotFound {
            owner: "alice".into(),
            collection: "geo".into(),
        };
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_record_is_400() {
        let e = RowStoreError::InvalidRecord("no values".into());
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn transient_is_503() {
        let e = RowStoreError::transient("insert row", "connection reset");
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn inconsistent_partition_state_is_503() {
        let e = RowStoreError::InconsistentPartitionState {
            collection: "geo".into(),
            pending: 2,
        };
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn embedding_is_502() {
        let e = RowStoreError::Embedding("model offline".into());
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);
    }

    // ── transient classification ────────────────────────────────────────

    #[test]
    fn transient_and_inconsistent_state_are_retryable() {
        assert!(RowStoreError::transient("op", "timeout").is_transient());
        assert!(RowStoreError::InconsistentPartitionState {
            collection: "c".into(),
            pending: 1
        }
        .is_transient());
    }

    #[test]
    fn schema_errors_are_not_retryable() {
        assert!(!RowStoreError::SchemaNotFound("s".into()).is_transient());
        assert!(!RowStoreError::Store("corrupt".into()).is_transient());
        assert!(!RowStoreError::PartialEmbedding { failed: 1, total: 2 }.is_transient());
    }

    // ── Display ─────────────────────────────────────────────────────────

    #[test]
    fn transient_display_includes_operation() {
        let e = RowStoreError::transient("delete partition", "timed out");
        let msg = e.to_string();
        assert!(msg.contains("delete partition"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn partial_embedding_display_counts() {
        let e = RowStoreError::PartialEmbedding { failed: 1, total: 3 };
        assert_eq!(
            e.to_string(),
            "Partial embedding failure: 1 of 3 texts failed to embed"
        );
    }

    // ── From conversions ────────────────────────────────────────────────

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RowStoreError = io_err.into();
        assert!(matches!(err, RowStoreError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: RowStoreError = json_err.into();
        assert!(matches!(err, RowStoreError::Json(_)));
    }

    #[test]
    fn vector_unavailable_becomes_transient() {
        let err: RowStoreError = VectorError::Unavailable("qdrant down".into()).into();
        assert!(err.is_transient());
    }

    #[test]
    fn vector_embedding_error_is_not_transient() {
        let err: RowStoreError = VectorError::EmbeddingError("bad response".into()).into();
        assert!(matches!(err, RowStoreError::Embedding(_)));
        assert!(!err.is_transient());
    }
}

// Axum IntoResponse implementation (feature-gated)
#[cfg(feature = "axum-support")]
use axum::response::{IntoResponse, Json, Response};
#[cfg(feature = "axum-support")]
use serde::Serialize;

#[cfg(feature = "axum-support")]
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[cfg(feature = "axum-support")]
impl IntoResponse for RowStoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error_code, suggestion) = match &self {
            RowStoreError::SchemaNotFound(_) => (
                "schema_not_found",
                Some("Register the schema first with PUT /1/schemas/:name".to_string()),
            ),
            RowStoreError::InvalidSchema(_) => ("invalid_schema", None),
            RowStoreError::InvalidRecord(_) => ("invalid_record", None),
            RowStoreError::InvalidQuery(_) => ("invalid_query", None),
            RowStoreError::CollectionNotFound { .. } => (
                "collection_not_found",
                Some("Create the collection first with POST /1/collections".to_string()),
            ),
            RowStoreError::Transient { .. } => {
                ("transient_failure", Some("Retry after a short delay".to_string()))
            }
            RowStoreError::Store(_) => ("store_error", None),
            RowStoreError::Embedding(_) => ("embedding_error", None),
            RowStoreError::PartialEmbedding { .. } => ("partial_embedding_failure", None),
            RowStoreError::InconsistentPartitionState { .. } => (
                "inconsistent_partition_state",
                Some("Re-run the same deletion; it is idempotent".to_string()),
            ),
            RowStoreError::StreamClosed(_) => ("stream_closed", None),
            RowStoreError::Io(_) => ("io_error", None),
            RowStoreError::Json(_) => ("json_error", None),
            RowStoreError::Config(_) => ("config_error", None),
        };

        let body = ErrorResponse {
            error: error_code.to_string(),
            message: self.to_string(),
            request_id: format!("req_rs_{}", uuid::Uuid::new_v4()),
            suggestion,
        };

        let mut response = (status, Json(body)).into_response();
        if self.is_transient() {
            response
                .headers_mut()
                .insert(http::header::RETRY_AFTER, http::HeaderValue::from_static("1"));
        }
        response
    }
}
