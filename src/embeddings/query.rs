use std::sync::Arc;

use crate::error::{Result, RowStoreError};
use crate::retry::{retry, RetryPolicy};
use crate::types::{ErrorInfo, RowEmbeddingsRequest, RowEmbeddingsResponse, RowIndexMatch};
use crate::vector::naming::{dimensions_of, matches_schema_prefix, schema_prefix};
use crate::vector::store::VectorStore;
use crate::vector::VectorError;

pub const QUERY_ERROR_TYPE: &str = "row-embeddings-query-error";

/// Nearest-neighbour search over every dimensionality of one schema's vector
/// collections. Never touches the row store.
#[derive(Clone)]
pub struct EmbeddingQueryService {
    vectors: Arc<dyn VectorStore>,
    retry: RetryPolicy,
}

impl EmbeddingQueryService {
    pub fn new(vectors: Arc<dyn VectorStore>, retry: RetryPolicy) -> Self {
        Self { vectors, retry }
    }

    /// Run a query, reporting failure inside the response body.
    pub async fn query(&self, request: &RowEmbeddingsRequest) -> RowEmbeddingsResponse {
        match self.search(request).await {
            Ok(matches) => RowEmbeddingsResponse {
                error: None,
                matches,
            },
            Err(e) => {
                tracing::error!(
                    "Row embeddings query on {}/{} failed: {}",
                    request.collection,
                    request.schema_name,
                    e
                );
                RowEmbeddingsResponse {
                    error: Some(ErrorInfo {
                        kind: QUERY_ERROR_TYPE.to_string(),
                        message: e.to_string(),
                    }),
                    matches: Vec::new(),
                }
            }
        }
    }

    /// Up to `limit` matches per query vector, best first, concatenated in
    /// query-vector order.
    pub async fn search(&self, request: &RowEmbeddingsRequest) -> Result<Vec<RowIndexMatch>> {
        for (what, value) in [
            ("owner", &request.owner),
            ("collection", &request.collection),
            ("schema_name", &request.schema_name),
        ] {
            if value.trim().is_empty() {
                return Err(RowStoreError::InvalidQuery(format!("{what} is required")));
            }
        }
        if request.vectors.iter().any(|v| v.is_empty()) {
            return Err(RowStoreError::InvalidQuery("empty query vector".into()));
        }
        if request.limit == 0 || request.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let prefix = schema_prefix(&request.owner, &request.collection, &request.schema_name);
        let vectors = &self.vectors;
        let names: Vec<String> = retry(&self.retry, "list vector collections", || async move {
            vectors.list_collections().await.map_err(RowStoreError::from)
        })
        .await?
        .into_iter()
        .filter(|n| matches_schema_prefix(n, &prefix))
        .collect();
        if names.is_empty() {
            tracing::debug!("No vector collections under {}", prefix);
            return Ok(Vec::new());
        }

        let filter = request.index_name.as_deref();
        let mut results = Vec::new();
        for vector in &request.vectors {
            let mut merged: Vec<RowIndexMatch> = Vec::new();
            for name in names.iter().filter(|n| dimensions_of(n) == Some(vector.len())) {
                let hits = retry(&self.retry, "vector search", || async move {
                    match vectors.search(name, vector, filter, request.limit).await {
                        // Dropped between listing and searching.
                        Err(VectorError::CollectionNotFound(_)) => Ok(Vec::new()),
                        other => other.map_err(RowStoreError::from),
                    }
                })
                .await?;
                merged.extend(hits.into_iter().map(|p| RowIndexMatch {
                    index_name: p.payload.index_name,
                    index_value: p.payload.index_value,
                    text: p.payload.text,
                    score: p.score,
                }));
            }
            merged.sort_by(|a, b| b.score.total_cmp(&a.score));
            merged.truncate(request.limit);
            results.extend(merged);
        }

        tracing::debug!(
            "Row embeddings query on {}: {} matches from {} collections",
            prefix,
            results.len(),
            names.len()
        );
        Ok(results)
    }
}
