//! Fuzzy-to-exact resolution: nearest-neighbour candidates from the vector
//! index, each looked up exactly in the row store.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingQueryService;
use crate::error::{Result, RowStoreError};
use crate::retry::{retry, RetryPolicy};
use crate::rows::RowQueryService;
use crate::types::{OwnerId, RowEmbeddingsRequest, RowIndexMatch, RowQuery, RowRecord};
use crate::vector::embedder::TextEmbedder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub owner: OwnerId,
    pub collection: String,
    pub schema_name: String,
    /// Free text to embed. Ignored when `vectors` is given.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub vectors: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// A fuzzy candidate and the rows stored under its exact key. `rows` may be
/// empty when the row writer has not caught up with the embedding stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMatch {
    #[serde(flatten)]
    pub candidate: RowIndexMatch,
    pub rows: Vec<RowRecord>,
}

pub struct FuzzyResolver {
    embedder: Option<Arc<dyn TextEmbedder>>,
    embeddings: EmbeddingQueryService,
    rows: RowQueryService,
    retry: RetryPolicy,
}

impl FuzzyResolver {
    pub fn new(
        embedder: Option<Arc<dyn TextEmbedder>>,
        embeddings: EmbeddingQueryService,
        rows: RowQueryService,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            embeddings,
            rows,
            retry,
        }
    }

    /// Candidates best first, one per distinct `(index_name, index_value)`.
    pub async fn resolve(&self, request: &ResolveRequest) -> Result<Vec<ResolvedMatch>> {
        let vectors = self.query_vectors(request).await?;
        let candidates = self
            .embeddings
            .search(&RowEmbeddingsRequest {
                vectors,
                owner: request.owner.clone(),
                collection: request.collection.clone(),
                schema_name: request.schema_name.clone(),
                index_name: request.index_name.clone(),
                limit: request.limit,
            })
            .await?;

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for candidate in candidates {
            if !seen.insert((candidate.index_name.clone(), candidate.index_value.clone())) {
                continue;
            }
            let rows = self
                .rows
                .query(&RowQuery {
                    owner: request.owner.clone(),
                    collection: request.collection.clone(),
                    schema_name: request.schema_name.clone(),
                    index_name: candidate.index_name.clone(),
                    index_value: candidate.index_value.clone(),
                })
                .await?;
            if rows.is_empty() {
                tracing::debug!(
                    "Candidate {} = {:?} has no rows yet",
                    candidate.index_name,
                    candidate.index_value
                );
            }
            resolved.push(ResolvedMatch { candidate, rows });
        }
        resolved.sort_by(|a, b| b.candidate.score.total_cmp(&a.candidate.score));

        tracing::info!(
            "Resolved {} candidates for {}/{}",
            resolved.len(),
            request.collection,
            request.schema_name
        );
        Ok(resolved)
    }

    async fn query_vectors(&self, request: &ResolveRequest) -> Result<Vec<Vec<f32>>> {
        if let Some(vectors) = &request.vectors {
            return Ok(vectors.clone());
        }
        let text = request
            .text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RowStoreError::InvalidQuery("either text or vectors is required".into()))?;
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            RowStoreError::InvalidQuery("no embedder is configured; supply vectors instead".into())
        })?;
        let vector = retry(&self.retry, "embed query", || async move {
            embedder.embed_query(text).await.map_err(RowStoreError::from)
        })
        .await?;
        Ok(vec![vector])
    }
}
