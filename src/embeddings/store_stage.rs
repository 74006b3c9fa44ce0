use std::sync::Arc;

use dashmap::DashMap;

use crate::collections::CollectionRegistry;
use crate::error::{Result, RowStoreError};
use crate::retry::{retry, RetryPolicy};
use crate::types::RowEmbeddings;
use crate::vector::naming::collection_name;
use crate::vector::store::{NewPoint, VectorStore};
use crate::vector::{PointPayload, VectorError};

/// Writes computed embeddings into per-`(owner, collection, schema,
/// dimensionality)` vector collections, creating them on first use.
pub struct EmbeddingStoreStage {
    vectors: Arc<dyn VectorStore>,
    collections: Arc<CollectionRegistry>,
    retry: RetryPolicy,
    /// Vector collections this stage has seen exist.
    created: DashMap<String, usize>,
}

impl EmbeddingStoreStage {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        collections: Arc<CollectionRegistry>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            vectors,
            collections,
            retry,
            created: DashMap::new(),
        }
    }

    /// Upsert every vector of every tuple as a new point. Returns the number
    /// of points written.
    pub async fn store(&self, message: &RowEmbeddings) -> Result<usize> {
        let owner = &message.metadata.owner;
        let collection = &message.metadata.collection;
        if !self.collections.exists(owner, collection) {
            tracing::warn!(
                "Collection {} for owner {} is not registered, dropping embeddings for {}",
                collection,
                owner,
                message.metadata.id
            );
            return Ok(0);
        }

        let mut written = 0;
        for embedding in &message.embeddings {
            if embedding.vectors.is_empty() {
                tracing::warn!("No vectors for index {}, skipping", embedding.index_name);
                continue;
            }
            for vector in &embedding.vectors {
                if vector.is_empty() {
                    tracing::warn!("Empty vector for index {}, skipping", embedding.index_name);
                    continue;
                }
                let name = collection_name(owner, collection, &message.schema_name, vector.len());
                let point = NewPoint {
                    id: uuid::Uuid::new_v4().to_string(),
                    vector: vector.clone(),
                    payload: PointPayload {
                        index_name: embedding.index_name.clone(),
                        index_value: embedding.index_value.clone(),
                        text: embedding.text.clone(),
                    },
                };
                self.upsert(&name, vector.len(), point).await?;
                written += 1;
            }
        }

        tracing::info!(
            "Wrote {} embeddings for {}/{} from {}",
            written,
            collection,
            message.schema_name,
            message.metadata.id
        );
        Ok(written)
    }

    async fn upsert(&self, name: &str, dimensions: usize, point: NewPoint) -> Result<()> {
        self.ensure_collection(name, dimensions).await?;
        let vectors = &self.vectors;
        let point = &point;
        retry(&self.retry, "upsert embedding", || async move {
            match vectors.upsert(name, vec![point.clone()]).await {
                // Dropped by a deletion after this stage cached it.
                Err(VectorError::CollectionNotFound(_)) => {
                    tracing::warn!("Vector collection {} vanished, recreating", name);
                    vectors
                        .create_collection(name, dimensions)
                        .await
                        .map_err(RowStoreError::from)?;
                    vectors
                        .upsert(name, vec![point.clone()])
                        .await
                        .map_err(RowStoreError::from)
                }
                other => other.map_err(RowStoreError::from),
            }
        })
        .await
    }

    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.created.contains_key(name) {
            return Ok(());
        }
        let vectors = &self.vectors;
        retry(&self.retry, "create vector collection", || async move {
            if vectors
                .collection_exists(name)
                .await
                .map_err(RowStoreError::from)?
            {
                return Ok(());
            }
            tracing::info!(
                "Creating vector collection {} with dimension {}",
                name,
                dimensions
            );
            vectors
                .create_collection(name, dimensions)
                .await
                .map_err(RowStoreError::from)
        })
        .await?;
        self.created.insert(name.to_string(), dimensions);
        Ok(())
    }
}
