use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::catalog::PartitionCatalog;
use super::registration::RegistrationCache;
use super::store::RowStore;
use crate::collections::CollectionRegistry;
use crate::error::{Result, RowStoreError};
use crate::retry::{retry, RetryPolicy};
use crate::schema::SchemaRegistry;
use crate::vector::naming::{matches_schema_prefix, schema_prefix};
use crate::vector::store::VectorStore;

/// Outcome of a completed deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    pub owner: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub partitions_deleted: usize,
    pub vector_collections_dropped: Vec<String>,
}

/// Bulk deletion of a collection, or one schema within it, across the row
/// store, the partition catalog and the vector store.
///
/// Row partitions go first, then vector collections, then catalog entries.
/// If any partition cannot be deleted the catalog is left untouched and
/// `InconsistentPartitionState` is returned; calling again converges.
pub struct DeletionOrchestrator {
    store: Arc<dyn RowStore>,
    catalog: PartitionCatalog,
    vectors: Arc<dyn VectorStore>,
    schemas: Arc<SchemaRegistry>,
    collections: Arc<CollectionRegistry>,
    cache: Arc<RegistrationCache>,
    retry: RetryPolicy,
}

impl DeletionOrchestrator {
    pub fn new(
        store: Arc<dyn RowStore>,
        vectors: Arc<dyn VectorStore>,
        schemas: Arc<SchemaRegistry>,
        collections: Arc<CollectionRegistry>,
        cache: Arc<RegistrationCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            catalog: PartitionCatalog::new(Arc::clone(&store)),
            store,
            vectors,
            schemas,
            collections,
            cache,
            retry,
        }
    }

    /// Delete every row, vector collection and catalog entry of a
    /// collection, and forget the collection itself.
    pub async fn delete_collection(&self, owner: &str, collection: &str) -> Result<DeletionReport> {
        tracing::info!("Deleting collection {}/{}", owner, collection);
        let report = self.delete(owner, collection, None).await?;
        if self.collections.remove(owner, collection) {
            tracing::info!("Collection {}/{} unregistered", owner, collection);
        }
        Ok(report)
    }

    /// Delete the rows, vector collections and catalog entries of one schema
    /// within a collection.
    pub async fn delete_schema(
        &self,
        owner: &str,
        collection: &str,
        schema_name: &str,
    ) -> Result<DeletionReport> {
        tracing::info!("Deleting schema {} of {}/{}", schema_name, owner, collection);
        self.delete(owner, collection, Some(schema_name)).await
    }

    async fn delete(
        &self,
        owner: &str,
        collection: &str,
        schema_name: Option<&str>,
    ) -> Result<DeletionReport> {
        let partitions = retry(&self.retry, "list partitions", || {
            self.catalog.partitions(owner, collection, schema_name)
        })
        .await?;

        let mut pending = 0;
        for partition in &partitions {
            let deleted = retry(&self.retry, "delete partition", || {
                self.store.delete_partition(owner, partition)
            })
            .await;
            if let Err(e) = deleted {
                tracing::error!(
                    "Failed to delete partition {}/{}/{}: {}",
                    collection,
                    partition.schema_name,
                    partition.index_name,
                    e
                );
                pending += 1;
            }
        }
        if pending > 0 {
            return Err(RowStoreError::InconsistentPartitionState {
                collection: collection.to_string(),
                pending,
            });
        }

        // Schemas that may own vector collections: those with rows plus those
        // currently defined, since embeddings can exist without stored rows.
        let schema_names: BTreeSet<String> = match schema_name {
            Some(name) => BTreeSet::from([name.to_string()]),
            None => partitions
                .iter()
                .map(|p| p.schema_name.clone())
                .chain(self.schemas.names())
                .collect(),
        };
        let dropped = self
            .drop_vector_collections(owner, collection, &schema_names)
            .await?;

        retry(&self.retry, "delete partition entries", || {
            self.catalog.remove(owner, collection, schema_name)
        })
        .await?;

        match schema_name {
            Some(name) => self.cache.invalidate(owner, collection, name),
            None => self.cache.invalidate_collection(owner, collection),
        }

        tracing::info!(
            "Deleted {} partitions and {} vector collections from {}/{}",
            partitions.len(),
            dropped.len(),
            owner,
            collection
        );
        Ok(DeletionReport {
            owner: owner.to_string(),
            collection: collection.to_string(),
            schema_name: schema_name.map(str::to_string),
            partitions_deleted: partitions.len(),
            vector_collections_dropped: dropped,
        })
    }

    async fn drop_vector_collections(
        &self,
        owner: &str,
        collection: &str,
        schema_names: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        let vectors = &self.vectors;
        let existing = retry(&self.retry, "list vector collections", || async move {
            vectors.list_collections().await.map_err(RowStoreError::from)
        })
        .await?;
        let prefixes: Vec<String> = schema_names
            .iter()
            .map(|s| schema_prefix(owner, collection, s))
            .collect();

        let mut dropped = Vec::new();
        for name in existing {
            if !prefixes.iter().any(|p| matches_schema_prefix(&name, p)) {
                continue;
            }
            let target = name.as_str();
            retry(&self.retry, "drop vector collection", || async move {
                vectors
                    .delete_collection(target)
                    .await
                    .map_err(RowStoreError::from)
            })
            .await?;
            tracing::info!("Dropped vector collection {}", name);
            dropped.push(name);
        }
        dropped.sort();
        Ok(dropped)
    }
}
