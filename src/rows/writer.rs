use std::collections::BTreeSet;
use std::sync::Arc;

use super::catalog::PartitionCatalog;
use super::registration::RegistrationCache;
use super::store::RowStore;
use crate::collections::CollectionRegistry;
use crate::error::{Result, RowStoreError};
use crate::retry::{retry, RetryPolicy};
use crate::schema::{build_index_value, is_empty_index_value, SchemaRegistry};
use crate::types::{ExtractedRecord, PartitionKey, RowRecord};

/// What one call to [`RowWriter::write`] persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Index-keyed copies written.
    pub rows_written: usize,
    /// Copies skipped because their index value was empty. Their partition
    /// is still registered, so it may hold no rows until a later record
    /// fills it; deletion handles empty partitions.
    pub rows_skipped: usize,
    /// Whether catalog entries were (re)registered for this record.
    pub registered: bool,
}

/// Expands each incoming row into one copy per index of its schema and
/// persists them, registering new partitions in the catalog first.
pub struct RowWriter {
    store: Arc<dyn RowStore>,
    catalog: PartitionCatalog,
    schemas: Arc<SchemaRegistry>,
    collections: Arc<CollectionRegistry>,
    cache: Arc<RegistrationCache>,
    retry: RetryPolicy,
}

impl RowWriter {
    pub fn new(
        store: Arc<dyn RowStore>,
        schemas: Arc<SchemaRegistry>,
        collections: Arc<CollectionRegistry>,
        cache: Arc<RegistrationCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            catalog: PartitionCatalog::new(Arc::clone(&store)),
            store,
            schemas,
            collections,
            cache,
            retry,
        }
    }

    pub fn cache(&self) -> &Arc<RegistrationCache> {
        &self.cache
    }

    /// Persist every row of `record` under every index active on its schema
    /// right now.
    ///
    /// `SchemaNotFound` and `CollectionNotFound` are fatal to this record.
    /// Transient store failures are retried per the writer's policy and then
    /// returned; re-running the whole record is safe.
    pub async fn write(&self, record: &ExtractedRecord) -> Result<WriteSummary> {
        let owner = record.metadata.owner.as_str();
        let collection = record.metadata.collection.as_str();
        let schema_name = record.schema_name.as_str();

        self.collections.require(owner, collection)?;
        let schema = self
            .schemas
            .get(schema_name)
            .ok_or_else(|| RowStoreError::SchemaNotFound(schema_name.to_string()))?;
        let index_names = schema.index_names();

        let mut summary = WriteSummary {
            registered: self
                .ensure_registered(owner, collection, schema_name, &index_names)
                .await?,
            ..WriteSummary::default()
        };

        for values in &record.values {
            let data = schema.project(values);
            for index_name in &index_names {
                let index_value = build_index_value(&data, index_name);
                if is_empty_index_value(&index_value) {
                    summary.rows_skipped += 1;
                    continue;
                }
                let row = RowRecord {
                    collection: collection.to_string(),
                    schema_name: schema_name.to_string(),
                    index_name: index_name.clone(),
                    index_value,
                    data: data.clone(),
                    source: record.metadata.source.clone(),
                };
                tracing::debug!(
                    "Writing row {}/{} index {} = {:?}",
                    collection,
                    schema_name,
                    row.index_name,
                    row.index_value
                );
                retry(&self.retry, "insert row", || {
                    self.store.insert_row(owner, row.clone())
                })
                .await?;
                summary.rows_written += 1;
            }
        }

        tracing::info!(
            "Stored record {} for {}/{}: {} rows across {} indexes ({} skipped)",
            record.metadata.id,
            collection,
            schema_name,
            summary.rows_written,
            index_names.len(),
            summary.rows_skipped
        );
        Ok(summary)
    }

    /// Write one catalog entry per index unless the cache says this exact
    /// index set is already registered. The cache is only updated once every
    /// entry is written, so a failure retries the whole set next time.
    async fn ensure_registered(
        &self,
        owner: &str,
        collection: &str,
        schema_name: &str,
        index_names: &[String],
    ) -> Result<bool> {
        let wanted: BTreeSet<String> = index_names.iter().cloned().collect();
        if self.cache.get(owner, collection, schema_name).as_ref() == Some(&wanted) {
            return Ok(false);
        }

        for index_name in &wanted {
            let entry = PartitionKey {
                collection: collection.to_string(),
                schema_name: schema_name.to_string(),
                index_name: index_name.clone(),
            };
            retry(&self.retry, "register partition", || {
                self.catalog.register(owner, &entry)
            })
            .await?;
        }

        tracing::info!(
            "Registered {} partitions for {}/{}: {:?}",
            wanted.len(),
            collection,
            schema_name,
            wanted
        );
        self.cache
            .mark_registered(owner, collection, schema_name, wanted);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{MemoryRowStore, RowQueryService};
    use crate::schema::{Field, RowSchema};
    use crate::types::{Metadata, RowQuery};
    use indexmap::IndexMap;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryRowStore>,
        schemas: Arc<SchemaRegistry>,
        collections: Arc<CollectionRegistry>,
        writer: RowWriter,
    }

    fn fixture(enforce: bool) -> Fixture {
        let store = Arc::new(MemoryRowStore::new());
        let schemas = Arc::new(SchemaRegistry::new());
        let collections = Arc::new(CollectionRegistry::new(enforce));
        let cache = Arc::new(RegistrationCache::subscribed(&schemas));
        let writer = RowWriter::new(
            store.clone(),
            Arc::clone(&schemas),
            Arc::clone(&collections),
            cache,
            RetryPolicy::none(),
        );
        Fixture {
            store,
            schemas,
            collections,
            writer,
        }
    }

    fn customers(with_status_index: bool) -> RowSchema {
        let mut status = Field::new("status");
        status.indexed = with_status_index;
        RowSchema::new(
            "customers",
            vec![Field::new("email").indexed(), status, Field::new("region")],
        )
    }

    fn record(rows: Vec<serde_json::Value>) -> ExtractedRecord {
        ExtractedRecord {
            metadata: Metadata {
                id: "doc-1".into(),
                owner: "alice".into(),
                collection: "crm".into(),
                source: "upload.csv".into(),
            },
            schema_name: "customers".into(),
            values: rows
                .into_iter()
                .map(|v| serde_json::from_value::<IndexMap<String, serde_json::Value>>(v).unwrap())
                .collect(),
        }
    }

    fn query(index_name: &str, value: &[&str]) -> RowQuery {
        RowQuery {
            owner: "alice".into(),
            collection: "crm".into(),
            schema_name: "customers".into(),
            index_name: index_name.into(),
            index_value: value.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn writes_one_copy_per_index() {
        let f = fixture(false);
        f.schemas.put("customers", customers(true)).unwrap();
        let summary = f
            .writer
            .write(&record(vec![json!({"email": "foo@bar.com", "status": "active", "extra": 1})]))
            .await
            .unwrap();
        assert_eq!(summary.rows_written, 2);
        assert!(summary.registered);

        let rows = RowQueryService::new(f.store.clone(), RetryPolicy::none())
            .query(&query("status", &["active"]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, "upload.csv");
        assert!(!rows[0].data.contains_key("extra"));
    }

    #[tokio::test]
    async fn unknown_schema_is_fatal() {
        let f = fixture(false);
        let err = f
            .writer
            .write(&record(vec![json!({"email": "x"})]))
            .await
            .unwrap_err();
        assert!(matches!(err, RowStoreError::SchemaNotFound(_)));
        assert!(!err.is_transient());
        assert_eq!(f.store.row_count(), 0);
    }

    #[tokio::test]
    async fn enforced_collections_reject_unknown() {
        let f = fixture(true);
        f.schemas.put("customers", customers(false)).unwrap();
        let err = f
            .writer
            .write(&record(vec![json!({"email": "x"})]))
            .await
            .unwrap_err();
        assert!(matches!(err, RowStoreError::CollectionNotFound { .. }));

        f.collections.create("alice", "crm", None, None, vec![]);
        assert!(f.writer.write(&record(vec![json!({"email": "x"})])).await.is_ok());
    }

    #[tokio::test]
    async fn empty_index_values_are_skipped() {
        let f = fixture(false);
        f.schemas.put("customers", customers(true)).unwrap();
        let summary = f
            .writer
            .write(&record(vec![json!({"email": "foo@bar.com", "status": null})]))
            .await
            .unwrap();
        assert_eq!(summary.rows_written, 1);
        assert_eq!(summary.rows_skipped, 1);
    }

    #[tokio::test]
    async fn registration_is_cached_until_index_set_changes() {
        let f = fixture(false);
        f.schemas.put("customers", customers(false)).unwrap();
        let first = f.writer.write(&record(vec![json!({"email": "a"})])).await.unwrap();
        let second = f.writer.write(&record(vec![json!({"email": "b"})])).await.unwrap();
        assert!(first.registered);
        assert!(!second.registered);

        f.schemas.put("customers", customers(true)).unwrap();
        let third = f
            .writer
            .write(&record(vec![json!({"email": "c", "status": "new"})]))
            .await
            .unwrap();
        assert!(third.registered);

        let catalog = PartitionCatalog::new(f.store.clone());
        assert_eq!(
            catalog.list_schema_indexes("alice", "crm", "customers").await.unwrap(),
            vec!["email", "status"]
        );
    }
}
