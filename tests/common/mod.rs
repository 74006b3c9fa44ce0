#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use rowstore::rows::MemoryRowStore;
use rowstore::vector::embedder::TextEmbedder;
use rowstore::vector::memory::MemoryVectorStore;
use rowstore::vector::VectorError;
use rowstore::{
    Backends, Config, ExtractedRecord, Metadata, PartitionKey, RetryPolicy, RowRecord, RowStore,
    RowStoreError, RowStoreManager,
};

/// Letter-frequency embedding over A-Z. Texts sharing letters score close,
/// which is enough to make fuzzy street lookups deterministic.
pub struct LetterEmbedder;

pub fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 26];
    for c in text.to_ascii_uppercase().bytes() {
        if c.is_ascii_uppercase() {
            v[(c - b'A') as usize] += 1.0;
        }
    }
    v
}

#[async_trait]
impl TextEmbedder for LetterEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|t| letter_vector(t)).collect())
    }
}

/// Row store whose `delete_partition` fails a fixed number of times before
/// delegating.
pub struct FlakyRowStore {
    pub inner: MemoryRowStore,
    delete_failures: AtomicUsize,
}

impl FlakyRowStore {
    pub fn new(delete_failures: usize) -> Self {
        Self {
            inner: MemoryRowStore::new(),
            delete_failures: AtomicUsize::new(delete_failures),
        }
    }

    pub fn fail_next_deletes(&self, n: usize) {
        self.delete_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl RowStore for FlakyRowStore {
    async fn insert_row(&self, keyspace: &str, row: RowRecord) -> rowstore::Result<()> {
        self.inner.insert_row(keyspace, row).await
    }

    async fn select_rows(
        &self,
        keyspace: &str,
        partition: &PartitionKey,
        index_value: &[String],
    ) -> rowstore::Result<Vec<RowRecord>> {
        self.inner.select_rows(keyspace, partition, index_value).await
    }

    async fn delete_partition(&self, keyspace: &str, partition: &PartitionKey) -> rowstore::Result<()> {
        let remaining = self.delete_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.delete_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RowStoreError::transient("delete partition", "node unreachable"));
        }
        self.inner.delete_partition(keyspace, partition).await
    }

    async fn insert_partition_entry(
        &self,
        keyspace: &str,
        entry: &PartitionKey,
    ) -> rowstore::Result<()> {
        self.inner.insert_partition_entry(keyspace, entry).await
    }

    async fn select_partition_entries(
        &self,
        keyspace: &str,
        collection: &str,
    ) -> rowstore::Result<Vec<PartitionKey>> {
        self.inner.select_partition_entries(keyspace, collection).await
    }

    async fn delete_partition_entries(
        &self,
        keyspace: &str,
        collection: &str,
        schema_name: Option<&str>,
    ) -> rowstore::Result<()> {
        self.inner
            .delete_partition_entries(keyspace, collection, schema_name)
            .await
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
    }
}

pub fn config() -> Config {
    Config {
        retry: fast_retry(),
        ..Config::default()
    }
}

/// Manager over in-memory stores with the letter embedder, so both the row
/// writer and the embedding stages run.
pub fn manager_with_embeddings() -> (Arc<RowStoreManager>, Arc<MemoryVectorStore>) {
    let vectors = Arc::new(MemoryVectorStore::new());
    let embedder: Arc<dyn TextEmbedder> = Arc::new(LetterEmbedder);
    let backends = Backends {
        rows: Arc::new(MemoryRowStore::new()),
        vectors: vectors.clone(),
        embedder: Some(embedder),
    };
    (RowStoreManager::new(config(), backends).unwrap(), vectors)
}

pub fn manager_with_rows(rows: Arc<dyn RowStore>) -> Arc<RowStoreManager> {
    let backends = Backends {
        rows,
        vectors: Arc::new(MemoryVectorStore::new()),
        embedder: None,
    };
    RowStoreManager::new(config(), backends).unwrap()
}

pub fn record(owner: &str, collection: &str, schema: &str, row: serde_json::Value) -> ExtractedRecord {
    let row: IndexMap<String, serde_json::Value> = serde_json::from_value(row).unwrap();
    ExtractedRecord::single(
        Metadata {
            id: format!("{collection}/{schema}"),
            owner: owner.to_string(),
            collection: collection.to_string(),
            source: "integration".to_string(),
        },
        schema,
        row,
    )
}
