use std::sync::Arc;

use indexmap::IndexMap;

use crate::collections::CollectionRegistry;
use crate::error::{Result, RowStoreError};
use crate::retry::{retry, RetryPolicy};
use crate::schema::{build_index_value, embedding_text, is_empty_index_value, RowSchema, SchemaRegistry};
use crate::types::{EmbeddingFailure, ExtractedRecord, RowEmbeddings, RowIndexEmbedding};
use crate::vector::embedder::TextEmbedder;

/// Default number of embeddings per output message.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 10;

/// Computes one embedding per distinct index text of a record and fans it
/// out to every index that produced the text.
pub struct EmbeddingComputeStage {
    embedder: Arc<dyn TextEmbedder>,
    schemas: Arc<SchemaRegistry>,
    collections: Arc<CollectionRegistry>,
    retry: RetryPolicy,
    batch_size: usize,
}

impl EmbeddingComputeStage {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        schemas: Arc<SchemaRegistry>,
        collections: Arc<CollectionRegistry>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            schemas,
            collections,
            retry,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }

    /// Maximum embeddings per output message; 0 puts everything in one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Output messages for one record. Empty when the record is dropped or
    /// has nothing to embed.
    ///
    /// A text that fails to embed is reported in `failures` of the first
    /// message while the other texts proceed. If every text failed and at
    /// least one failure was transient the whole record fails transiently
    /// so it is redelivered.
    pub async fn compute(&self, record: &ExtractedRecord) -> Result<Vec<RowEmbeddings>> {
        let owner = &record.metadata.owner;
        let collection = &record.metadata.collection;
        if !self.collections.exists(owner, collection) {
            tracing::warn!(
                "Collection {} for owner {} is not registered, dropping record {}",
                collection,
                owner,
                record.metadata.id
            );
            return Ok(Vec::new());
        }
        let schema = self
            .schemas
            .get(&record.schema_name)
            .ok_or_else(|| RowStoreError::SchemaNotFound(record.schema_name.clone()))?;
        if schema.index_names().is_empty() {
            tracing::warn!("Schema {} has no indexes, skipping", record.schema_name);
            return Ok(Vec::new());
        }

        let texts = texts_to_embed(&schema, record);
        if texts.is_empty() {
            tracing::info!("No texts to embed for record {}", record.metadata.id);
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        let mut failures = Vec::new();
        let mut transient_failure = None;
        for (text, targets) in texts {
            match self.embed(&text).await {
                Ok(vector) => {
                    embeddings.extend(targets.into_iter().map(|(index_name, index_value)| {
                        RowIndexEmbedding {
                            index_name,
                            index_value,
                            text: text.clone(),
                            vectors: vec![vector.clone()],
                        }
                    }));
                }
                Err(e) => {
                    tracing::warn!("Failed to embed {:?} for {} index(es): {}", text, targets.len(), e);
                    if e.is_transient() {
                        transient_failure = Some(e.clone());
                    }
                    failures.extend(targets.into_iter().map(|(index_name, index_value)| {
                        EmbeddingFailure {
                            index_name,
                            index_value,
                            text: text.clone(),
                            error: e.to_string(),
                        }
                    }));
                }
            }
        }

        if embeddings.is_empty() {
            if let Some(e) = transient_failure {
                return Err(e);
            }
        }
        if !failures.is_empty() {
            let err = RowStoreError::PartialEmbedding {
                failed: failures.len(),
                total: failures.len() + embeddings.len(),
            };
            tracing::warn!("Record {}: {}", record.metadata.id, err);
        }

        tracing::info!(
            "Computed {} embeddings for {} rows of {} ({} failed)",
            embeddings.len(),
            record.values.len(),
            record.schema_name,
            failures.len()
        );
        Ok(self.split(record, embeddings, failures))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = &self.embedder;
        let mut vectors = retry(&self.retry, "embed text", || async move {
            embedder
                .embed_documents(&[text])
                .await
                .map_err(RowStoreError::from)
        })
        .await?;
        vectors
            .pop()
            .ok_or_else(|| RowStoreError::Embedding("embedder returned no vector".into()))
    }

    fn split(
        &self,
        record: &ExtractedRecord,
        embeddings: Vec<RowIndexEmbedding>,
        failures: Vec<EmbeddingFailure>,
    ) -> Vec<RowEmbeddings> {
        let size = if self.batch_size == 0 {
            embeddings.len().max(1)
        } else {
            self.batch_size
        };
        let mut batches: Vec<Vec<RowIndexEmbedding>> = Vec::new();
        let mut rest = embeddings.into_iter().peekable();
        while rest.peek().is_some() {
            batches.push(rest.by_ref().take(size).collect());
        }
        if batches.is_empty() {
            batches.push(Vec::new());
        }

        let mut failures = Some(failures);
        batches
            .into_iter()
            .map(|embeddings| RowEmbeddings {
                metadata: record.metadata.clone(),
                schema_name: record.schema_name.clone(),
                embeddings,
                failures: failures.take().unwrap_or_default(),
            })
            .collect()
    }
}

/// Distinct texts of a record, each mapped to every distinct
/// `(index_name, index_value)` that produced it. Empty index values are
/// skipped.
pub fn texts_to_embed(
    schema: &RowSchema,
    record: &ExtractedRecord,
) -> IndexMap<String, Vec<(String, Vec<String>)>> {
    let index_names = schema.index_names();
    let mut texts: IndexMap<String, Vec<(String, Vec<String>)>> = IndexMap::new();
    for values in &record.values {
        let data = schema.project(values);
        for index_name in &index_names {
            let index_value = build_index_value(&data, index_name);
            if is_empty_index_value(&index_value) {
                continue;
            }
            let targets = texts.entry(embedding_text(&index_value)).or_default();
            if !targets
                .iter()
                .any(|(name, value)| name == index_name && *value == index_value)
            {
                targets.push((index_name.clone(), index_value));
            }
        }
    }
    texts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use crate::types::Metadata;
    use crate::vector::VectorError;
    use async_trait::async_trait;
    use serde_json::json;

    /// Embeds a text as `[len, 1.0]`; texts containing "fail" error out.
    struct LengthEmbedder {
        transient: bool,
    }

    #[async_trait]
    impl TextEmbedder for LengthEmbedder {
        async fn embed_documents(&self, texts: &[&str]) -> std::result::Result<Vec<Vec<f32>>, VectorError> {
            texts
                .iter()
                .map(|t| {
                    if t.contains("fail") {
                        Err(if self.transient {
                            VectorError::EmbeddingUnavailable("down".into())
                        } else {
                            VectorError::EmbeddingError("bad input".into())
                        })
                    } else {
                        Ok(vec![t.len() as f32, 1.0])
                    }
                })
                .collect()
        }
    }

    struct CountingEmbedder(Arc<std::sync::atomic::AtomicUsize>);

    #[async_trait]
    impl TextEmbedder for CountingEmbedder {
        async fn embed_documents(&self, texts: &[&str]) -> std::result::Result<Vec<Vec<f32>>, VectorError> {
            self.0.fetch_add(texts.len(), std::sync::atomic::Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn stage(transient: bool) -> EmbeddingComputeStage {
        let schemas = Arc::new(SchemaRegistry::new());
        schemas
            .put(
                "customers",
                RowSchema::new(
                    "customers",
                    vec![
                        Field::new("email").indexed(),
                        Field::new("region"),
                        Field::new("status"),
                    ],
                )
                .with_composite_index(&["region", "status"]),
            )
            .unwrap();
        EmbeddingComputeStage::new(
            Arc::new(LengthEmbedder { transient }),
            schemas,
            Arc::new(CollectionRegistry::new(false)),
            RetryPolicy::none(),
        )
    }

    fn record(rows: Vec<serde_json::Value>) -> ExtractedRecord {
        ExtractedRecord {
            metadata: Metadata {
                id: "doc-1".into(),
                owner: "alice".into(),
                collection: "crm".into(),
                source: String::new(),
            },
            schema_name: "customers".into(),
            values: rows
                .into_iter()
                .map(|v| serde_json::from_value(v).unwrap())
                .collect(),
        }
    }

    #[tokio::test]
    async fn single_and_composite_texts() {
        let out = stage(false)
            .compute(&record(vec![json!({"email": "foo@bar.com", "region": "US", "status": "active"})]))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        let texts: Vec<&str> = out[0].embeddings.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["foo@bar.com", "US active"]);
        assert_eq!(out[0].embeddings[1].index_name, "region,status");
        assert_eq!(out[0].embeddings[1].vectors, vec![vec![9.0, 1.0]]);
    }

    #[tokio::test]
    async fn duplicate_texts_embedded_once() {
        let out = stage(false)
            .compute(&record(vec![json!({"email": "a@b"}), json!({"email": "a@b"})]))
            .await
            .unwrap();
        assert_eq!(out[0].embeddings.len(), 1);
    }

    #[tokio::test]
    async fn shared_text_reaches_every_index() {
        let schemas = Arc::new(SchemaRegistry::new());
        schemas
            .put(
                "companies",
                RowSchema::new(
                    "companies",
                    vec![Field::new("name").indexed(), Field::new("alias").indexed()],
                ),
            )
            .unwrap();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let stage = EmbeddingComputeStage::new(
            Arc::new(CountingEmbedder(Arc::clone(&calls))),
            schemas,
            Arc::new(CollectionRegistry::new(false)),
            RetryPolicy::none(),
        );
        let mut rec = record(vec![json!({"name": "ACME", "alias": "ACME"})]);
        rec.schema_name = "companies".into();

        let out = stage.compute(&rec).await.unwrap();
        let mut names: Vec<&str> = out[0].embeddings.iter().map(|e| e.index_name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["alias", "name"]);
        assert_eq!(out[0].embeddings[0].vectors, out[0].embeddings[1].vectors);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn partial_failure_keeps_successes() {
        let out = stage(false)
            .compute(&record(vec![json!({"email": "fail@x", "region": "EU", "status": "new"})]))
            .await
            .unwrap();
        assert_eq!(out[0].embeddings.len(), 1);
        assert_eq!(out[0].failures.len(), 1);
        assert_eq!(out[0].failures[0].text, "fail@x");
    }

    #[tokio::test]
    async fn all_transient_failures_fail_the_record() {
        let err = stage(true)
            .compute(&record(vec![json!({"email": "fail@x"})]))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn output_split_by_batch_size() {
        let out = stage(false)
            .with_batch_size(2)
            .compute(&record(vec![
                json!({"email": "a"}),
                json!({"email": "b"}),
                json!({"email": "c"}),
            ]))
            .await
            .unwrap();
        let sizes: Vec<usize> = out.iter().map(|m| m.embeddings.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[tokio::test]
    async fn unknown_schema_is_fatal() {
        let mut rec = record(vec![json!({"email": "a"})]);
        rec.schema_name = "nope".into();
        let err = stage(false).compute(&rec).await.unwrap_err();
        assert!(matches!(err, RowStoreError::SchemaNotFound(_)));
    }
}
