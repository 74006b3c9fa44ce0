use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::collections::{CollectionInfo, CollectionRegistry};
use crate::config::{Config, VectorStoreConfig};
use crate::embeddings::{EmbeddingComputeStage, EmbeddingQueryService, EmbeddingStoreStage};
use crate::error::{Result, RowStoreError};
use crate::pipeline::{FlushStatus, Pipeline};
use crate::resolve::{FuzzyResolver, ResolveRequest, ResolvedMatch};
use crate::rows::{
    DeletionOrchestrator, DeletionReport, MemoryRowStore, PartitionCatalog, RegistrationCache,
    RowQueryService, RowStore, RowWriter,
};
use crate::schema::{RowSchema, SchemaRegistry};
use crate::types::{
    ExtractedRecord, PartitionKey, RowEmbeddingsRequest, RowEmbeddingsResponse, RowQuery, RowRecord,
};
use crate::vector::embedder::{create_embedder, TextEmbedder};
use crate::vector::memory::MemoryVectorStore;
use crate::vector::qdrant::QdrantStore;
use crate::vector::store::VectorStore;

const COLLECTIONS_FILE: &str = "collections.json";
const SCHEMAS_FILE: &str = "schemas.json";

/// Storage and capabilities a [`RowStoreManager`] runs on.
pub struct Backends {
    pub rows: Arc<dyn RowStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub embedder: Option<Arc<dyn TextEmbedder>>,
}

impl Backends {
    /// In-memory row and vector stores, no embedder.
    pub fn memory() -> Self {
        Self {
            rows: Arc::new(MemoryRowStore::new()),
            vectors: Arc::new(MemoryVectorStore::new()),
            embedder: None,
        }
    }
}

/// Owns every component of the row store and the stage pipeline.
///
/// Create one with [`RowStoreManager::open`] to load snapshots from a data
/// directory, or [`RowStoreManager::new`] with explicit backends. Both must
/// be called inside a tokio runtime since they start the stage workers.
pub struct RowStoreManager {
    config: Config,
    data_dir: Option<PathBuf>,
    schemas: Arc<SchemaRegistry>,
    collections: Arc<CollectionRegistry>,
    catalog: PartitionCatalog,
    row_query: RowQueryService,
    embedding_query: EmbeddingQueryService,
    resolver: FuzzyResolver,
    deletion: DeletionOrchestrator,
    pipeline: Pipeline,
    memory_rows: Option<Arc<MemoryRowStore>>,
    memory_vectors: Option<Arc<MemoryVectorStore>>,
}

impl RowStoreManager {
    pub fn new(config: Config, backends: Backends) -> Result<Arc<Self>> {
        Self::build(config, backends, None, None, None)
    }

    /// Build from configuration, restoring snapshots found in `data_dir`.
    pub fn open(config: Config, data_dir: &Path) -> Result<Arc<Self>> {
        config.validate()?;
        std::fs::create_dir_all(data_dir)?;

        let memory_rows = Arc::new(MemoryRowStore::load(data_dir)?);
        let mut memory_vectors = None;
        let vectors: Arc<dyn VectorStore> = match &config.vector_store {
            VectorStoreConfig::Memory => {
                let store = Arc::new(MemoryVectorStore::load(data_dir)?);
                memory_vectors = Some(Arc::clone(&store));
                store
            }
            VectorStoreConfig::Qdrant { url, api_key } => {
                tracing::info!("Using Qdrant vector store at {}", url);
                Arc::new(QdrantStore::new(url.clone(), api_key.clone())?)
            }
        };
        let embedder: Option<Arc<dyn TextEmbedder>> = match &config.embedder {
            Some(embedder_config) => {
                let embedder = create_embedder(embedder_config)?;
                tracing::info!("Embedder configured: {:?}", embedder.source());
                let embedder: Arc<dyn TextEmbedder> = Arc::new(embedder);
                Some(embedder)
            }
            None => None,
        };

        let backends = Backends {
            rows: memory_rows.clone(),
            vectors,
            embedder,
        };
        let manager = Self::build(
            config,
            backends,
            Some(data_dir.to_path_buf()),
            Some(memory_rows),
            memory_vectors,
        )?;
        manager.restore(data_dir)?;
        Ok(manager)
    }

    fn build(
        config: Config,
        backends: Backends,
        data_dir: Option<PathBuf>,
        memory_rows: Option<Arc<MemoryRowStore>>,
        memory_vectors: Option<Arc<MemoryVectorStore>>,
    ) -> Result<Arc<Self>> {
        let retry = config.retry;
        let schemas = Arc::new(SchemaRegistry::new());
        let collections = Arc::new(CollectionRegistry::new(config.require_registered_collections));
        let cache = Arc::new(RegistrationCache::subscribed(&schemas));

        let writer = Arc::new(RowWriter::new(
            Arc::clone(&backends.rows),
            Arc::clone(&schemas),
            Arc::clone(&collections),
            Arc::clone(&cache),
            retry,
        ));
        let compute = backends.embedder.as_ref().map(|embedder| {
            Arc::new(
                EmbeddingComputeStage::new(
                    Arc::clone(embedder),
                    Arc::clone(&schemas),
                    Arc::clone(&collections),
                    retry,
                )
                .with_batch_size(config.embedding_batch_size),
            )
        });
        let store_stage = Arc::new(EmbeddingStoreStage::new(
            Arc::clone(&backends.vectors),
            Arc::clone(&collections),
            retry,
        ));
        let pipeline = Pipeline::start(writer, compute, store_stage, retry);

        let row_query = RowQueryService::new(Arc::clone(&backends.rows), retry);
        let embedding_query = EmbeddingQueryService::new(Arc::clone(&backends.vectors), retry);
        let resolver = FuzzyResolver::new(
            backends.embedder.clone(),
            embedding_query.clone(),
            row_query.clone(),
            retry,
        );
        let deletion = DeletionOrchestrator::new(
            Arc::clone(&backends.rows),
            Arc::clone(&backends.vectors),
            Arc::clone(&schemas),
            Arc::clone(&collections),
            cache,
            retry,
        );

        Ok(Arc::new(Self {
            catalog: PartitionCatalog::new(backends.rows),
            config,
            data_dir,
            schemas,
            collections,
            row_query,
            embedding_query,
            resolver,
            deletion,
            pipeline,
            memory_rows,
            memory_vectors,
        }))
    }

    /// Load schemas and registered collections. A configured schema file
    /// takes precedence over the schema snapshot.
    fn restore(&self, data_dir: &Path) -> Result<()> {
        let from_config = self.config.load_schemas(data_dir)?;
        if !from_config.is_empty() {
            self.schemas.load_config(1, &from_config);
        } else {
            let snapshot = data_dir.join(SCHEMAS_FILE);
            if snapshot.exists() {
                let docs = serde_json::from_str(&std::fs::read_to_string(&snapshot)?)?;
                self.schemas.load_config(1, &docs);
            }
        }

        let collections = data_dir.join(COLLECTIONS_FILE);
        if collections.exists() {
            let infos: Vec<CollectionInfo> =
                serde_json::from_str(&std::fs::read_to_string(&collections)?)?;
            tracing::info!("Restored {} registered collections", infos.len());
            self.collections.import(infos);
        }
        Ok(())
    }

    /// Write snapshots of every in-memory store to the data dir. A manager
    /// built without a data dir has nothing to save.
    pub fn save(&self) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        if let Some(rows) = &self.memory_rows {
            rows.save(dir)?;
        }
        if let Some(vectors) = &self.memory_vectors {
            vectors.save(dir)?;
        }
        write_json(dir, SCHEMAS_FILE, &self.schemas.all())?;
        write_json(dir, COLLECTIONS_FILE, &self.collections.export())?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn default_owner(&self) -> &str {
        &self.config.owner
    }

    /// `requested`, or the configured default owner when it is empty.
    pub fn owner_or_default(&self, requested: &str) -> String {
        if requested.trim().is_empty() {
            self.config.owner.clone()
        } else {
            requested.to_string()
        }
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn collections(&self) -> &Arc<CollectionRegistry> {
        &self.collections
    }

    pub fn embedding_enabled(&self) -> bool {
        self.pipeline.embedding_enabled()
    }

    // ── Schemas ──

    pub fn put_schema(&self, name: &str, schema: RowSchema) -> Result<()> {
        self.schemas.put(name, schema)
    }

    pub fn get_schema(&self, name: &str) -> Result<RowSchema> {
        self.schemas
            .get(name)
            .map(|s| (*s).clone())
            .ok_or_else(|| RowStoreError::SchemaNotFound(name.to_string()))
    }

    pub fn remove_schema(&self, name: &str) -> Result<()> {
        if self.schemas.remove(name) {
            Ok(())
        } else {
            Err(RowStoreError::SchemaNotFound(name.to_string()))
        }
    }

    // ── Ingest ──

    /// Publish a record to the stage pipeline. Processing is asynchronous;
    /// call [`flush`](Self::flush) to wait for it.
    ///
    /// A record without an owner is filed under the default owner.
    pub fn submit(&self, mut record: ExtractedRecord) -> Result<u64> {
        if record.metadata.owner.trim().is_empty() {
            record.metadata.owner = self.config.owner.clone();
        }
        if record.metadata.collection.trim().is_empty() {
            return Err(RowStoreError::InvalidRecord("collection is required".into()));
        }
        if record.schema_name.trim().is_empty() {
            return Err(RowStoreError::InvalidRecord("schema_name is required".into()));
        }
        let offset = self.pipeline.submit(record)?;
        tracing::debug!("Record accepted at offset {}", offset);
        Ok(offset)
    }

    pub async fn flush(&self) {
        self.pipeline.flush().await
    }

    pub async fn flush_within(&self, timeout: std::time::Duration) -> FlushStatus {
        self.pipeline.flush_within(timeout).await
    }

    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await
    }

    // ── Queries ──

    // Every query and deletion entry point below treats an empty owner as
    // the default owner.

    pub async fn query_rows(&self, query: &RowQuery) -> Result<Vec<RowRecord>> {
        let query = RowQuery {
            owner: self.owner_or_default(&query.owner),
            ..query.clone()
        };
        self.row_query.query(&query).await
    }

    pub async fn query_embeddings(&self, request: &RowEmbeddingsRequest) -> RowEmbeddingsResponse {
        let request = RowEmbeddingsRequest {
            owner: self.owner_or_default(&request.owner),
            ..request.clone()
        };
        self.embedding_query.query(&request).await
    }

    pub async fn resolve(&self, request: &ResolveRequest) -> Result<Vec<ResolvedMatch>> {
        let request = ResolveRequest {
            owner: self.owner_or_default(&request.owner),
            ..request.clone()
        };
        self.resolver.resolve(&request).await
    }

    pub async fn list_partitions(&self, owner: &str, collection: &str) -> Result<Vec<PartitionKey>> {
        let owner = self.owner_or_default(owner);
        self.catalog.partitions(&owner, collection, None).await
    }

    // ── Deletion ──

    pub async fn delete_collection(&self, owner: &str, collection: &str) -> Result<DeletionReport> {
        let owner = self.owner_or_default(owner);
        self.deletion.delete_collection(&owner, collection).await
    }

    pub async fn delete_schema(
        &self,
        owner: &str,
        collection: &str,
        schema_name: &str,
    ) -> Result<DeletionReport> {
        let owner = self.owner_or_default(owner);
        self.deletion
            .delete_schema(&owner, collection, schema_name)
            .await
    }
}

fn write_json<T: serde::Serialize>(dir: &Path, file: &str, value: &T) -> Result<()> {
    let tmp = dir.join(format!("{file}.tmp"));
    std::fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    std::fs::rename(&tmp, dir.join(file))?;
    Ok(())
}
