use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::embeddings::DEFAULT_EMBEDDING_BATCH_SIZE;
use crate::error::{Result, RowStoreError};
use crate::retry::RetryPolicy;
use crate::vector::config::EmbedderConfig;

pub const CONFIG_FILE: &str = "rowstore.json";
pub const DEFAULT_OWNER: &str = "default";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7800";

/// Where embedding vectors live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VectorStoreConfig {
    /// In-process cosine store, snapshotted to the data dir.
    #[default]
    Memory,
    Qdrant {
        url: String,
        #[serde(default, rename = "apiKey", alias = "api_key")]
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Owner used when a request does not name one.
    pub owner: String,
    pub bind_addr: String,
    pub vector_store: VectorStoreConfig,
    /// Without an embedder the embedding stages do not run; queries must
    /// then supply vectors.
    pub embedder: Option<EmbedderConfig>,
    pub retry: RetryPolicy,
    /// Maximum embeddings per output message; 0 disables splitting.
    pub embedding_batch_size: usize,
    /// JSON map of schema name to schema definition.
    pub schema_file: Option<PathBuf>,
    pub require_registered_collections: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            vector_store: VectorStoreConfig::Memory,
            embedder: None,
            retry: RetryPolicy::default(),
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            schema_file: None,
            require_registered_collections: false,
        }
    }
}

impl Config {
    /// Load `{data_dir}/rowstore.json`, falling back to defaults when it is
    /// missing or unreadable, then apply `ROWSTORE_*` environment overrides.
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            match Self::load_file(&path) {
                Ok(config) => {
                    tracing::info!(
                        "Loaded config from {}: owner={}, vector_store={:?}",
                        path.display(),
                        config.owner,
                        config.vector_store
                    );
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to load {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            }
        } else {
            tracing::info!("No {} found, using defaults", CONFIG_FILE);
            Self::default()
        };
        config.apply_env();
        config
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overlay `ROWSTORE_*` environment variables onto this config.
    pub fn apply_env(&mut self) {
        if let Some(owner) = env_var("ROWSTORE_OWNER") {
            self.owner = owner;
        }
        if let Some(addr) = env_var("ROWSTORE_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(url) = env_var("ROWSTORE_QDRANT_URL") {
            let api_key = match &self.vector_store {
                VectorStoreConfig::Qdrant { api_key, .. } => api_key.clone(),
                VectorStoreConfig::Memory => None,
            };
            self.vector_store = VectorStoreConfig::Qdrant { url, api_key };
        }
        if let Some(key) = env_var("ROWSTORE_QDRANT_API_KEY") {
            if let VectorStoreConfig::Qdrant { api_key, .. } = &mut self.vector_store {
                *api_key = Some(key);
            }
        }
        if let Some(file) = env_var("ROWSTORE_SCHEMA_FILE") {
            self.schema_file = Some(PathBuf::from(file));
        }
        if let Some(flag) = env_var("ROWSTORE_REQUIRE_COLLECTIONS") {
            self.require_registered_collections = matches!(
                flag.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(RowStoreError::Config("owner must not be empty".into()));
        }
        if let VectorStoreConfig::Qdrant { url, .. } = &self.vector_store {
            if url.trim().is_empty() {
                return Err(RowStoreError::Config("qdrant url must not be empty".into()));
            }
        }
        if let Some(embedder) = &self.embedder {
            embedder
                .validate()
                .map_err(|e| RowStoreError::Config(e.to_string()))?;
        }
        Ok(())
    }

    /// Schema documents from `schema_file`, resolved against `data_dir` when
    /// relative. No file configured yields an empty map.
    pub fn load_schemas(&self, data_dir: &Path) -> Result<BTreeMap<String, serde_json::Value>> {
        let Some(file) = &self.schema_file else {
            return Ok(BTreeMap::new());
        };
        let path = if file.is_absolute() {
            file.clone()
        } else {
            data_dir.join(file)
        };
        let content = std::fs::read_to_string(&path).map_err(|e| {
            RowStoreError::Config(format!("cannot read schema file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            RowStoreError::Config(format!("invalid schema file {}: {}", path.display(), e))
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
