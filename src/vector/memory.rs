use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::store::{NewPoint, VectorStore};
use super::{PointPayload, ScoredPoint, VectorError};

const SNAPSHOT_FILE: &str = "vectors.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    id: String,
    vector: Vec<f32>,
    payload: PointPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryCollection {
    dimensions: usize,
    points: Vec<StoredPoint>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    collections: std::collections::BTreeMap<String, MemoryCollection>,
}

/// Brute-force cosine vector store held in memory.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    collections: DashMap<String, MemoryCollection>,
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point_count(&self, name: &str) -> usize {
        self.collections
            .get(name)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    /// Save every collection to `{dir}/vectors.json`.
    pub fn save(&self, dir: &Path) -> Result<(), VectorError> {
        std::fs::create_dir_all(dir)?;
        let snapshot = Snapshot {
            collections: self
                .collections
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        };
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| VectorError::SerializationError(e.to_string()))?;
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
        Ok(())
    }

    /// Load `{dir}/vectors.json`; a missing file yields an empty store.
    pub fn load(dir: &Path) -> Result<Self, VectorError> {
        let path = dir.join(SNAPSHOT_FILE);
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(&path)?;
        let snapshot: Snapshot = serde_json::from_str(&data)
            .map_err(|e| VectorError::SerializationError(e.to_string()))?;
        let store = Self::new();
        for (name, collection) in snapshot.collections {
            store.collections.insert(name, collection);
        }
        Ok(store)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn list_collections(&self) -> Result<Vec<String>, VectorError> {
        Ok(self.collections.iter().map(|e| e.key().clone()).collect())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, VectorError> {
        Ok(self.collections.contains_key(name))
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), VectorError> {
        let entry = self
            .collections
            .entry(name.to_string())
            .or_insert_with(|| MemoryCollection {
                dimensions,
                points: Vec::new(),
            });
        if entry.dimensions != dimensions {
            return Err(VectorError::DimensionMismatch {
                expected: entry.dimensions,
                got: dimensions,
            });
        }
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<NewPoint>) -> Result<(), VectorError> {
        let mut collection = self
            .collections
            .get_mut(name)
            .ok_or_else(|| VectorError::CollectionNotFound(name.to_string()))?;
        for p in &points {
            if p.vector.len() != collection.dimensions {
                return Err(VectorError::DimensionMismatch {
                    expected: collection.dimensions,
                    got: p.vector.len(),
                });
            }
        }
        for p in points {
            if let Some(existing) = collection.points.iter_mut().find(|s| s.id == p.id) {
                existing.vector = p.vector;
                existing.payload = p.payload;
            } else {
                collection.points.push(StoredPoint {
                    id: p.id,
                    vector: p.vector,
                    payload: p.payload,
                });
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        index_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError> {
        let collection = self
            .collections
            .get(name)
            .ok_or_else(|| VectorError::CollectionNotFound(name.to_string()))?;
        if vector.len() != collection.dimensions {
            return Err(VectorError::DimensionMismatch {
                expected: collection.dimensions,
                got: vector.len(),
            });
        }
        let mut scored: Vec<ScoredPoint> = collection
            .points
            .iter()
            .filter(|p| index_name.map_or(true, |f| p.payload.index_name == f))
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorError> {
        self.collections.remove(name);
        Ok(())
    }
}
