use async_trait::async_trait;

use super::{PointPayload, ScoredPoint, VectorError};

/// A point to upsert. The id is assigned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// Nearest-neighbour storage grouped into named collections.
///
/// `create_collection` must converge when several callers race on the same
/// name: creating an existing collection is a success.
#[async_trait]
pub trait VectorStore: Send + Sync + 'static {
    async fn list_collections(&self) -> Result<Vec<String>, VectorError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, VectorError>;

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), VectorError>;

    async fn upsert(&self, name: &str, points: Vec<NewPoint>) -> Result<(), VectorError>;

    /// Top `limit` points by cosine similarity, optionally restricted to
    /// points whose payload `index_name` equals the filter.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        index_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError>;

    /// Drop a collection. Dropping a missing collection is a no-op.
    async fn delete_collection(&self, name: &str) -> Result<(), VectorError>;
}
