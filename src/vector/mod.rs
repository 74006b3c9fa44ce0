pub mod config;
pub mod embedder;
pub mod memory;
pub mod naming;
pub mod qdrant;
pub mod store;

use serde::{Deserialize, Serialize};

/// Errors from the vector store and the embedding capability.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("vector collection not found: {0}")]
    CollectionNotFound(String),

    /// The vector store could not be reached or answered with a server error.
    #[error("vector store unavailable: {0}")]
    Unavailable(String),

    #[error("vector store rejected request: {0}")]
    Rejected(String),

    /// The embedding service could not be reached or is overloaded.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("embedding error: {0}")]
    EmbeddingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Payload stored with every point: enough to look the row up exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub index_name: String,
    pub index_value: Vec<String>,
    pub text: String,
}

/// A single result from a vector similarity search. Higher score is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}
