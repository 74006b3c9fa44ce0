//! Vector side of the row store: computing embeddings for index values,
//! storing them, and searching them.

pub mod compute;
pub mod query;
pub mod store_stage;

pub use compute::{EmbeddingComputeStage, DEFAULT_EMBEDDING_BATCH_SIZE};
pub use query::{EmbeddingQueryService, QUERY_ERROR_TYPE};
pub use store_stage::EmbeddingStoreStage;
