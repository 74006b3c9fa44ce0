//! Multi-index, append-only row store.
//!
//! Structured records are written once per index of their schema so any
//! index can serve exact-key lookups, while a separately maintained vector
//! index supports fuzzy lookup of index values. A partition catalog tracks
//! which index keys exist per collection so bulk deletion needs no scan.
//!
//! [`RowStoreManager`] wires everything together; the individual stages are
//! usable on their own.

pub mod circuit_breaker;
pub mod collections;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod manager;
pub mod pipeline;
pub mod resolve;
pub mod retry;
pub mod rows;
pub mod schema;
pub mod stream;
pub mod types;
pub mod vector;

pub use collections::{CollectionInfo, CollectionRegistry};
pub use config::{Config, VectorStoreConfig};
pub use error::{Result, RowStoreError};
pub use manager::{Backends, RowStoreManager};
pub use pipeline::FlushStatus;
pub use resolve::{FuzzyResolver, ResolveRequest, ResolvedMatch};
pub use retry::RetryPolicy;
pub use rows::{DeletionReport, PartitionCatalog, RowQueryService, RowStore, RowWriter};
pub use schema::{Field, RowSchema, SchemaRegistry};
pub use types::*;
