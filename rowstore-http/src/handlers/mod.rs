use std::sync::Arc;

use rowstore::RowStoreManager;
use serde::Deserialize;

pub mod collections;
pub mod embeddings;
pub mod health;
pub mod records;
pub mod rows;
pub mod schemas;

pub struct AppState {
    pub manager: Arc<RowStoreManager>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(manager: Arc<RowStoreManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            started_at: chrono::Utc::now(),
            start_time: std::time::Instant::now(),
        })
    }
}

/// `?owner=` on routes that take no body. Missing means the default owner.
#[derive(Debug, Default, Deserialize)]
pub struct OwnerParams {
    #[serde(default)]
    pub owner: String,
}
