//! HTTP surface of the row store: schema administration, record ingest,
//! exact and fuzzy lookups, collection management and deletion.

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::{build_router, serve};
