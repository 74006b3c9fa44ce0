use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use rowstore::{Config, RowStoreManager};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{collections, embeddings, health, records, rows, schemas, AppState};

/// Run the HTTP server until ctrl-c.
///
/// Reads `ROWSTORE_DATA_DIR` (default `./data`) and the configuration in it,
/// binds `ROWSTORE_BIND_ADDR` or the configured address, and on shutdown
/// drains the stage pipeline and writes snapshots.
pub async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir =
        PathBuf::from(std::env::var("ROWSTORE_DATA_DIR").unwrap_or_else(|_| "./data".into()));
    let config = match std::env::var("ROWSTORE_CONFIG").ok().filter(|p| !p.is_empty()) {
        Some(path) => {
            let mut config = Config::load_file(std::path::Path::new(&path))?;
            config.apply_env();
            tracing::info!("Loaded config from {}", path);
            config
        }
        None => Config::load_or_default(&data_dir),
    };
    let bind_addr = config.bind_addr.clone();

    let manager = RowStoreManager::open(config, &data_dir)?;
    tracing::info!(
        "Row store ready: data_dir={}, schemas={}, embeddings={}",
        data_dir.display(),
        manager.schemas().names().len(),
        if manager.embedding_enabled() { "on" } else { "off" }
    );

    let app = build_router(AppState::new(Arc::clone(&manager)));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down: draining stages");
    manager.shutdown().await;
    manager.save()?;
    tracing::info!("Snapshots written to {}", data_dir.display());
    Ok(())
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/1/schemas", get(schemas::list_schemas))
        .route(
            "/1/schemas/:name",
            put(schemas::put_schema)
                .get(schemas::get_schema)
                .delete(schemas::delete_schema),
        )
        .route("/1/records", post(records::submit_records))
        .route("/1/rows/query", post(rows::query_rows))
        .route("/1/rows/resolve", post(rows::resolve))
        .route(
            "/1/row-embeddings/query",
            post(embeddings::query_embeddings),
        )
        .route(
            "/1/collections",
            post(collections::create_collection).get(collections::list_collections),
        )
        .route(
            "/1/collections/:collection",
            delete(collections::delete_collection),
        )
        .route(
            "/1/collections/:collection/partitions",
            get(collections::list_partitions),
        )
        .route(
            "/1/collections/:collection/schemas/:schema",
            delete(collections::delete_collection_schema),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive().max_age(std::time::Duration::from_secs(86400)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received ctrl-c");
}
