//! Face Enrollment and Identification Service
//!
//! Registers people by facial photo and identifies uploaded photos against
//! all stored encodings. REST API via Axum, inference via OpenVINO.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use facegate::api::rest::{create_router, AppState};
use facegate::config::Config;
use facegate::engine::{ModelPool, OpenVinoEncoder};
use facegate::service::FaceService;
use facegate::storage::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Starting facegate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load(Config::default_path()).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });

    info!("Configuration loaded:");
    info!("  Port: {}", config.server.port);
    info!("  Device: {}", config.inference.device);
    info!("  Match threshold: {}", config.recognition.match_threshold);
    info!("  Encodings file: {}", config.storage.path.display());

    // Initialize model pool and start its idle cleanup task
    let pool = Arc::new(ModelPool::new(&config.inference, &config.models)?);
    let pool_clone = pool.clone();
    tokio::spawn(async move {
        pool_clone.start_cleanup_task().await;
    });

    let encoder = Arc::new(OpenVinoEncoder::new(
        pool.clone(),
        config.recognition.embedding_dim,
    ));

    // Open storage; a corrupt encodings file is fatal here
    let storage = Arc::new(FileStore::open(&config.storage.path)?);

    // Create face service and router
    let service = Arc::new(FaceService::new(encoder, storage, config.clone()));
    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });
    let router = create_router(state, config.server.max_upload_mb);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("REST API listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, cleaning up...");
        })
        .await?;

    pool.shutdown();
    info!("Goodbye!");
    Ok(())
}
