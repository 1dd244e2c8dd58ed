//! FPL Value Backend - fantasy-football projection engine
//! Ingests upstream player/fixture data, derives per-player expected-points
//! projections, and serves ranked snapshots behind a stale-while-revalidate
//! cache.

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fplvalue_backend::{
    api,
    cache::{CacheRead, SnapshotCache},
    config::Config,
    projection::ProjectionPipeline,
    scrapers::FplClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let config = Config::from_env();
    info!(?config, "starting fplvalue backend");

    let client = FplClient::new(
        &config.api_base,
        config.fetch_timeout,
        config.history_concurrency,
    )
    .context("failed to build upstream client")?;
    let pipeline = Arc::new(ProjectionPipeline::new(client, config.clone()));
    let cache = SnapshotCache::new(pipeline, config.freshness, config.cold_wait);

    // Warm the cache at boot so first readers rarely hit the cold path.
    if config.preload_on_start {
        let cache = cache.clone();
        tokio::spawn(async move {
            info!("pre-loading projection snapshot");
            match cache.read().await {
                CacheRead::Ready { snapshot, .. } => {
                    info!(generated_at = %snapshot.generated_at, "snapshot pre-loaded")
                }
                CacheRead::Populating => {
                    info!("pre-load still computing; first readers will wait on it")
                }
                CacheRead::Failed(e) => {
                    warn!(error = %e, "pre-load failed; data loads on first request instead")
                }
            }
        });
    }

    let app = api::create_router(cache);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Initialize tracing with env-filter fallback defaults.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fplvalue_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
