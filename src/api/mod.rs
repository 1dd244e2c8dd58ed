//! Query surface: the one JSON endpoint the dashboard consumes, plus a
//! liveness probe. Everything else (assets, sorting, search) lives in the
//! rendering layer.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::cache::{CacheRead, SnapshotCache};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub cache: SnapshotCache,
}

/// Create the API router
pub fn create_router(cache: SnapshotCache) -> Router {
    let state = AppState { cache };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/projections", get(get_projections))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// The current projection snapshot. Serves the last good snapshot even when
/// stale (a background refresh may be in flight); returns the loading shape
/// only on a true cold start, and the error shape only when that cold-start
/// populate failed.
async fn get_projections(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.cache.read().await {
        CacheRead::Ready {
            snapshot,
            refreshing,
        } => {
            let age_minutes =
                Utc::now().signed_duration_since(snapshot.generated_at).num_seconds() as f64
                    / 60.0;
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "data": &snapshot.by_position,
                    "generated_at": snapshot.generated_at,
                    "age_minutes": (age_minutes * 10.0).round() / 10.0,
                    "refreshing": refreshing,
                })),
            )
        }
        CacheRead::Populating => (
            StatusCode::ACCEPTED,
            Json(json!({
                "success": false,
                "loading": true,
                "message": "Projection data is being computed. Please retry shortly.",
                "refreshing": true,
            })),
        ),
        CacheRead::Failed(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "error": e.to_string(),
            })),
        ),
    }
}

// ===== Response Types =====

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}
