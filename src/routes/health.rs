//! Health check endpoints for liveness and readiness probes.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::errors::ApiResponse;
use crate::services::session::SessionStore;
use crate::AppState;

/// Readiness probe detail.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub sessions: String,
    pub storage: String,
}

/// Liveness probe: always returns OK if the process is running.
pub async fn live() -> &'static str {
    "OK"
}

/// Readiness probe: checks database, session store and storage root.
pub async fn ready(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let db_status = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            format!("error: {e}")
        }
    };

    let session_status = match &state.sessions {
        SessionStore::Memory(_) => "in-memory".to_string(),
        SessionStore::Redis(client) => match client.get_multiplexed_async_connection().await {
            Ok(_) => "connected".to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Redis health check failed");
                format!("error: {e}")
            }
        },
    };

    let storage_status = match tokio::fs::metadata(state.storage.root()).await {
        Ok(meta) if meta.is_dir() => "available".to_string(),
        Ok(_) => "error: not a directory".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            format!("error: {e}")
        }
    };

    let healthy = db_status == "connected"
        && !session_status.starts_with("error")
        && storage_status == "available";

    ApiResponse::success(HealthStatus {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        database: db_status,
        sessions: session_status,
        storage: storage_status,
    })
}
