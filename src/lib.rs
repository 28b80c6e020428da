pub mod config;
pub mod db;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;

use crate::services::pdf::PdfEngine;
use crate::services::session::SessionStore;
use crate::services::storage::FileStorage;

/// Shared application state passed to all Axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: config::AppConfig,
    pub storage: FileStorage,
    pub sessions: SessionStore,
    pub pdf: Arc<dyn PdfEngine>,
}
