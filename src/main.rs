use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use mimalloc::MiMalloc;
use pmtrack::config::AppConfig;
use pmtrack::services::pdf::CommandPdfEngine;
use pmtrack::services::session::SessionStore;
use pmtrack::services::storage::FileStorage;
use pmtrack::{db, routes, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pmtrack=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let pool = db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    // The PDF engine reads images by absolute file:// path.
    tokio::fs::create_dir_all(&config.storage_root).await?;
    let storage_root = tokio::fs::canonicalize(&config.storage_root).await?;
    let storage = FileStorage::new(storage_root, &config.storage_public_url);
    storage.ensure_layout().await?;

    let sessions = SessionStore::from_url(config.redis_url.as_deref())?;
    let pdf = CommandPdfEngine::new(
        &config.pdf_engine_bin,
        Duration::from_secs(config.pdf_engine_timeout_secs),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid BACKEND_HOST/BACKEND_PORT")?;
    let tls = match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) => {
            let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
            Some(
                RustlsConfig::from_pem_file(cert, key)
                    .await
                    .context("Failed to load TLS certificate")?,
            )
        }
        _ => None,
    };

    let state = AppState {
        db: pool,
        config,
        storage,
        sessions,
        pdf: Arc::new(pdf),
    };
    let app = routes::build_router(state);

    match tls {
        Some(tls) => {
            tracing::info!(host = %addr, "Starting maintenance portal API server (HTTPS)");
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::info!(host = %addr, "Starting maintenance portal API server");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
