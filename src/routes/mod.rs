//! Route definitions for the maintenance portal API.

pub mod audit;
pub mod auth;
pub mod health;
pub mod records;
pub mod templates;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::models::photo::PhotoUpload;
use crate::AppState;

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let cors = match state.config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        Err(_) => {
            tracing::warn!(
                frontend_url = %state.config.frontend_url,
                "Invalid FRONTEND_URL, CORS disabled"
            );
            CorsLayer::new()
        }
    };

    let auth_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/me/signature", post(auth::upload_signature))
        .route("/users", get(auth::list_users).post(auth::create_user));

    let template_routes = Router::new()
        .route("/templates", get(templates::list).post(templates::create))
        .route(
            "/templates/{id}",
            get(templates::get_by_id)
                .put(templates::update)
                .delete(templates::delete),
        )
        .route("/templates/{id}/duplicate", post(templates::duplicate));

    let record_routes = Router::new()
        .route("/records", get(records::list).post(records::create))
        .route("/records/summary", get(records::summary))
        .route("/records/export", get(records::export))
        .route(
            "/records/{id}",
            get(records::get_by_id)
                .put(records::update)
                .delete(records::delete),
        )
        .route("/records/{id}/photos", post(records::add_photos))
        .route(
            "/records/{id}/photos/{photo_id}",
            delete(records::delete_photo),
        )
        .route("/records/{id}/review", post(records::review))
        .route("/records/{id}/approvals", get(records::approvals))
        .route("/records/{id}/pdf", get(records::download_pdf))
        .route("/records/{id}/pdf/preview", get(records::preview_pdf));

    let api = Router::new()
        .merge(auth_routes)
        .merge(template_routes)
        .merge(record_routes)
        .route("/audit", get(audit::list));

    let body_limit = state.config.request_body_limit();

    let mut router = Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .nest("/api/v1", api);

    // Files are served from here only when the public URL is a local path;
    // an absolute URL means a separate web server or CDN fronts the storage root.
    let public_url = state.config.storage_public_url.trim_end_matches('/');
    if public_url.starts_with('/') && public_url.len() > 1 {
        router = router.nest_service(public_url, ServeDir::new(state.storage.root()));
    }

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

/// Map a multipart read failure, keeping the body-limit case distinct.
pub(crate) fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// Read a multipart text field.
pub(crate) async fn field_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(multipart_error)
}

/// Read a multipart file field into an upload, enforcing the per-file limit.
pub(crate) async fn field_upload(
    mut field: Field<'_>,
    max_bytes: usize,
) -> Result<PhotoUpload, AppError> {
    let original_name = field.file_name().unwrap_or("upload").to_string();
    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if data.len() + chunk.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File '{original_name}' exceeds {max_bytes} bytes"
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(PhotoUpload {
        original_name,
        data,
        caption: None,
    })
}
