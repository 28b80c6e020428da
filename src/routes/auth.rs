//! Authentication routes: login, refresh, logout, users, profile, signature.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::middleware::rbac::RequireAdmin;
use crate::models::user::{CreateUser, UserResponse};
use crate::routes::{field_upload, multipart_error};
use crate::services::auth::{self as auth_service, TokenPair};
use crate::services::photo::sniff_image;
use crate::services::storage::SIGNATURES_DIR;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.config.session_cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(state.config.session_cookie_secure)
        .same_site(SameSite::Lax)
        .build()
}

/// POST /api/v1/auth/login: issue tokens and set the session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<TokenPair>>), AppError> {
    let tokens = auth_service::login(
        &state.db,
        &body.username,
        &body.password,
        &state.config.jwt_secret,
        state.config.jwt_access_token_expiry_secs,
        state.config.jwt_refresh_token_expiry_secs,
    )
    .await?;

    let jar = jar.add(session_cookie(&state, tokens.access_token.clone()));
    Ok((jar, ApiResponse::success(tokens)))
}

/// POST /api/v1/auth/refresh: rotate the token pair.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RefreshRequest>,
) -> Result<(CookieJar, Json<ApiResponse<TokenPair>>), AppError> {
    let tokens = auth_service::refresh_token(
        &state.db,
        &state.sessions,
        &body.refresh_token,
        &state.config.jwt_secret,
        state.config.jwt_access_token_expiry_secs,
        state.config.jwt_refresh_token_expiry_secs,
    )
    .await?;

    let jar = jar.add(session_cookie(&state, tokens.access_token.clone()));
    Ok((jar, ApiResponse::success(tokens)))
}

/// POST /api/v1/auth/logout: revoke the session and clear the cookie.
///
/// The body is optional; when it carries the refresh token that is revoked too.
pub async fn logout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<ApiResponse<&'static str>>), AppError> {
    let request: LogoutRequest = if body.is_empty() {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid logout body: {e}")))?
    };

    auth_service::logout(
        &state.sessions,
        &current_user.token_id,
        current_user.token_expires_at,
        request.refresh_token.as_deref(),
        &state.config.jwt_secret,
    )
    .await?;

    let jar = jar.remove(Cookie::build(state.config.session_cookie_name.clone()).path("/"));
    Ok((jar, ApiResponse::success("Logged out successfully")))
}

/// GET /api/v1/users: list users (admin).
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, AppError> {
    let users = auth_service::list_users(&state.db).await?;
    Ok(ApiResponse::success(
        users.into_iter().map(UserResponse::from).collect(),
    ))
}

/// POST /api/v1/users: admin-only user creation
pub async fn create_user(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(body): Json<CreateUser>,
) -> Result<Json<ApiResponse<UserResponse>>, AppError> {
    let user = auth_service::create_user(&state.db, &body).await?;
    Ok(ApiResponse::success(UserResponse::from(user)))
}

/// GET /api/v1/auth/me: current user profile
pub async fn me(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<UserResponse>>, AppError> {
    let user = auth_service::find_user_by_id(&state.db, current_user.id).await?;
    Ok(ApiResponse::success(UserResponse::from(user)))
}

/// POST /api/v1/auth/me/signature: replace the current user's signature image.
pub async fn upload_signature(
    State(state): State<AppState>,
    current_user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UserResponse>>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            upload = Some(field_upload(field, state.config.max_upload_bytes).await?);
        }
    }

    let upload = upload.ok_or_else(|| {
        AppError::Validation("Missing 'file' field in multipart request".to_string())
    })?;
    let (ext, _) = sniff_image(&upload.data)?;

    let path = state.storage.put(SIGNATURES_DIR, ext, &upload.data).await?;
    let updated = auth_service::set_signature(&state.db, current_user.id, &path).await;
    let (user, previous) = match updated {
        Ok(updated) => updated,
        Err(e) => {
            let _ = state.storage.delete(&path).await;
            return Err(e);
        }
    };

    if let Some(previous) = previous {
        if let Err(e) = state.storage.delete(&previous).await {
            tracing::warn!(path = %previous, error = %e, "Failed to remove replaced signature");
        }
    }
    tracing::info!(user = %current_user.username, "Signature updated");

    Ok(ApiResponse::success(UserResponse::from(user)))
}
