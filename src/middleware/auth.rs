//! Session authentication extractor for Axum handlers.
//!
//! The access token is read from `Authorization: Bearer <token>` first and
//! from the session cookie set at login second.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::UserRole;
use crate::services::auth as auth_service;
use crate::AppState;

/// Authenticated user extracted from the session token.
///
/// Use as an Axum extractor in handlers that require authentication:
/// ```ignore
/// async fn handler(current_user: CurrentUser) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub token_id: String,
    pub token_expires_at: i64,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Pull the raw session token out of the request headers.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(cookie_name)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    })
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, &state.config.session_cookie_name)
            .ok_or(AppError::Unauthorized)?;

        let claims = auth_service::validate_token(&token, &state.config.jwt_secret)?;

        if claims.token_type != "access" {
            return Err(AppError::Unauthorized);
        }

        if state.sessions.is_revoked(&claims.jti).await? {
            return Err(AppError::Unauthorized);
        }

        let user_id: Uuid = claims
            .user_id
            .parse()
            .map_err(|_| AppError::Unauthorized)?;

        let role: UserRole =
            serde_json::from_str(&format!("\"{}\"", claims.role)).map_err(|_| {
                AppError::Internal(format!("Invalid role in token: {}", claims.role))
            })?;

        Ok(CurrentUser {
            id: user_id,
            username: claims.sub,
            role,
            token_id: claims.jti,
            token_expires_at: claims.exp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, HeaderValue};

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        headers.insert(COOKIE, HeaderValue::from_static("pm_session=cookie-token"));
        assert_eq!(
            session_token(&headers, "pm_session").as_deref(),
            Some("header-token")
        );
    }

    #[test]
    fn cookie_used_without_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; pm_session=cookie-token"),
        );
        assert_eq!(
            session_token(&headers, "pm_session").as_deref(),
            Some("cookie-token")
        );
    }

    #[test]
    fn missing_or_malformed_token() {
        let mut headers = HeaderMap::new();
        assert!(session_token(&headers, "pm_session").is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(session_token(&headers, "pm_session").is_none());
    }
}
