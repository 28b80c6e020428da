//! Role-based access control extractor for Axum handlers.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};

use crate::errors::AppError;
use crate::middleware::auth::CurrentUser;
use crate::AppState;

/// Extractor that requires the user to have the admin role.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(RequireAdmin(user))
    }
}
