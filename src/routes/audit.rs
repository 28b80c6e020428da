//! Audit trail route.

use axum::{
    extract::{Query, State},
    Json,
};

use crate::errors::{ApiResponse, AppError};
use crate::middleware::rbac::RequireAdmin;
use crate::models::audit::{AuditFilters, AuditLog};
use crate::models::pagination::{PagedResult, Pagination};
use crate::services::audit as audit_service;
use crate::AppState;

/// GET /api/v1/audit: audit entries, newest first (admin).
pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(pagination): Query<Pagination>,
    Query(filters): Query<AuditFilters>,
) -> Result<Json<ApiResponse<PagedResult<AuditLog>>>, AppError> {
    let result = audit_service::list(&state.db, &filters, &pagination).await?;
    Ok(ApiResponse::success(result))
}
