//! Template routes: listing for everyone, management for admins.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::middleware::rbac::RequireAdmin;
use crate::models::pagination::{PagedResult, Pagination};
use crate::models::template::{CreateTemplate, Template, TemplateSummary, UpdateTemplate};
use crate::services::template::{self as template_service, TemplateFilters};
use crate::AppState;

/// GET /api/v1/templates: list templates. Employees only see active ones.
pub async fn list(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(mut filters): Query<TemplateFilters>,
) -> Result<Json<ApiResponse<PagedResult<TemplateSummary>>>, AppError> {
    if !current_user.is_admin() {
        filters.is_active = Some(true);
    }
    let result = template_service::list(&state.db, &filters, &pagination).await?;
    Ok(ApiResponse::success(result))
}

/// GET /api/v1/templates/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Template>>, AppError> {
    let template = template_service::find_by_id(&state.db, id).await?;
    if !template.is_active && !current_user.is_admin() {
        return Err(AppError::NotFound("Template not found".to_string()));
    }
    Ok(ApiResponse::success(template))
}

/// POST /api/v1/templates (admin)
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<CreateTemplate>,
) -> Result<Json<ApiResponse<Template>>, AppError> {
    let template = template_service::create(&state.db, &body, admin.id, &admin.username).await?;
    Ok(ApiResponse::success(template))
}

/// PUT /api/v1/templates/:id (admin)
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTemplate>,
) -> Result<Json<ApiResponse<Template>>, AppError> {
    let template =
        template_service::update(&state.db, id, &body, admin.id, &admin.username).await?;
    Ok(ApiResponse::success(template))
}

/// POST /api/v1/templates/:id/duplicate (admin)
pub async fn duplicate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Template>>, AppError> {
    let copy = template_service::duplicate(&state.db, id, admin.id, &admin.username).await?;
    Ok(ApiResponse::success(copy))
}

/// DELETE /api/v1/templates/:id (admin). Submitted records keep their snapshot.
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    template_service::delete(&state.db, id, admin.id, &admin.username).await?;
    Ok(ApiResponse::success("Template deleted"))
}
