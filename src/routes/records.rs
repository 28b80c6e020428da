//! Record routes: submission, edits, photos, review, PDFs, reports.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::middleware::rbac::RequireAdmin;
use crate::models::approval::{Approval, ReviewRequest};
use crate::models::pagination::{PagedResult, Pagination};
use crate::models::photo::{Photo, PhotoUpload};
use crate::models::record::{
    CreateRecord, Record, RecordStatusSummary, RecordSummary, RecordWithDetails, UpdateRecord,
};
use crate::routes::{field_text, field_upload, multipart_error};
use crate::services::approval::{
    self as approval_service, DocumentContext, PdfDocument, ReviewOutcome,
};
use crate::services::photo::{self as photo_service, PhotoLimits};
use crate::services::record::{self as record_service, RecordFilters};
use crate::services::report;
use crate::services::workflow::Actor;
use crate::AppState;

fn photo_limits(state: &AppState) -> PhotoLimits {
    PhotoLimits {
        max_bytes: state.config.max_upload_bytes,
        max_per_record: state.config.max_photos_per_record,
    }
}

fn document_context(state: &AppState) -> DocumentContext<'_> {
    DocumentContext {
        pool: &state.db,
        storage: &state.storage,
        engine: state.pdf.as_ref(),
        organization: &state.config.organization_name,
    }
}

fn with_urls(state: &AppState, photos: &mut [Photo]) {
    for photo in photos {
        photo.url = Some(state.storage.public_url(&photo.file_path));
    }
}

fn pdf_response(doc: PdfDocument, disposition: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("{disposition}; filename=\"{}\"", doc.file_name),
            ),
        ],
        doc.bytes,
    )
        .into_response()
}

/// Collect `photos` file parts and an optional `captions` JSON array.
///
/// Any other text part is returned by name for the caller to interpret.
async fn read_photo_parts(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<(Vec<PhotoUpload>, Vec<(String, String)>), AppError> {
    let mut uploads = Vec::new();
    let mut captions: Vec<String> = Vec::new();
    let mut other = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "photos" => uploads.push(field_upload(field, max_bytes).await?),
            "captions" => {
                let text = field_text(field).await?;
                captions = serde_json::from_str(&text).map_err(|e| {
                    AppError::Validation(format!("'captions' must be a JSON array of strings: {e}"))
                })?;
            }
            _ => {
                let text = field_text(field).await?;
                other.push((name, text));
            }
        }
    }

    for (upload, caption) in uploads.iter_mut().zip(captions) {
        upload.caption = Some(caption);
    }
    Ok((uploads, other))
}

/// GET /api/v1/records: list records. Employees only see their own.
pub async fn list(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filters): Query<RecordFilters>,
) -> Result<Json<ApiResponse<PagedResult<RecordSummary>>>, AppError> {
    let filters = filters.scoped_to(&Actor::from(&current_user));
    let result = record_service::list(&state.db, &filters, &pagination).await?;
    Ok(ApiResponse::success(result))
}

/// POST /api/v1/records: submit a record (multipart: `data` JSON + `photos` files).
pub async fn create(
    State(state): State<AppState>,
    current_user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<RecordWithDetails>>, AppError> {
    let (uploads, parts) = read_photo_parts(&mut multipart, state.config.max_upload_bytes).await?;

    let data = parts
        .into_iter()
        .find(|(name, _)| name == "data")
        .map(|(_, text)| text)
        .ok_or_else(|| {
            AppError::Validation("Missing 'data' field in multipart request".to_string())
        })?;
    let input: CreateRecord = serde_json::from_str(&data)
        .map_err(|e| AppError::Validation(format!("Invalid record data: {e}")))?;

    let mut result = record_service::create(
        &state.db,
        &state.storage,
        &input,
        uploads,
        photo_limits(&state),
        &Actor::from(&current_user),
    )
    .await?;
    with_urls(&state, &mut result.photos);
    Ok(ApiResponse::success(result))
}

/// GET /api/v1/records/:id: record with photos and approvals.
pub async fn get_by_id(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RecordWithDetails>>, AppError> {
    let mut result =
        record_service::find_with_details(&state.db, id, &Actor::from(&current_user)).await?;
    with_urls(&state, &mut result.photos);
    Ok(ApiResponse::success(result))
}

/// PUT /api/v1/records/:id: edit a pending record.
pub async fn update(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateRecord>,
) -> Result<Json<ApiResponse<Record>>, AppError> {
    let record =
        record_service::update(&state.db, id, &body, &Actor::from(&current_user)).await?;
    Ok(ApiResponse::success(record))
}

/// DELETE /api/v1/records/:id: delete a pending record.
pub async fn delete(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    record_service::delete(&state.db, &state.storage, id, &Actor::from(&current_user)).await?;
    Ok(ApiResponse::success("Record deleted"))
}

/// POST /api/v1/records/:id/photos: attach photos to a pending record.
pub async fn add_photos(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Vec<Photo>>>, AppError> {
    let (uploads, _) = read_photo_parts(&mut multipart, state.config.max_upload_bytes).await?;
    let mut photos = photo_service::add_photos(
        &state.db,
        &state.storage,
        id,
        &uploads,
        photo_limits(&state),
        &Actor::from(&current_user),
    )
    .await?;
    with_urls(&state, &mut photos);
    Ok(ApiResponse::success(photos))
}

/// DELETE /api/v1/records/:id/photos/:photo_id
pub async fn delete_photo(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((id, photo_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    photo_service::delete_photo(
        &state.db,
        &state.storage,
        id,
        photo_id,
        &Actor::from(&current_user),
    )
    .await?;
    Ok(ApiResponse::success("Photo deleted"))
}

/// POST /api/v1/records/:id/review: accept or reject (admin).
pub async fn review(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<ApiResponse<ReviewOutcome>>, AppError> {
    let outcome =
        approval_service::review(document_context(&state), id, &body, &Actor::from(&admin))
            .await?;
    Ok(ApiResponse::success(outcome))
}

/// GET /api/v1/records/:id/approvals: review trail.
pub async fn approvals(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Approval>>>, AppError> {
    record_service::find_for_actor(&state.db, id, &Actor::from(&current_user)).await?;
    let approvals = approval_service::list_for_record(&state.db, id).await?;
    Ok(ApiResponse::success(approvals))
}

/// GET /api/v1/records/:id/pdf: stored PDF of an accepted record.
pub async fn download_pdf(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let doc = approval_service::download(
        &state.db,
        &state.storage,
        id,
        &Actor::from(&current_user),
    )
    .await?;
    Ok(pdf_response(doc, "attachment"))
}

/// GET /api/v1/records/:id/pdf/preview: render without storing (admin).
pub async fn preview_pdf(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let doc =
        approval_service::preview(document_context(&state), id, &Actor::from(&admin)).await?;
    Ok(pdf_response(doc, "inline"))
}

/// GET /api/v1/records/summary: status and category counts (admin).
pub async fn summary(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<ApiResponse<RecordStatusSummary>>, AppError> {
    let summary = record_service::status_summary(&state.db).await?;
    Ok(ApiResponse::success(summary))
}

/// GET /api/v1/records/export: CSV of matching records (admin).
pub async fn export(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(filters): Query<RecordFilters>,
) -> Result<Response, AppError> {
    let csv = report::export_csv(&state.db, &filters).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"maintenance-records.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}
