//! Photo evidence: upload checks, storage, and record association.

use std::sync::OnceLock;

use image::ImageFormat;
use regex::Regex;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::audit::CreateAuditLog;
use crate::models::photo::{Photo, PhotoUpload};
use crate::models::record::RecordStatus;
use crate::services::audit;
use crate::services::storage::{FileStorage, PHOTOS_DIR};
use crate::services::workflow::{self, Actor};

/// Upload limits applied to every photo batch.
#[derive(Debug, Clone, Copy)]
pub struct PhotoLimits {
    pub max_bytes: usize,
    pub max_per_record: usize,
}

/// A photo already written to storage, waiting for its database row.
#[derive(Debug, Clone)]
pub struct StoredPhoto {
    pub file_path: String,
    pub original_name: String,
    pub content_type: &'static str,
    pub size_bytes: i64,
    pub caption: Option<String>,
}

/// Identify an accepted image type from its leading bytes.
///
/// Returns `(extension, content type)`; anything but JPEG, PNG or WebP fails.
pub fn sniff_image(data: &[u8]) -> Result<(&'static str, &'static str), AppError> {
    match image::guess_format(data) {
        Ok(ImageFormat::Jpeg) => Ok(("jpg", "image/jpeg")),
        Ok(ImageFormat::Png) => Ok(("png", "image/png")),
        Ok(ImageFormat::WebP) => Ok(("webp", "image/webp")),
        _ => Err(AppError::Validation(
            "Only JPEG, PNG or WebP images are accepted".to_string(),
        )),
    }
}

/// Reduce a client-supplied file name to a safe display name.
pub fn sanitize_file_name(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex"));

    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = re.replace_all(base.trim(), "_");
    let cleaned: String = cleaned.trim_matches('_').chars().take(200).collect();
    if cleaned.is_empty() {
        "photo".to_string()
    } else {
        cleaned
    }
}

/// Check a batch against the limits before anything touches disk.
pub fn check_batch(
    uploads: &[PhotoUpload],
    existing: usize,
    limits: PhotoLimits,
) -> Result<(), AppError> {
    if existing + uploads.len() > limits.max_per_record {
        return Err(AppError::Validation(format!(
            "A record may have at most {} photos",
            limits.max_per_record
        )));
    }
    for upload in uploads {
        if upload.data.is_empty() {
            return Err(AppError::Validation(format!(
                "Photo '{}' is empty",
                upload.original_name
            )));
        }
        if upload.data.len() > limits.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Photo '{}' exceeds {} bytes",
                upload.original_name, limits.max_bytes
            )));
        }
        sniff_image(&upload.data)?;
    }
    Ok(())
}

/// Write a batch to storage. On failure, files written so far are removed.
pub async fn write_files(
    storage: &FileStorage,
    uploads: &[PhotoUpload],
) -> Result<Vec<StoredPhoto>, AppError> {
    let mut stored = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let (ext, content_type) = sniff_image(&upload.data)?;
        match storage.put(PHOTOS_DIR, ext, &upload.data).await {
            Ok(file_path) => stored.push(StoredPhoto {
                file_path,
                original_name: sanitize_file_name(&upload.original_name),
                content_type,
                size_bytes: upload.data.len() as i64,
                caption: upload
                    .caption
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
            }),
            Err(e) => {
                discard(storage, &stored).await;
                return Err(e);
            }
        }
    }
    Ok(stored)
}

/// Best-effort removal of files whose database rows never landed.
pub async fn discard(storage: &FileStorage, stored: &[StoredPhoto]) {
    for photo in stored {
        if let Err(e) = storage.delete(&photo.file_path).await {
            tracing::warn!(path = %photo.file_path, error = %e, "Failed to remove orphaned photo");
        }
    }
}

/// Insert rows for stored photos inside the caller's transaction.
pub async fn insert_all(
    conn: &mut PgConnection,
    record_id: Uuid,
    stored: &[StoredPhoto],
) -> Result<Vec<Photo>, AppError> {
    let mut photos = Vec::with_capacity(stored.len());
    for photo in stored {
        let row = sqlx::query_as::<_, Photo>(
            r#"
            INSERT INTO record_photos
                (record_id, file_path, original_name, content_type, size_bytes, caption)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(record_id)
        .bind(&photo.file_path)
        .bind(&photo.original_name)
        .bind(photo.content_type)
        .bind(photo.size_bytes)
        .bind(&photo.caption)
        .fetch_one(&mut *conn)
        .await?;
        photos.push(row);
    }
    Ok(photos)
}

/// List a record's photos in upload order.
pub async fn list_for_record<'e, E>(executor: E, record_id: Uuid) -> Result<Vec<Photo>, AppError>
where
    E: PgExecutor<'e>,
{
    let photos = sqlx::query_as::<_, Photo>(
        "SELECT * FROM record_photos WHERE record_id = $1 ORDER BY uploaded_at ASC, id ASC",
    )
    .bind(record_id)
    .fetch_all(executor)
    .await?;
    Ok(photos)
}

/// Lock a record row and return `(employee_id, status)`.
async fn lock_record(
    conn: &mut PgConnection,
    record_id: Uuid,
) -> Result<(Uuid, RecordStatus), AppError> {
    sqlx::query_as::<_, (Uuid, RecordStatus)>(
        "SELECT employee_id, status FROM records WHERE id = $1 FOR UPDATE",
    )
    .bind(record_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Record not found".to_string()))
}

/// Attach more photos to a pending record.
pub async fn add_photos(
    pool: &PgPool,
    storage: &FileStorage,
    record_id: Uuid,
    uploads: &[PhotoUpload],
    limits: PhotoLimits,
    actor: &Actor,
) -> Result<Vec<Photo>, AppError> {
    if uploads.is_empty() {
        return Err(AppError::Validation("No photos uploaded".to_string()));
    }

    let mut tx = pool.begin().await?;
    let (owner, status) = lock_record(&mut tx, record_id).await?;
    actor.ensure_can_access(owner)?;
    workflow::ensure_mutable(status)?;

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM record_photos WHERE record_id = $1",
    )
    .bind(record_id)
    .fetch_one(&mut *tx)
    .await?;
    check_batch(uploads, existing as usize, limits)?;

    let stored = write_files(storage, uploads).await?;
    let result = async {
        let photos = insert_all(&mut tx, record_id, &stored).await?;
        audit::log(
            &mut *tx,
            &CreateAuditLog::new("record", record_id, "add_photos")
                .by(actor.id, &actor.username)
                .with_details(serde_json::json!({ "count": photos.len() })),
        )
        .await?;
        tx.commit().await?;
        Ok::<_, AppError>(photos)
    }
    .await;

    if result.is_err() {
        discard(storage, &stored).await;
    }
    result
}

/// Remove one photo from a pending record.
pub async fn delete_photo(
    pool: &PgPool,
    storage: &FileStorage,
    record_id: Uuid,
    photo_id: Uuid,
    actor: &Actor,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    let (owner, status) = lock_record(&mut tx, record_id).await?;
    actor.ensure_can_access(owner)?;
    workflow::ensure_mutable(status)?;

    let file_path = sqlx::query_scalar::<_, String>(
        "DELETE FROM record_photos WHERE id = $1 AND record_id = $2 RETURNING file_path",
    )
    .bind(photo_id)
    .bind(record_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Photo not found".to_string()))?;

    audit::log(
        &mut *tx,
        &CreateAuditLog::new("record", record_id, "delete_photo")
            .by(actor.id, &actor.username)
            .with_details(serde_json::json!({ "photo_id": photo_id })),
    )
    .await?;

    tx.commit().await?;

    if let Err(e) = storage.delete(&file_path).await {
        tracing::warn!(path = %file_path, error = %e, "Failed to remove deleted photo file");
    }
    Ok(())
}
