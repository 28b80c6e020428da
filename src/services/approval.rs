//! Review decisions: accept or reject a pending record, and PDF access.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::approval::{Approval, ApprovalAction, ReviewRequest};
use crate::models::audit::CreateAuditLog;
use crate::models::record::{Record, RecordStatus};
use crate::services::pdf::{self, PdfEngine, ReviewerInfo};
use crate::services::storage::{FileStorage, PDFS_DIR};
use crate::services::workflow::{self, Actor};
use crate::services::{audit, record as record_service};

/// Collaborators needed to render and store record documents.
#[derive(Clone, Copy)]
pub struct DocumentContext<'a> {
    pub pool: &'a PgPool,
    pub storage: &'a FileStorage,
    pub engine: &'a dyn PdfEngine,
    pub organization: &'a str,
}

/// Result of a successful review.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub record: Record,
    pub approval: Approval,
}

/// A rendered PDF ready to send to the client.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

fn file_name(record: &Record) -> String {
    format!(
        "pm-{}-{}.pdf",
        record.category.as_str(),
        record.created_at.format("%Y%m%d")
    )
}

/// Approvals for a record, oldest first, with the admin's display name.
pub async fn list_for_record(pool: &PgPool, record_id: Uuid) -> Result<Vec<Approval>, AppError> {
    let approvals = sqlx::query_as::<_, Approval>(
        r#"
        SELECT a.id, a.record_id, a.admin_id, u.display_name AS admin_name,
               a.action, a.notes, a.created_at
        FROM approvals a
        JOIN users u ON u.id = a.admin_id
        WHERE a.record_id = $1
        ORDER BY a.created_at ASC, a.id ASC
        "#,
    )
    .bind(record_id)
    .fetch_all(pool)
    .await?;
    Ok(approvals)
}

/// Render and store the accepted document. Returns `(relative path, sha256)`.
async fn render_accepted(
    ctx: DocumentContext<'_>,
    conn: &mut PgConnection,
    record: &Record,
    admin_id: Uuid,
    signed_at: DateTime<Utc>,
    notes: Option<String>,
) -> Result<(String, String), AppError> {
    let mut accepted = record.clone();
    accepted.status = RecordStatus::Accepted;
    accepted.reviewed_by = Some(admin_id);
    accepted.reviewed_at = Some(signed_at);

    let doc = pdf::build_document(
        conn,
        ctx.storage,
        ctx.organization,
        &accepted,
        Some(ReviewerInfo {
            admin_id,
            signed_at,
        }),
        notes,
    )
    .await?;
    let bytes = ctx.engine.html_to_pdf(&pdf::render_html(&doc)).await?;
    let checksum = pdf::sha256_hex(&bytes);
    let path = ctx.storage.put(PDFS_DIR, "pdf", &bytes).await?;
    Ok((path, checksum))
}

/// Accept or reject a pending record.
///
/// The record row stays locked for the whole review, so concurrent reviewers
/// queue up and all but the first see a non-pending status. Everything,
/// including the document lookups, runs on the review transaction.
pub async fn review(
    ctx: DocumentContext<'_>,
    record_id: Uuid,
    input: &ReviewRequest,
    admin: &Actor,
) -> Result<ReviewOutcome, AppError> {
    if !admin.is_admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let mut tx = ctx.pool.begin().await?;
    let record = sqlx::query_as::<_, Record>("SELECT * FROM records WHERE id = $1 FOR UPDATE")
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Record not found".to_string()))?;

    let notes = workflow::validate_review(record.status, input.action, input.notes.as_deref())?;
    let to = workflow::target_status(input.action);
    let reviewed_at = Utc::now();

    let stored_pdf = match input.action {
        ApprovalAction::Accepted => {
            let rendered =
                render_accepted(ctx, &mut *tx, &record, admin.id, reviewed_at, notes.clone())
                    .await?;
            Some(rendered)
        }
        ApprovalAction::Rejected => None,
    };
    let (pdf_path, pdf_sha256) = match &stored_pdf {
        Some((path, sha)) => (Some(path.as_str()), Some(sha.as_str())),
        None => (None, None),
    };

    let result = async {
        let updated = sqlx::query_as::<_, Record>(
            r#"
            UPDATE records SET
                status = $2,
                pdf_path = $3,
                pdf_sha256 = $4,
                reviewed_by = $5,
                reviewed_at = $6,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(record_id)
        .bind(to)
        .bind(pdf_path)
        .bind(pdf_sha256)
        .bind(admin.id)
        .bind(reviewed_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::InvalidTransition("Record has already been reviewed".to_string())
        })?;

        let approval = sqlx::query_as::<_, Approval>(
            r#"
            INSERT INTO approvals (record_id, admin_id, action, notes)
            VALUES ($1, $2, $3, $4)
            RETURNING id, record_id, admin_id,
                (SELECT display_name FROM users WHERE id = admin_id) AS admin_name,
                action, notes, created_at
            "#,
        )
        .bind(record_id)
        .bind(admin.id)
        .bind(input.action)
        .bind(&notes)
        .fetch_one(&mut *tx)
        .await?;

        audit::log(
            &mut *tx,
            &CreateAuditLog::new("record", record_id, "review")
                .by(admin.id, &admin.username)
                .with_details(serde_json::json!({
                    "from": record.status,
                    "to": to,
                    "approval_id": approval.id,
                    "pdf_path": pdf_path,
                })),
        )
        .await?;

        tx.commit().await?;
        Ok::<_, AppError>(ReviewOutcome {
            record: updated,
            approval,
        })
    }
    .await;

    match result {
        Ok(outcome) => {
            tracing::info!(
                record_id = %record_id,
                admin = %admin.username,
                status = to.as_str(),
                "Maintenance record reviewed"
            );
            Ok(outcome)
        }
        Err(e) => {
            if let Some((path, _)) = &stored_pdf {
                if let Err(cleanup) = ctx.storage.delete(path).await {
                    tracing::warn!(path = %path, error = %cleanup, "Failed to remove orphaned PDF");
                }
            }
            Err(e)
        }
    }
}

/// Render a record to PDF without storing it. Admin only.
pub async fn preview(
    ctx: DocumentContext<'_>,
    record_id: Uuid,
    admin: &Actor,
) -> Result<PdfDocument, AppError> {
    if !admin.is_admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    let record = record_service::find_by_id(ctx.pool, record_id).await?;

    let reviewer = match (record.status, record.reviewed_by, record.reviewed_at) {
        (RecordStatus::Accepted, Some(admin_id), Some(signed_at)) => Some(ReviewerInfo {
            admin_id,
            signed_at,
        }),
        _ => None,
    };
    let review_notes = list_for_record(ctx.pool, record_id)
        .await?
        .into_iter()
        .last()
        .and_then(|a| a.notes);

    let mut conn = ctx.pool.acquire().await?;
    let doc = pdf::build_document(
        &mut *conn,
        ctx.storage,
        ctx.organization,
        &record,
        reviewer,
        review_notes,
    )
    .await?;
    drop(conn);
    let bytes = ctx.engine.html_to_pdf(&pdf::render_html(&doc)).await?;

    Ok(PdfDocument {
        file_name: format!("preview-{}", file_name(&record)),
        bytes,
    })
}

/// Stored PDF of an accepted record. Owner or admin.
pub async fn download(
    pool: &PgPool,
    storage: &FileStorage,
    record_id: Uuid,
    actor: &Actor,
) -> Result<PdfDocument, AppError> {
    let record = record_service::find_for_actor(pool, record_id, actor).await?;
    let path = match (record.status, record.pdf_path.as_deref()) {
        (RecordStatus::Accepted, Some(path)) => path,
        _ => return Err(AppError::NotFound("PDF not available for this record".to_string())),
    };

    let bytes = storage.read(path).await?;
    Ok(PdfDocument {
        file_name: file_name(&record),
        bytes,
    })
}
