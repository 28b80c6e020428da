//! Append-only audit trail of administrative and workflow actions.

use sqlx::{PgExecutor, PgPool};

use crate::errors::AppError;
use crate::models::audit::{AuditFilters, AuditLog, CreateAuditLog};
use crate::models::pagination::{PagedResult, Pagination};

/// Insert an audit entry. Accepts a pool or an open transaction.
pub async fn log<'e, E>(executor: E, entry: &CreateAuditLog) -> Result<(), AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_log (entity_type, entity_id, action, actor_id, actor_name, details)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&entry.entity_type)
    .bind(entry.entity_id)
    .bind(&entry.action)
    .bind(entry.actor_id)
    .bind(&entry.actor_name)
    .bind(&entry.details)
    .execute(executor)
    .await?;
    Ok(())
}

/// List audit entries, newest first.
pub async fn list(
    pool: &PgPool,
    filters: &AuditFilters,
    pagination: &Pagination,
) -> Result<PagedResult<AuditLog>, AppError> {
    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM audit_log
        WHERE ($1::text IS NULL OR entity_type = $1)
          AND ($2::uuid IS NULL OR entity_id = $2)
        "#,
    )
    .bind(&filters.entity_type)
    .bind(filters.entity_id)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, AuditLog>(
        r#"
        SELECT * FROM audit_log
        WHERE ($1::text IS NULL OR entity_type = $1)
          AND ($2::uuid IS NULL OR entity_id = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(&filters.entity_type)
    .bind(filters.entity_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(pool)
    .await?;

    Ok(PagedResult::new(items, total, pagination))
}
