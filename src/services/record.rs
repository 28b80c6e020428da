//! Maintenance record service: submission, listing, edits while pending.

use std::collections::BTreeMap;

use serde::Deserialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::audit::CreateAuditLog;
use crate::models::pagination::{PagedResult, Pagination};
use crate::models::photo::PhotoUpload;
use crate::models::record::{
    ChecklistResponses, CreateRecord, DeviceData, Record, RecordStatus, RecordStatusSummary,
    RecordSummary, RecordWithDetails, UpdateRecord,
};
use crate::models::template::{DeviceCategory, FieldMap, TemplateSnapshot};
use crate::services::photo::{self, PhotoLimits};
use crate::services::storage::FileStorage;
use crate::services::workflow::{self, Actor};
use crate::services::{approval, audit, template};

/// Filters for listing records.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RecordFilters {
    pub status: Option<RecordStatus>,
    pub category: Option<DeviceCategory>,
    pub employee_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub search: Option<String>,
}

impl RecordFilters {
    /// Employees only ever see their own records.
    pub fn scoped_to(mut self, actor: &Actor) -> Self {
        if !actor.is_admin {
            self.employee_id = Some(actor.id);
        }
        self
    }
}

fn check_fields(
    kind: &str,
    fields: &FieldMap,
    values: &BTreeMap<String, String>,
) -> Result<(), AppError> {
    if let Some(unknown) = values.keys().find(|k| !fields.contains_key(*k)) {
        return Err(AppError::Validation(format!("Unknown {kind} '{unknown}'")));
    }
    for (key, field) in fields.iter().filter(|(_, f)| f.required) {
        let filled = values.get(key).is_some_and(|v| !v.trim().is_empty());
        if !filled {
            return Err(AppError::Validation(format!(
                "{} is required",
                field.label
            )));
        }
    }
    Ok(())
}

/// Check submitted answers against the structure they were captured for.
pub fn validate_submission(
    snapshot: &TemplateSnapshot,
    device: &DeviceData,
    responses: &ChecklistResponses,
) -> Result<(), AppError> {
    check_fields("device field", &snapshot.device_fields, &device.fields)?;
    check_fields("special field", &snapshot.special_fields, &device.special)?;

    if let Some(unknown) = device
        .configuration
        .keys()
        .find(|k| !snapshot.configuration_items.contains(k))
    {
        return Err(AppError::Validation(format!(
            "Unknown configuration item '{unknown}'"
        )));
    }

    for (title, rows) in responses {
        let section = snapshot
            .section(title)
            .ok_or_else(|| AppError::Validation(format!("Unknown checklist section '{title}'")))?;
        for (item, cells) in rows {
            if !section.items.contains(item) {
                return Err(AppError::Validation(format!(
                    "Unknown item '{item}' in section '{title}'"
                )));
            }
            if let Some(column) = cells.keys().find(|c| !section.columns.contains(c)) {
                return Err(AppError::Validation(format!(
                    "Unknown column '{column}' in section '{title}'"
                )));
            }
        }
    }
    Ok(())
}

fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Submit a new record against an active template, with its photos.
pub async fn create(
    pool: &PgPool,
    storage: &FileStorage,
    input: &CreateRecord,
    mut uploads: Vec<PhotoUpload>,
    limits: PhotoLimits,
    actor: &Actor,
) -> Result<RecordWithDetails, AppError> {
    input.validate()?;

    let template = template::find_by_id(pool, input.template_id).await?;
    if !template.is_active {
        return Err(AppError::Validation(format!(
            "Template '{}' is not active",
            template.name
        )));
    }

    let snapshot = template::snapshot(&template);
    validate_submission(&snapshot, &input.device_data, &input.checklist_responses)?;

    for (upload, caption) in uploads.iter_mut().zip(&input.photo_captions) {
        if upload.caption.is_none() {
            upload.caption = Some(caption.clone());
        }
    }
    photo::check_batch(&uploads, 0, limits)?;
    let stored = photo::write_files(storage, &uploads).await?;

    let result = async {
        let mut tx = pool.begin().await?;

        let record = sqlx::query_as::<_, Record>(
            r#"
            INSERT INTO records (template_id, category, template_snapshot, employee_id,
                device_data, checklist_responses, notes, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING *
            "#,
        )
        .bind(template.id)
        .bind(template.category)
        .bind(Json(&snapshot))
        .bind(actor.id)
        .bind(Json(&input.device_data))
        .bind(Json(&input.checklist_responses))
        .bind(normalize_notes(input.notes.as_deref()))
        .fetch_one(&mut *tx)
        .await?;

        let photos = photo::insert_all(&mut tx, record.id, &stored).await?;

        audit::log(
            &mut *tx,
            &CreateAuditLog::new("record", record.id, "submit")
                .by(actor.id, &actor.username)
                .with_details(serde_json::json!({
                    "template_id": template.id,
                    "template_name": template.name,
                    "photo_count": photos.len(),
                })),
        )
        .await?;

        let employee_name = sqlx::query_scalar::<_, String>(
            "SELECT display_name FROM users WHERE id = $1",
        )
        .bind(actor.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok::<_, AppError>(RecordWithDetails {
            record,
            employee_name,
            photos,
            approvals: Vec::new(),
        })
    }
    .await;

    match result {
        Ok(details) => {
            tracing::info!(
                record_id = %details.record.id,
                template_id = %template.id,
                employee = %actor.username,
                photos = details.photos.len(),
                "Maintenance record submitted"
            );
            Ok(details)
        }
        Err(e) => {
            photo::discard(storage, &stored).await;
            Err(e)
        }
    }
}

/// Find record by ID.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Record, AppError> {
    sqlx::query_as::<_, Record>("SELECT * FROM records WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Record not found".to_string()))
}

/// Find a record the actor is allowed to see.
pub async fn find_for_actor(pool: &PgPool, id: Uuid, actor: &Actor) -> Result<Record, AppError> {
    let record = find_by_id(pool, id).await?;
    actor.ensure_can_access(record.employee_id)?;
    Ok(record)
}

/// Record with employee name, photos, and review trail.
pub async fn find_with_details(
    pool: &PgPool,
    id: Uuid,
    actor: &Actor,
) -> Result<RecordWithDetails, AppError> {
    let record = find_for_actor(pool, id, actor).await?;

    let employee_name =
        sqlx::query_scalar::<_, String>("SELECT display_name FROM users WHERE id = $1")
            .bind(record.employee_id)
            .fetch_one(pool)
            .await?;
    let photos = photo::list_for_record(pool, id).await?;
    let approvals = approval::list_for_record(pool, id).await?;

    Ok(RecordWithDetails {
        record,
        employee_name,
        photos,
        approvals,
    })
}

/// Build the WHERE clause for record filters. Parameters bind in field order.
fn where_clause(filters: &RecordFilters) -> String {
    let mut conditions: Vec<String> = Vec::new();
    let mut param_index = 0u32;

    if filters.status.is_some() {
        param_index += 1;
        conditions.push(format!("r.status = ${param_index}"));
    }
    if filters.category.is_some() {
        param_index += 1;
        conditions.push(format!("r.category = ${param_index}"));
    }
    if filters.employee_id.is_some() {
        param_index += 1;
        conditions.push(format!("r.employee_id = ${param_index}"));
    }
    if filters.template_id.is_some() {
        param_index += 1;
        conditions.push(format!("r.template_id = ${param_index}"));
    }
    if filters.search.is_some() {
        param_index += 1;
        conditions.push(format!(
            "(r.template_snapshot->>'name' ILIKE ${param_index} \
             OR u.display_name ILIKE ${param_index})"
        ));
    }

    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

macro_rules! bind_filters {
    ($query:expr, $filters:expr) => {{
        let mut q = $query;
        if let Some(status) = $filters.status {
            q = q.bind(status);
        }
        if let Some(category) = $filters.category {
            q = q.bind(category);
        }
        if let Some(employee_id) = $filters.employee_id {
            q = q.bind(employee_id);
        }
        if let Some(template_id) = $filters.template_id {
            q = q.bind(template_id);
        }
        if let Some(ref search) = $filters.search {
            q = q.bind(format!("%{}%", search.trim()));
        }
        q
    }};
}

const SUMMARY_COLUMNS: &str = "r.id, r.template_id, r.template_snapshot->>'name' AS template_name, \
     r.category, r.employee_id, u.display_name AS employee_name, r.status, \
     (SELECT COUNT(*) FROM record_photos p WHERE p.record_id = r.id) AS photo_count, \
     (r.pdf_path IS NOT NULL) AS has_pdf, r.reviewed_at, r.created_at";

/// List records with filters and pagination, newest first.
pub async fn list(
    pool: &PgPool,
    filters: &RecordFilters,
    pagination: &Pagination,
) -> Result<PagedResult<RecordSummary>, AppError> {
    let where_clause = where_clause(filters);

    let count_sql = format!(
        "SELECT COUNT(*) FROM records r JOIN users u ON u.id = r.employee_id {where_clause}"
    );
    let data_sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM records r JOIN users u ON u.id = r.employee_id \
         {where_clause} ORDER BY r.created_at DESC, r.id DESC LIMIT {} OFFSET {}",
        pagination.limit(),
        pagination.offset()
    );

    let count_query = bind_filters!(sqlx::query_scalar::<_, i64>(&count_sql), filters);
    let data_query = bind_filters!(sqlx::query_as::<_, RecordSummary>(&data_sql), filters);

    let total = count_query.fetch_one(pool).await?;
    let items = data_query.fetch_all(pool).await?;

    Ok(PagedResult::new(items, total, pagination))
}

/// All records matching the filters, oldest first, for export.
pub async fn list_all(
    pool: &PgPool,
    filters: &RecordFilters,
) -> Result<Vec<(RecordSummary, Option<String>)>, AppError> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        summary: RecordSummary,
        pdf_path: Option<String>,
    }

    let sql = format!(
        "SELECT {SUMMARY_COLUMNS}, r.pdf_path FROM records r \
         JOIN users u ON u.id = r.employee_id {} ORDER BY r.created_at ASC, r.id ASC",
        where_clause(filters)
    );
    let rows = bind_filters!(sqlx::query_as::<_, Row>(&sql), filters)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| (r.summary, r.pdf_path)).collect())
}

/// Edit a pending record. Answers are checked against its own snapshot.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    input: &UpdateRecord,
    actor: &Actor,
) -> Result<Record, AppError> {
    input.validate()?;

    let mut tx = pool.begin().await?;
    let existing = sqlx::query_as::<_, Record>("SELECT * FROM records WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Record not found".to_string()))?;

    actor.ensure_can_access(existing.employee_id)?;
    workflow::ensure_mutable(existing.status)?;

    let device = input.device_data.as_ref().unwrap_or(&existing.device_data.0);
    let responses = input
        .checklist_responses
        .as_ref()
        .unwrap_or(&existing.checklist_responses.0);
    validate_submission(&existing.template_snapshot.0, device, responses)?;

    let notes = match input.notes.as_deref() {
        Some(notes) => normalize_notes(Some(notes)),
        None => existing.notes.clone(),
    };

    let record = sqlx::query_as::<_, Record>(
        r#"
        UPDATE records SET
            device_data = $2,
            checklist_responses = $3,
            notes = $4,
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(Json(device))
    .bind(Json(responses))
    .bind(notes)
    .fetch_one(&mut *tx)
    .await?;

    audit::log(
        &mut *tx,
        &CreateAuditLog::new("record", id, "update").by(actor.id, &actor.username),
    )
    .await?;

    tx.commit().await?;
    Ok(record)
}

/// Delete a pending record and its photo files.
pub async fn delete(
    pool: &PgPool,
    storage: &FileStorage,
    id: Uuid,
    actor: &Actor,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    let (owner, status) = sqlx::query_as::<_, (Uuid, RecordStatus)>(
        "SELECT employee_id, status FROM records WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Record not found".to_string()))?;

    actor.ensure_can_access(owner)?;
    workflow::ensure_mutable(status)?;

    let files = sqlx::query_scalar::<_, String>(
        "SELECT file_path FROM record_photos WHERE record_id = $1",
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM records WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    audit::log(
        &mut *tx,
        &CreateAuditLog::new("record", id, "delete")
            .by(actor.id, &actor.username)
            .with_details(serde_json::json!({ "photo_count": files.len() })),
    )
    .await?;

    tx.commit().await?;

    for file in &files {
        if let Err(e) = storage.delete(file).await {
            tracing::warn!(path = %file, error = %e, "Failed to remove photo of deleted record");
        }
    }
    tracing::info!(record_id = %id, actor = %actor.username, "Maintenance record deleted");
    Ok(())
}

/// Counts per status and category, plus the number of active templates.
pub async fn status_summary(pool: &PgPool) -> Result<RecordStatusSummary, AppError> {
    let mut summary = RecordStatusSummary::default();

    let by_status = sqlx::query_as::<_, (RecordStatus, i64)>(
        "SELECT status, COUNT(*) FROM records GROUP BY status",
    )
    .fetch_all(pool)
    .await?;
    for (status, count) in by_status {
        match status {
            RecordStatus::Pending => summary.pending = count,
            RecordStatus::Accepted => summary.accepted = count,
            RecordStatus::Rejected => summary.rejected = count,
        }
    }

    let by_category = sqlx::query_as::<_, (DeviceCategory, i64)>(
        "SELECT category, COUNT(*) FROM records GROUP BY category",
    )
    .fetch_all(pool)
    .await?;
    summary.by_category = by_category
        .into_iter()
        .map(|(category, count)| (category.as_str().to_string(), count))
        .collect();

    summary.active_templates =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM templates WHERE is_active")
            .fetch_one(pool)
            .await?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::template::{ChecklistSection, FieldType, TemplateField};

    fn snapshot() -> TemplateSnapshot {
        let mut device_fields = FieldMap::new();
        device_fields.insert(
            "serial_number".to_string(),
            TemplateField {
                label: "Serial Number".to_string(),
                required: true,
                field_type: FieldType::Text,
            },
        );
        device_fields.insert(
            "location".to_string(),
            TemplateField {
                label: "Location".to_string(),
                required: false,
                field_type: FieldType::Text,
            },
        );
        TemplateSnapshot {
            template_id: Uuid::nil(),
            name: "PC Quarterly".to_string(),
            category: DeviceCategory::Computer,
            device_fields,
            configuration_items: vec!["IP Address".to_string()],
            special_fields: FieldMap::new(),
            items: vec![ChecklistSection {
                title: "Hardware".to_string(),
                columns: vec!["OK".to_string(), "Remark".to_string()],
                items: vec!["Fan".to_string()],
                order: 1,
            }],
            captured_at: Utc::now(),
        }
    }

    fn device(serial: &str) -> DeviceData {
        let mut data = DeviceData::default();
        data.fields
            .insert("serial_number".to_string(), serial.to_string());
        data
    }

    fn responses(section: &str, item: &str, column: &str) -> ChecklistResponses {
        let mut cells = BTreeMap::new();
        cells.insert(column.to_string(), "yes".to_string());
        let mut rows = BTreeMap::new();
        rows.insert(item.to_string(), cells);
        let mut out = BTreeMap::new();
        out.insert(section.to_string(), rows);
        out
    }

    #[test]
    fn complete_submission_passes() {
        let mut data = device("SN-1");
        data.configuration
            .insert("IP Address".to_string(), "10.0.0.5".to_string());
        let answers = responses("Hardware", "Fan", "OK");
        assert!(validate_submission(&snapshot(), &data, &answers).is_ok());
    }

    #[test]
    fn missing_required_field_rejected() {
        let err = validate_submission(&snapshot(), &device("  "), &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("Serial Number is required"));

        let err =
            validate_submission(&snapshot(), &DeviceData::default(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn unknown_keys_rejected() {
        let mut data = device("SN-1");
        data.fields.insert("colour".to_string(), "red".to_string());
        assert!(validate_submission(&snapshot(), &data, &BTreeMap::new()).is_err());

        let mut data = device("SN-1");
        data.configuration
            .insert("MAC".to_string(), "aa:bb".to_string());
        assert!(validate_submission(&snapshot(), &data, &BTreeMap::new()).is_err());
    }

    #[test]
    fn responses_must_match_snapshot() {
        let snap = snapshot();
        let data = device("SN-1");
        assert!(validate_submission(&snap, &data, &responses("Software", "Fan", "OK")).is_err());
        assert!(validate_submission(&snap, &data, &responses("Hardware", "Disk", "OK")).is_err());
        assert!(
            validate_submission(&snap, &data, &responses("Hardware", "Fan", "Status")).is_err()
        );
    }

    #[test]
    fn employees_are_scoped_to_own_records() {
        let employee = Actor {
            id: Uuid::new_v4(),
            username: "tech".to_string(),
            is_admin: false,
        };
        let filters = RecordFilters {
            employee_id: Some(Uuid::new_v4()),
            ..Default::default()
        }
        .scoped_to(&employee);
        assert_eq!(filters.employee_id, Some(employee.id));

        let admin = Actor {
            is_admin: true,
            ..employee
        };
        let other = Uuid::new_v4();
        let filters = RecordFilters {
            employee_id: Some(other),
            ..Default::default()
        }
        .scoped_to(&admin);
        assert_eq!(filters.employee_id, Some(other));
    }

    #[test]
    fn where_clause_numbers_parameters_in_order() {
        let filters = RecordFilters {
            status: Some(RecordStatus::Pending),
            employee_id: Some(Uuid::nil()),
            search: Some("ups".to_string()),
            ..Default::default()
        };
        let clause = where_clause(&filters);
        assert!(clause.starts_with("WHERE r.status = $1 AND r.employee_id = $2"));
        assert!(clause.contains("ILIKE $3"));
        assert!(where_clause(&RecordFilters::default()).is_empty());
    }

    #[test]
    fn notes_are_trimmed_and_blank_dropped() {
        assert_eq!(normalize_notes(Some("  ok ")), Some("ok".to_string()));
        assert_eq!(normalize_notes(Some("   ")), None);
        assert_eq!(normalize_notes(None), None);
    }
}
