//! Checklist template service: CRUD, duplication, and snapshotting.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::audit::CreateAuditLog;
use crate::models::pagination::{PagedResult, Pagination};
use crate::models::template::{
    ChecklistSection, CreateTemplate, DeviceCategory, FieldMap, Template, TemplateSnapshot,
    TemplateSummary, UpdateTemplate,
};
use crate::services::audit;

/// Filters for listing templates.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TemplateFilters {
    pub category: Option<DeviceCategory>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

fn field_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{0,63}$").expect("static regex"))
}

fn validate_fields(kind: &str, fields: &FieldMap) -> Result<(), AppError> {
    for (key, field) in fields {
        if !field_key_pattern().is_match(key) {
            return Err(AppError::Validation(format!(
                "{kind} key '{key}' must be lowercase snake_case"
            )));
        }
        if field.label.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "{kind} '{key}' requires a label"
            )));
        }
    }
    Ok(())
}

fn ensure_unique_non_blank<'a>(
    what: &str,
    values: impl IntoIterator<Item = &'a String>,
) -> Result<(), AppError> {
    let mut seen = HashSet::new();
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation(format!("{what} must not be blank")));
        }
        if !seen.insert(trimmed) {
            return Err(AppError::Validation(format!(
                "Duplicate {what} '{trimmed}'"
            )));
        }
    }
    Ok(())
}

/// Check the structural rules of a template body.
pub fn validate_structure(
    device_fields: &FieldMap,
    configuration_items: &[String],
    special_fields: &FieldMap,
    sections: &[ChecklistSection],
) -> Result<(), AppError> {
    validate_fields("Device field", device_fields)?;
    validate_fields("Special field", special_fields)?;
    ensure_unique_non_blank("configuration item", configuration_items)?;
    ensure_unique_non_blank("section title", sections.iter().map(|s| &s.title))?;

    for section in sections {
        if section.columns.is_empty() {
            return Err(AppError::Validation(format!(
                "Section '{}' needs at least one column",
                section.title
            )));
        }
        ensure_unique_non_blank("column", &section.columns)?;
        ensure_unique_non_blank("checklist item", &section.items)?;
    }
    Ok(())
}

/// Longest template name the `templates.name` column holds.
const NAME_MAX_CHARS: usize = 255;
const COPY_SUFFIX: &str = " (Copy)";

/// Trimmed template name; blank or over-long names are rejected.
fn clean_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Template name must not be blank".to_string()));
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(AppError::Validation(format!(
            "Template name must be at most {NAME_MAX_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

/// `"<name> (Copy)"`, shortening the base name so the result still fits.
fn copy_name(name: &str) -> String {
    let room = NAME_MAX_CHARS - COPY_SUFFIX.chars().count();
    let base: String = name.chars().take(room).collect();
    format!("{}{COPY_SUFFIX}", base.trim_end())
}

fn trim_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim().to_string()).collect()
}

/// Sections with titles, columns and items trimmed, as they are stored and matched.
fn clean_sections(sections: &[ChecklistSection]) -> Vec<ChecklistSection> {
    sections
        .iter()
        .map(|s| ChecklistSection {
            title: s.title.trim().to_string(),
            columns: trim_all(&s.columns),
            items: trim_all(&s.items),
            order: s.order,
        })
        .collect()
}

/// Freeze a template's structure for embedding into a record.
pub fn snapshot(template: &Template) -> TemplateSnapshot {
    let mut items = template.items.0.clone();
    items.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.title.cmp(&b.title)));

    TemplateSnapshot {
        template_id: template.id,
        name: template.name.clone(),
        category: template.category,
        device_fields: template.device_fields.0.clone(),
        configuration_items: template.configuration_items.0.clone(),
        special_fields: template.special_fields.0.clone(),
        items,
        captured_at: Utc::now(),
    }
}

/// Create a new template.
pub async fn create(
    pool: &PgPool,
    input: &CreateTemplate,
    actor_id: Uuid,
    actor_name: &str,
) -> Result<Template, AppError> {
    input.validate()?;
    let name = clean_name(&input.name)?;
    let configuration_items = trim_all(&input.configuration_items);
    let items = clean_sections(&input.items);
    validate_structure(
        &input.device_fields,
        &configuration_items,
        &input.special_fields,
        &items,
    )?;

    let mut tx = pool.begin().await?;

    let template = sqlx::query_as::<_, Template>(
        r#"
        INSERT INTO templates (category, name, device_fields, configuration_items,
            special_fields, items, is_active, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, true), $8)
        RETURNING *
        "#,
    )
    .bind(input.category)
    .bind(&name)
    .bind(Json(&input.device_fields))
    .bind(Json(&configuration_items))
    .bind(Json(&input.special_fields))
    .bind(Json(&items))
    .bind(input.is_active)
    .bind(actor_id)
    .fetch_one(&mut *tx)
    .await?;

    audit::log(
        &mut *tx,
        &CreateAuditLog::new("template", template.id, "create")
            .by(actor_id, actor_name)
            .with_details(serde_json::json!({
                "name": template.name,
                "category": template.category,
            })),
    )
    .await?;

    tx.commit().await?;
    Ok(template)
}

/// Find template by ID.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Template, AppError> {
    sqlx::query_as::<_, Template>("SELECT * FROM templates WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Template not found".to_string()))
}

/// List templates with filters and pagination.
pub async fn list(
    pool: &PgPool,
    filters: &TemplateFilters,
    pagination: &Pagination,
) -> Result<PagedResult<TemplateSummary>, AppError> {
    let mut conditions: Vec<String> = Vec::new();
    let mut param_index = 0u32;

    if filters.category.is_some() {
        param_index += 1;
        conditions.push(format!("t.category = ${param_index}"));
    }
    if filters.is_active.is_some() {
        param_index += 1;
        conditions.push(format!("t.is_active = ${param_index}"));
    }
    if filters.search.is_some() {
        param_index += 1;
        conditions.push(format!("t.name ILIKE ${param_index}"));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM templates t {where_clause}");
    let data_sql = format!(
        "SELECT t.id, t.category, t.name, t.is_active, \
                jsonb_array_length(t.items) AS section_count, \
                (SELECT COUNT(*) FROM records r WHERE r.template_id = t.id) AS record_count, \
                t.updated_at \
         FROM templates t {where_clause} ORDER BY t.category ASC, t.name ASC LIMIT {} OFFSET {}",
        pagination.limit(),
        pagination.offset()
    );

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    let mut data_query = sqlx::query_as::<_, TemplateSummary>(&data_sql);

    if let Some(category) = filters.category {
        count_query = count_query.bind(category);
        data_query = data_query.bind(category);
    }
    if let Some(active) = filters.is_active {
        count_query = count_query.bind(active);
        data_query = data_query.bind(active);
    }
    if let Some(ref search) = filters.search {
        let pattern = format!("%{}%", search.trim());
        count_query = count_query.bind(pattern.clone());
        data_query = data_query.bind(pattern);
    }

    let total = count_query.fetch_one(pool).await?;
    let items = data_query.fetch_all(pool).await?;

    Ok(PagedResult::new(items, total, pagination))
}

/// Update a template. Records already submitted keep their own snapshot.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    input: &UpdateTemplate,
    actor_id: Uuid,
    actor_name: &str,
) -> Result<Template, AppError> {
    input.validate()?;
    let name = input.name.as_deref().map(clean_name).transpose()?;
    let existing = find_by_id(pool, id).await?;

    let device_fields = input.device_fields.as_ref().unwrap_or(&existing.device_fields.0);
    let configuration_items = trim_all(
        input
            .configuration_items
            .as_ref()
            .unwrap_or(&existing.configuration_items.0),
    );
    let special_fields = input
        .special_fields
        .as_ref()
        .unwrap_or(&existing.special_fields.0);
    let items = clean_sections(input.items.as_ref().unwrap_or(&existing.items.0));
    validate_structure(device_fields, &configuration_items, special_fields, &items)?;

    let mut tx = pool.begin().await?;

    let template = sqlx::query_as::<_, Template>(
        r#"
        UPDATE templates SET
            category = COALESCE($2, category),
            name = COALESCE($3, name),
            device_fields = $4,
            configuration_items = $5,
            special_fields = $6,
            items = $7,
            is_active = COALESCE($8, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(input.category)
    .bind(name)
    .bind(Json(device_fields))
    .bind(Json(&configuration_items))
    .bind(Json(special_fields))
    .bind(Json(&items))
    .bind(input.is_active)
    .fetch_one(&mut *tx)
    .await?;

    audit::log(
        &mut *tx,
        &CreateAuditLog::new("template", id, "update").by(actor_id, actor_name),
    )
    .await?;

    tx.commit().await?;
    Ok(template)
}

/// Copy a template under a new name. The copy starts inactive.
pub async fn duplicate(
    pool: &PgPool,
    id: Uuid,
    actor_id: Uuid,
    actor_name: &str,
) -> Result<Template, AppError> {
    let source = find_by_id(pool, id).await?;
    let mut tx = pool.begin().await?;

    let copy = sqlx::query_as::<_, Template>(
        r#"
        INSERT INTO templates (category, name, device_fields, configuration_items,
            special_fields, items, is_active, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, false, $7)
        RETURNING *
        "#,
    )
    .bind(source.category)
    .bind(copy_name(&source.name))
    .bind(&source.device_fields)
    .bind(&source.configuration_items)
    .bind(&source.special_fields)
    .bind(&source.items)
    .bind(actor_id)
    .fetch_one(&mut *tx)
    .await?;

    audit::log(
        &mut *tx,
        &CreateAuditLog::new("template", copy.id, "duplicate")
            .by(actor_id, actor_name)
            .with_details(serde_json::json!({ "source_template_id": source.id })),
    )
    .await?;

    tx.commit().await?;
    Ok(copy)
}

/// Delete a template. Its records survive with `template_id` cleared.
pub async fn delete(
    pool: &PgPool,
    id: Uuid,
    actor_id: Uuid,
    actor_name: &str,
) -> Result<(), AppError> {
    let existing = find_by_id(pool, id).await?;
    let mut tx = pool.begin().await?;

    let detached = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM records WHERE template_id = $1",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM templates WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    audit::log(
        &mut *tx,
        &CreateAuditLog::new("template", id, "delete")
            .by(actor_id, actor_name)
            .with_details(serde_json::json!({
                "name": existing.name,
                "detached_records": detached,
            })),
    )
    .await?;

    tx.commit().await?;
    tracing::info!(template_id = %id, detached_records = detached, "Template deleted");
    Ok(())
}
