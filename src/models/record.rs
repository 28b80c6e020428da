//! Maintenance record model: submitted checklists and their review status.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::approval::Approval;
use crate::models::photo::Photo;
use crate::models::template::{DeviceCategory, TemplateSnapshot};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "record_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

/// Device answers keyed by the template's field keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DeviceData {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
    #[serde(default)]
    pub special: BTreeMap<String, String>,
}

/// Section title -> item label -> column header -> value.
pub type ChecklistResponses = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Record {
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    pub category: DeviceCategory,
    pub template_snapshot: Json<TemplateSnapshot>,
    pub employee_id: Uuid,
    pub device_data: Json<DeviceData>,
    pub checklist_responses: Json<ChecklistResponses>,
    pub notes: Option<String>,
    pub status: RecordStatus,
    pub pdf_path: Option<String>,
    pub pdf_sha256: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Summary DTO for list views.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecordSummary {
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    pub template_name: String,
    pub category: DeviceCategory,
    pub employee_id: Uuid,
    pub employee_name: String,
    pub status: RecordStatus,
    pub photo_count: i64,
    pub has_pdf: bool,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Record with photos and review trail for detail views.
#[derive(Debug, Clone, Serialize)]
pub struct RecordWithDetails {
    #[serde(flatten)]
    pub record: Record,
    pub employee_name: String,
    pub photos: Vec<Photo>,
    pub approvals: Vec<Approval>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRecord {
    pub template_id: Uuid,
    #[serde(default)]
    pub device_data: DeviceData,
    #[serde(default)]
    pub checklist_responses: ChecklistResponses,
    #[validate(length(max = 5000, message = "must be at most 5000 characters"))]
    pub notes: Option<String>,
    /// Captions for uploaded photos, matched by upload order.
    #[serde(default)]
    pub photo_captions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Validate)]
pub struct UpdateRecord {
    pub device_data: Option<DeviceData>,
    pub checklist_responses: Option<ChecklistResponses>,
    #[validate(length(max = 5000, message = "must be at most 5000 characters"))]
    pub notes: Option<String>,
}

/// Per-status and per-category counts for the admin dashboard.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RecordStatusSummary {
    pub pending: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub active_templates: i64,
    pub by_category: BTreeMap<String, i64>,
}
