//! Checklist template model and the frozen snapshot embedded in records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "device_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    Computer,
    Laptop,
    Printer,
    Network,
    Server,
    Cctv,
    Ups,
    Other,
}

impl DeviceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Computer => "computer",
            Self::Laptop => "laptop",
            Self::Printer => "printer",
            Self::Network => "network",
            Self::Server => "server",
            Self::Cctv => "cctv",
            Self::Ups => "ups",
            Self::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Computer => "Computer",
            Self::Laptop => "Laptop",
            Self::Printer => "Printer",
            Self::Network => "Network Device",
            Self::Server => "Server",
            Self::Cctv => "CCTV",
            Self::Ups => "UPS",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Date,
    Textarea,
}

/// A single input the employee fills in for the device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateField {
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub field_type: FieldType,
}

/// One checklist section: a table of `items` (rows) by `columns`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecklistSection {
    pub title: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub order: i32,
}

pub type FieldMap = BTreeMap<String, TemplateField>;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Template {
    pub id: Uuid,
    pub category: DeviceCategory,
    pub name: String,
    pub device_fields: Json<FieldMap>,
    pub configuration_items: Json<Vec<String>>,
    pub special_fields: Json<FieldMap>,
    pub items: Json<Vec<ChecklistSection>>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Summary DTO for list views.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateSummary {
    pub id: Uuid,
    pub category: DeviceCategory,
    pub name: String,
    pub is_active: bool,
    pub section_count: i32,
    pub record_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTemplate {
    pub category: DeviceCategory,
    #[validate(length(min = 1, max = 255, message = "must be 1-255 characters"))]
    pub name: String,
    #[serde(default)]
    pub device_fields: FieldMap,
    #[serde(default)]
    pub configuration_items: Vec<String>,
    #[serde(default)]
    pub special_fields: FieldMap,
    #[serde(default)]
    pub items: Vec<ChecklistSection>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Validate)]
pub struct UpdateTemplate {
    pub category: Option<DeviceCategory>,
    #[validate(length(min = 1, max = 255, message = "must be 1-255 characters"))]
    pub name: Option<String>,
    pub device_fields: Option<FieldMap>,
    pub configuration_items: Option<Vec<String>>,
    pub special_fields: Option<FieldMap>,
    pub items: Option<Vec<ChecklistSection>>,
    pub is_active: Option<bool>,
}

/// Frozen copy of a template's structure, stored on each record at submission.
///
/// Records render and validate against this copy only, so later edits to or
/// deletion of the source template never alter historical records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateSnapshot {
    pub template_id: Uuid,
    pub name: String,
    pub category: DeviceCategory,
    pub device_fields: FieldMap,
    pub configuration_items: Vec<String>,
    pub special_fields: FieldMap,
    pub items: Vec<ChecklistSection>,
    pub captured_at: DateTime<Utc>,
}

impl TemplateSnapshot {
    pub fn section(&self, title: &str) -> Option<&ChecklistSection> {
        self.items.iter().find(|s| s.title == title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_category_serialization() {
        let json = serde_json::to_string(&DeviceCategory::Cctv).unwrap();
        assert_eq!(json, "\"cctv\"");
        assert_eq!(DeviceCategory::Ups.label(), "UPS");
    }

    #[test]
    fn template_field_defaults() {
        let field: TemplateField = serde_json::from_str(r#"{"label": "Serial Number"}"#).unwrap();
        assert!(!field.required);
        assert_eq!(field.field_type, FieldType::Text);
    }

    #[test]
    fn create_template_accepts_sparse_body() {
        let input: CreateTemplate = serde_json::from_value(serde_json::json!({
            "category": "printer",
            "name": "Printer Monthly PM",
            "items": [{"title": "Mechanics", "columns": ["OK", "Remark"]}]
        }))
        .unwrap();
        assert!(input.device_fields.is_empty());
        assert_eq!(input.items[0].order, 0);
        assert!(input.items[0].items.is_empty());
        assert!(input.is_active.is_none());
    }
}
