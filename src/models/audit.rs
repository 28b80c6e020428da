//! Audit log model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub actor_name: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditLog {
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub actor_name: String,
    pub details: Option<serde_json::Value>,
}

impl CreateAuditLog {
    pub fn new(entity_type: &str, entity_id: Uuid, action: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: Some(entity_id),
            action: action.to_string(),
            actor_id: None,
            actor_name: "system".to_string(),
            details: None,
        }
    }

    pub fn by(mut self, actor_id: Uuid, actor_name: &str) -> Self {
        self.actor_id = Some(actor_id);
        self.actor_name = actor_name.to_string();
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Filters for listing audit entries.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditFilters {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
}
