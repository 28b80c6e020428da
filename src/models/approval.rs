//! Append-only review decisions on maintenance records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "approval_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Approval {
    pub id: Uuid,
    pub record_id: Uuid,
    pub admin_id: Uuid,
    pub admin_name: String,
    pub action: ApprovalAction,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request body for reviewing a pending record.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub action: ApprovalAction,
    pub notes: Option<String>,
}
