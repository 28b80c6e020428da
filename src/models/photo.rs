//! Photo evidence attached to a maintenance record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Photo {
    pub id: Uuid,
    pub record_id: Uuid,
    pub file_path: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub caption: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    /// Public URL of the file, filled in at the HTTP layer.
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// An uploaded image that has not been written to storage yet.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub original_name: String,
    pub data: Vec<u8>,
    pub caption: Option<String>,
}
