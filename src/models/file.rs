use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Active,
    Deleted,
    Expired,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::Deleted => "deleted",
            FileStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(FileStatus::Active),
            "deleted" => Some(FileStatus::Deleted),
            "expired" => Some(FileStatus::Expired),
            _ => None,
        }
    }
}

/// Attachment metadata. The binary itself lives in external storage; messages
/// reference a file by id and copy the display fields into their metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: i64,
    pub url: String,
    pub status: FileStatus,
    pub thumbnail_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    /// Audio duration, when the uploader recorded one in the free-form extras.
    pub fn duration_ms(&self) -> Option<i64> {
        self.metadata.get("duration_ms").and_then(|v| v.as_i64())
    }
}
