use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known setting keys consumed by the index engine and the pipeline.
pub mod keys {
    pub const THUMBNAIL_SIZE: &str = "thumbnail.size";
    pub const THUMBNAIL_FORMAT: &str = "thumbnail.format";
    pub const THUMBNAIL_QUALITY: &str = "thumbnail.quality";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSetting {
    pub id: Uuid,
    pub setting_key: String,
    pub value: String,
    pub category: String,
    pub updated_at: DateTime<Utc>,
}
