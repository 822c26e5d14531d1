use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::CollectionId;

/// A disk location cache images are written to. Folders are picked by
/// priority, highest first, skipping any that would exceed `max_size_bytes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheFolder {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub current_size_bytes: u64,
    pub max_size_bytes: u64,
    pub total_files: u64,
    #[serde(default)]
    pub cached_collection_ids: Vec<CollectionId>,
    pub is_active: bool,
    pub priority: i32,
}

impl CacheFolder {
    pub fn has_room_for(&self, bytes: u64) -> bool {
        self.current_size_bytes.saturating_add(bytes) <= self.max_size_bytes
    }
}
