use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::CollectionId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopCollection {
    pub id: CollectionId,
    pub name: String,
    pub image_count: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheFolderStats {
    pub id: Uuid,
    pub name: String,
    pub current_size_bytes: u64,
    pub max_size_bytes: u64,
    pub total_files: u64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub kvs_healthy: bool,
    pub docstore_healthy: bool,
    pub pending_jobs: u64,
    pub running_jobs: u64,
}

/// Aggregated counters shown on the dashboard. Stored under
/// `collection_index:dashboard:statistics` with a 5-minute TTL and rebuilt
/// by a streaming pass at the end of each index rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatistics {
    pub total_collections: u64,
    pub total_images: u64,
    pub total_thumbnails: u64,
    pub total_cache_images: u64,
    pub total_size_bytes: u64,
    pub collections_by_type: HashMap<String, u64>,
    pub top_by_image_count: Vec<TopCollection>,
    pub top_by_size: Vec<TopCollection>,
    pub cache_folders: Vec<CacheFolderStats>,
    pub system_health: SystemHealth,
    pub generated_at: DateTime<Utc>,
}

impl DashboardStatistics {
    pub fn empty() -> Self {
        Self {
            total_collections: 0,
            total_images: 0,
            total_thumbnails: 0,
            total_cache_images: 0,
            total_size_bytes: 0,
            collections_by_type: HashMap::new(),
            top_by_image_count: Vec::new(),
            top_by_size: Vec::new(),
            cache_folders: Vec::new(),
            system_health: SystemHealth::default(),
            generated_at: Utc::now(),
        }
    }
}

/// One row of the bounded recent-activity list kept under
/// `collection_index:dashboard:metadata` (newest first, capped at 100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub message: String,
}
