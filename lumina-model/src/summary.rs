use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::{Collection, CollectionType};
use crate::ids::CollectionId;

/// Compact projection of a collection used by listings and sibling pages.
///
/// Stored as JSON under `collection_index:data:{id}`. `thumbnail_base64` is a
/// fully formed data URL so the card grid renders with zero extra fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub id: CollectionId,
    pub name: String,
    pub first_image_id: Option<Uuid>,
    pub image_count: u64,
    pub thumbnail_count: u64,
    pub cache_count: u64,
    pub total_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub library_id: Option<Uuid>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    #[serde(default)]
    pub tags: Vec<String>,
    pub path: String,
    pub thumbnail_base64: Option<String>,
}

impl CollectionSummary {
    /// Projection without the inline thumbnail; the index engine fills
    /// `thumbnail_base64` in afterwards when the policy allows it.
    pub fn from_collection(collection: &Collection) -> Self {
        Self {
            id: collection.id,
            name: collection.name.clone(),
            first_image_id: collection.first_image_id(),
            image_count: collection.images.len() as u64,
            thumbnail_count: collection.thumbnails.len() as u64,
            cache_count: collection.cache_images.len() as u64,
            total_size: collection.statistics.total_size,
            created_at: collection.created_at,
            updated_at: collection.updated_at,
            library_id: collection.library_id,
            description: collection.description.clone(),
            collection_type: collection.collection_type,
            tags: collection.tags.clone(),
            path: collection.path.clone(),
            thumbnail_base64: None,
        }
    }
}

/// Per-collection bookkeeping record, stored under
/// `collection_index:state:{id}`.
///
/// `indexed_at >= collection_updated_at` holds immediately after a successful
/// index write for the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionIndexState {
    pub collection_id: CollectionId,
    pub indexed_at: DateTime<Utc>,
    pub collection_updated_at: DateTime<Utc>,
    pub image_count: u64,
    pub thumbnail_count: u64,
    pub cache_count: u64,
    pub has_first_thumbnail: bool,
    pub first_thumbnail_path: Option<String>,
    pub index_version: u32,
}

impl CollectionIndexState {
    pub const CURRENT_VERSION: u32 = 2;

    pub fn for_collection(collection: &Collection) -> Self {
        let first_thumbnail = collection.first_thumbnail();
        Self {
            collection_id: collection.id,
            indexed_at: Utc::now(),
            collection_updated_at: collection.updated_at,
            image_count: collection.images.len() as u64,
            thumbnail_count: collection.thumbnails.len() as u64,
            cache_count: collection.cache_images.len() as u64,
            has_first_thumbnail: first_thumbnail.is_some(),
            first_thumbnail_path: first_thumbnail
                .and_then(|t| t.thumbnail_path.clone()),
            index_version: Self::CURRENT_VERSION,
        }
    }

    /// True when the indexed snapshot is stale relative to the collection
    /// document: the document moved forward, or a first thumbnail appeared
    /// after the last index write.
    pub fn is_stale_for(&self, collection: &Collection) -> bool {
        if self.collection_updated_at < collection.updated_at {
            return true;
        }
        !self.has_first_thumbnail && collection.first_thumbnail().is_some()
    }
}
