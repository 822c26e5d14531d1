use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::CollectionId;

/// Backing storage of a collection: a plain directory of images or a single
/// archive file (ZIP/CBZ; RAR and 7z are recognised but not readable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Folder,
    Archive,
}

impl CollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Archive => "archive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "folder" => Some(Self::Folder),
            "archive" => Some(Self::Archive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryFileType {
    RegularFile,
    ArchiveEntry,
}

/// Location of an image inside its backing store.
///
/// For `CollectionType::Archive`, `entry_name` is the entry's full path
/// inside the archive; for `CollectionType::Folder` it is the path relative
/// to the collection root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntryInfo {
    pub archive_path: String,
    pub entry_name: String,
    pub entry_path: String,
    pub file_type: EntryFileType,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

/// A single image embedded in a collection document.
///
/// `width`/`height` of 0 mean "unknown, pending extraction".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEntry {
    pub id: Uuid,
    pub filename: String,
    pub relative_path: String,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub archive_entry: ArchiveEntryInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailEmbedded {
    pub image_id: Uuid,
    pub thumbnail_path: Option<String>,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub format: String,
    /// When set, `thumbnail_path` points at the original image rather than a
    /// pre-generated thumbnail file.
    pub is_direct: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheImageEmbedded {
    pub image_id: Uuid,
    pub cache_path: String,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub generated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStatistics {
    pub total_items: u64,
    pub total_size: u64,
    pub total_views: u64,
    pub last_viewed: Option<DateTime<Utc>>,
}

/// The primary document owned by the DocStore. Everything the index engine
/// keeps in the KVS is a projection of this aggregate and can be rebuilt
/// from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: CollectionId,
    pub library_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub path: String,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub statistics: CollectionStatistics,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    #[serde(default)]
    pub thumbnails: Vec<ThumbnailEmbedded>,
    #[serde(default)]
    pub cache_images: Vec<CacheImageEmbedded>,
}

impl Collection {
    /// Thumbnail record for the collection's first image, if one exists.
    /// This is the thumbnail that listings inline.
    pub fn first_thumbnail(&self) -> Option<&ThumbnailEmbedded> {
        let first = self.images.first()?;
        self.thumbnails.iter().find(|t| t.image_id == first.id)
    }

    pub fn first_image_id(&self) -> Option<Uuid> {
        self.images.first().map(|img| img.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_thumbnail_follows_the_first_image() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut collection = Collection {
            id: CollectionId::generate(),
            library_id: None,
            name: "test".into(),
            description: None,
            path: "/library/test".into(),
            collection_type: CollectionType::Folder,
            is_active: true,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            statistics: CollectionStatistics::default(),
            tags: vec![],
            images: vec![
                entry(a, "001.jpg"),
                entry(b, "002.jpg"),
            ],
            thumbnails: vec![thumb(b), thumb(a)],
            cache_images: vec![],
        };

        assert_eq!(collection.first_thumbnail().unwrap().image_id, a);
        collection.images.remove(0);
        assert_eq!(collection.first_thumbnail().unwrap().image_id, b);
    }

    fn entry(id: Uuid, name: &str) -> ImageEntry {
        ImageEntry {
            id,
            filename: name.into(),
            relative_path: name.into(),
            width: 0,
            height: 0,
            file_size: 10,
            archive_entry: ArchiveEntryInfo {
                archive_path: String::new(),
                entry_name: name.into(),
                entry_path: name.into(),
                file_type: EntryFileType::RegularFile,
                compressed_size: 10,
                uncompressed_size: 10,
            },
        }
    }

    fn thumb(image_id: Uuid) -> ThumbnailEmbedded {
        ThumbnailEmbedded {
            image_id,
            thumbnail_path: Some("thumb.jpg".into()),
            width: 300,
            height: 300,
            file_size: 1024,
            format: "jpg".into(),
            is_direct: false,
            generated_at: Utc::now(),
        }
    }
}
