//! Shared fixtures for the integration suites: an index engine and job
//! pipeline wired entirely against the in-memory adapters.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use lumina_core::config::{AppConfig, ThumbnailConfig};
use lumina_core::index::CollectionIndexEngine;
use lumina_core::kvs::MemoryKvs;
use lumina_core::store::memory::{
    MemoryCacheFolderRepository, MemoryCollectionRepository,
    MemoryJobRepository, MemorySettingsRepository,
};
use lumina_core::store::CollectionRepository;
use lumina_model::{
    ArchiveEntryInfo, CacheFolder, Collection, CollectionId,
    CollectionStatistics, CollectionType, EntryFileType, ImageEntry,
    ThumbnailEmbedded,
};

pub struct Harness {
    pub kvs: Arc<MemoryKvs>,
    pub collections: Arc<MemoryCollectionRepository>,
    pub jobs: Arc<MemoryJobRepository>,
    pub cache_folders: Arc<MemoryCacheFolderRepository>,
    pub settings: Arc<MemorySettingsRepository>,
    pub engine: Arc<CollectionIndexEngine>,
}

pub fn harness() -> Harness {
    let kvs = Arc::new(MemoryKvs::new());
    let collections = MemoryCollectionRepository::shared();
    let jobs = MemoryJobRepository::shared();
    let cache_folders = MemoryCacheFolderRepository::shared();
    let settings = MemorySettingsRepository::shared();
    let engine = Arc::new(CollectionIndexEngine::new(
        kvs.clone(),
        collections.clone(),
        cache_folders.clone(),
        jobs.clone(),
        settings.clone(),
        ThumbnailConfig::default(),
    ));
    Harness {
        kvs,
        collections,
        jobs,
        cache_folders,
        settings,
        engine,
    }
}

pub fn app_config() -> Arc<AppConfig> {
    Arc::new(AppConfig::default())
}

/// Base timestamp all scenario fixtures hang off.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Deterministic id whose ordering follows `n`.
pub fn id(n: u8) -> CollectionId {
    let mut bytes = [0u8; 12];
    bytes[0] = n;
    bytes[11] = n;
    CollectionId::from_bytes(bytes)
}

pub fn collection(n: u8, name: &str, updated_at: DateTime<Utc>) -> Collection {
    Collection {
        id: id(n),
        library_id: None,
        name: name.to_string(),
        description: None,
        path: format!("/library/{name}"),
        collection_type: CollectionType::Folder,
        is_active: true,
        is_deleted: false,
        created_at: updated_at - Duration::hours(1),
        updated_at,
        statistics: CollectionStatistics {
            total_items: 0,
            total_size: n as u64 * 1000,
            total_views: 0,
            last_viewed: None,
        },
        tags: vec![],
        images: vec![],
        thumbnails: vec![],
        cache_images: vec![],
    }
}

pub fn image_entry(root: &str, filename: &str, size: u64) -> ImageEntry {
    ImageEntry {
        id: Uuid::new_v4(),
        filename: filename.to_string(),
        relative_path: filename.to_string(),
        width: 0,
        height: 0,
        file_size: size,
        archive_entry: ArchiveEntryInfo {
            archive_path: root.to_string(),
            entry_name: filename.to_string(),
            entry_path: format!("{root}/{filename}"),
            file_type: EntryFileType::RegularFile,
            compressed_size: size,
            uncompressed_size: size,
        },
    }
}

pub fn thumbnail_record(image_id: Uuid, path: &str) -> ThumbnailEmbedded {
    ThumbnailEmbedded {
        image_id,
        thumbnail_path: Some(path.to_string()),
        width: 200,
        height: 200,
        file_size: 2048,
        format: "png".to_string(),
        is_direct: false,
        generated_at: Utc::now(),
    }
}

pub fn cache_folder(path: &str) -> CacheFolder {
    CacheFolder {
        id: Uuid::new_v4(),
        name: "primary".to_string(),
        path: path.to_string(),
        current_size_bytes: 0,
        max_size_bytes: u64::MAX / 2,
        total_files: 0,
        cached_collection_ids: vec![],
        is_active: true,
        priority: 10,
    }
}

pub fn write_png(path: &std::path::Path, width: u32, height: u32) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 251) as u8, (y % 241) as u8, 64])
    });
    img.save(path).unwrap();
}

/// Distinct per-collection values on every sort field, so rank mirroring
/// holds without score ties.
pub async fn seed_distinct(
    collections: &MemoryCollectionRepository,
    count: u8,
) -> Vec<Collection> {
    let mut seeded = Vec::new();
    for n in 1..=count {
        // Names must diverge inside the scored 10-character prefix.
        let mut c = collection(
            n,
            &format!("c{n:03}"),
            t0() + Duration::minutes(n as i64),
        );
        c.statistics.total_size = n as u64 * 4096;
        c.images = (0..n)
            .map(|i| image_entry(&c.path, &format!("{i:03}.jpg"), 100))
            .collect();
        collections.upsert(&c).await.unwrap();
        seeded.push(c);
    }
    seeded
}
