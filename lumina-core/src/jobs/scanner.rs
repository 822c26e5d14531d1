//! Collection scanning: enumerate the backing folder or archive and rebuild
//! the embedded image entry list.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use lumina_model::{
    ArchiveEntryInfo, Collection, CollectionType, EntryFileType, ImageEntry,
};

use crate::archive;
use crate::error::{CoreError, Result};
use crate::imaging::is_image_path;
use crate::imaging::video::is_video_path;

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub images: Vec<ImageEntry>,
    pub total_size: u64,
}

/// Synchronous scan of one collection's backing store. Ids and extracted
/// dimensions of entries whose relative path survived are preserved so
/// thumbnails and cache images stay linked across rescans.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionScanner;

impl CollectionScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, collection: &Collection) -> Result<ScanOutcome> {
        let existing: HashMap<&str, &ImageEntry> = collection
            .images
            .iter()
            .map(|img| (img.relative_path.as_str(), img))
            .collect();

        let mut images = match collection.collection_type {
            CollectionType::Folder => {
                self.scan_folder(&collection.path, &existing)?
            }
            CollectionType::Archive => {
                self.scan_archive(&collection.path, &existing)?
            }
        };
        images.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let total_size = images.iter().map(|img| img.file_size).sum();
        debug!(
            "Scanned collection {}: {} entries, {} bytes",
            collection.id,
            images.len(),
            total_size
        );
        Ok(ScanOutcome { images, total_size })
    }

    fn scan_folder(
        &self,
        root: &str,
        existing: &HashMap<&str, &ImageEntry>,
    ) -> Result<Vec<ImageEntry>> {
        let root_path = Path::new(root);
        if !root_path.is_dir() {
            return Err(CoreError::NotFound(format!(
                "collection folder {root} does not exist"
            )));
        }

        let mut images = Vec::new();
        for entry in WalkDir::new(root_path).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable path under {}: {}", root, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !is_image_path(path) && !is_video_path(path) {
                continue;
            }
            let relative = path
                .strip_prefix(root_path)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let filename = entry.file_name().to_string_lossy().to_string();

            images.push(Self::build_entry(
                existing,
                filename,
                relative.clone(),
                size,
                ArchiveEntryInfo {
                    archive_path: root.to_string(),
                    entry_name: relative,
                    entry_path: path.to_string_lossy().to_string(),
                    file_type: EntryFileType::RegularFile,
                    compressed_size: size,
                    uncompressed_size: size,
                },
            ));
        }
        Ok(images)
    }

    fn scan_archive(
        &self,
        archive_path: &str,
        existing: &HashMap<&str, &ImageEntry>,
    ) -> Result<Vec<ImageEntry>> {
        let entries = archive::list_entries(Path::new(archive_path))?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let filename = entry.filename().to_string();
                let name = entry.name.clone();
                Self::build_entry(
                    existing,
                    filename,
                    name.clone(),
                    entry.uncompressed_size,
                    ArchiveEntryInfo {
                        archive_path: archive_path.to_string(),
                        entry_name: name.clone(),
                        entry_path: name,
                        file_type: EntryFileType::ArchiveEntry,
                        compressed_size: entry.compressed_size,
                        uncompressed_size: entry.uncompressed_size,
                    },
                )
            })
            .collect())
    }

    fn build_entry(
        existing: &HashMap<&str, &ImageEntry>,
        filename: String,
        relative_path: String,
        file_size: u64,
        archive_entry: ArchiveEntryInfo,
    ) -> ImageEntry {
        let prior = existing.get(relative_path.as_str());
        ImageEntry {
            id: prior.map(|p| p.id).unwrap_or_else(Uuid::new_v4),
            filename,
            relative_path,
            width: prior.map(|p| p.width).unwrap_or(0),
            height: prior.map(|p| p.height).unwrap_or(0),
            file_size,
            archive_entry,
        }
    }
}
