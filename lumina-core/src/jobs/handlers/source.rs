//! Shared helpers for the image-producing handlers: reading one entry's
//! bytes from its backing store and picking a cache folder to write into.

use std::path::{Path, PathBuf};

use lumina_model::{CacheFolder, Collection, CollectionType, ImageEntry};

use crate::archive;
use crate::error::{CoreError, Result};
use crate::imaging::video::{extract_frame, is_video_path};
use crate::store::CacheFolderRepository;

/// Raw bytes of one embedded image: read from the folder or extracted from
/// the archive; video entries yield a representative frame.
pub(crate) async fn load_entry_bytes(
    collection: &Collection,
    image: &ImageEntry,
) -> Result<Vec<u8>> {
    match collection.collection_type {
        CollectionType::Folder => {
            let path =
                Path::new(&collection.path).join(&image.relative_path);
            if is_video_path(&path) {
                return extract_frame(&path).await;
            }
            Ok(tokio::fs::read(&path).await?)
        }
        CollectionType::Archive => archive::read_entry(
            Path::new(&collection.path),
            &image.archive_entry.entry_name,
        ),
    }
}

/// First active cache folder, highest priority first, with room for
/// `expected_bytes` more.
pub(crate) async fn pick_cache_folder(
    repo: &dyn CacheFolderRepository,
    expected_bytes: u64,
) -> Result<CacheFolder> {
    let folders = repo.list_active().await?;
    folders
        .into_iter()
        .find(|folder| folder.has_room_for(expected_bytes))
        .ok_or_else(|| {
            CoreError::Handler(
                "no active cache folder has room for generated images".into(),
            )
        })
}

/// Output directory for one collection inside a cache folder.
pub(crate) fn collection_dir(
    folder: &CacheFolder,
    subdir: &str,
    collection: &Collection,
) -> PathBuf {
    Path::new(&folder.path)
        .join(subdir)
        .join(collection.id.to_string())
}
