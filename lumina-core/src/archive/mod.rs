//! Archive-backed collection support: entry listing, entry reads, and the
//! legacy path-repair ladder.
//!
//! ZIP (and CBZ, which is ZIP) is first-class. RAR and 7z are recognised by
//! extension so scans can report them cleanly instead of failing mid-read.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use lumina_model::{Collection, EntryFileType, ImageEntry};

use crate::error::{CoreError, Result};
use crate::imaging::is_image_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Cbz,
    Rar,
    SevenZ,
}

impl ArchiveKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("zip") => Some(Self::Zip),
            Some("cbz") => Some(Self::Cbz),
            Some("rar") | Some("cbr") => Some(Self::Rar),
            Some("7z") => Some(Self::SevenZ),
            _ => None,
        }
    }

    pub fn is_readable(&self) -> bool {
        matches!(self, Self::Zip | Self::Cbz)
    }
}

/// One image entry inside an archive. `name` is the entry's full in-archive
/// path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntryMeta {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl ArchiveEntryMeta {
    pub fn filename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Resource-fork sidecars produced by macOS archivers. They decode as
/// garbage; failures on them are expected and stay silent.
pub fn is_apple_double(name: &str) -> bool {
    name.rsplit('/').next().unwrap_or(name).starts_with("._")
}

fn is_excluded(name: &str) -> bool {
    name.starts_with("__MACOSX/")
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let kind = ArchiveKind::from_path(path).ok_or_else(|| {
        CoreError::Validation(format!(
            "{} is not a recognised archive",
            path.display()
        ))
    })?;
    if !kind.is_readable() {
        return Err(CoreError::Validation(format!(
            "{:?} archives are not supported: {}",
            kind,
            path.display()
        )));
    }
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| {
        CoreError::Validation(format!(
            "unreadable archive {}: {e}",
            path.display()
        ))
    })
}

/// List image entries of a ZIP/CBZ archive, sorted by in-archive path.
/// `__MACOSX/` housekeeping entries and directories are skipped.
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntryMeta>> {
    let mut archive = open_archive(path)?;
    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(|e| {
            CoreError::Validation(format!(
                "unreadable archive entry in {}: {e}",
                path.display()
            ))
        })?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if is_excluded(&name) || !is_image_path(Path::new(&name)) {
            continue;
        }
        entries.push(ArchiveEntryMeta {
            name,
            compressed_size: entry.compressed_size(),
            uncompressed_size: entry.size(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    debug!("{}: {} image entries", path.display(), entries.len());
    Ok(entries)
}

/// Read one entry's bytes by its full in-archive path.
pub fn read_entry(path: &Path, entry_name: &str) -> Result<Vec<u8>> {
    let mut archive = open_archive(path)?;
    let mut entry = archive.by_name(entry_name).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => CoreError::NotFound(format!(
            "entry {entry_name} not present in {}",
            path.display()
        )),
        other => CoreError::Validation(format!(
            "unreadable archive entry {entry_name}: {other}"
        )),
    })?;
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(data)
}

/// Preferred-match ladder for legacy image records whose `entry_name` may be
/// a bare filename: exact entry name, then exact relative path, then
/// filename-only fallback.
pub fn resolve_entry<'a>(
    entries: &'a [ArchiveEntryMeta],
    image: &ImageEntry,
) -> Option<&'a ArchiveEntryMeta> {
    entries
        .iter()
        .find(|e| e.name == image.archive_entry.entry_name)
        .or_else(|| {
            entries.iter().find(|e| e.name == image.relative_path)
        })
        .or_else(|| {
            entries.iter().find(|e| e.filename() == image.filename)
        })
}

/// Rebuild archive entry records with full in-archive paths. Returns how
/// many records changed. Unresolvable records are left untouched for a later
/// full rescan.
pub fn repair_entry_paths(
    collection: &mut Collection,
    entries: &[ArchiveEntryMeta],
) -> usize {
    let mut repaired = 0;
    for image in &mut collection.images {
        let Some(entry) = resolve_entry(entries, image) else {
            continue;
        };
        if image.archive_entry.entry_name == entry.name
            && image.archive_entry.file_type == EntryFileType::ArchiveEntry
        {
            continue;
        }
        image.archive_entry.entry_name = entry.name.clone();
        image.archive_entry.entry_path = entry.name.clone();
        image.archive_entry.file_type = EntryFileType::ArchiveEntry;
        image.archive_entry.compressed_size = entry.compressed_size;
        image.archive_entry.uncompressed_size = entry.uncompressed_size;
        image.relative_path = entry.name.clone();
        repaired += 1;
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lumina_model::{
        ArchiveEntryInfo, CollectionId, CollectionStatistics, CollectionType,
    };
    use std::io::Write;
    use uuid::Uuid;
    use zip::write::SimpleFileOptions;

    fn write_test_zip(path: &Path, names: &[&str]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for name in names {
            writer.start_file(*name, options).unwrap();
            writer.write_all(&[0u8; 16]).unwrap();
        }
        writer.finish().unwrap();
    }

    fn image_entry(filename: &str, entry_name: &str) -> ImageEntry {
        ImageEntry {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            relative_path: entry_name.to_string(),
            width: 0,
            height: 0,
            file_size: 16,
            archive_entry: ArchiveEntryInfo {
                archive_path: "book.cbz".into(),
                entry_name: entry_name.to_string(),
                entry_path: entry_name.to_string(),
                file_type: EntryFileType::ArchiveEntry,
                compressed_size: 16,
                uncompressed_size: 16,
            },
        }
    }

    #[test]
    fn lists_image_entries_and_skips_macos_junk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbz");
        write_test_zip(
            &path,
            &[
                "chapter1/001.jpg",
                "chapter1/002.png",
                "__MACOSX/chapter1/._001.jpg",
                "notes.txt",
            ],
        );

        let entries = list_entries(&path).unwrap();
        let names: Vec<&str> =
            entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["chapter1/001.jpg", "chapter1/002.png"]);
    }

    #[test]
    fn rar_archives_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.rar");
        std::fs::write(&path, b"Rar!").unwrap();
        let err = list_entries(&path).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn repair_ladder_prefers_exact_then_relative_then_filename() {
        let entries = vec![
            ArchiveEntryMeta {
                name: "vol1/ch1/001.jpg".into(),
                compressed_size: 16,
                uncompressed_size: 16,
            },
            ArchiveEntryMeta {
                name: "vol1/ch2/002.jpg".into(),
                compressed_size: 16,
                uncompressed_size: 16,
            },
        ];

        // legacy record: entry_name holds just the filename
        let legacy = image_entry("002.jpg", "002.jpg");
        let resolved = resolve_entry(&entries, &legacy).unwrap();
        assert_eq!(resolved.name, "vol1/ch2/002.jpg");

        // exact entry name wins over filename fallback
        let exact = image_entry("001.jpg", "vol1/ch1/001.jpg");
        let resolved = resolve_entry(&entries, &exact).unwrap();
        assert_eq!(resolved.name, "vol1/ch1/001.jpg");
    }

    #[test]
    fn repair_updates_legacy_records() {
        let entries = vec![ArchiveEntryMeta {
            name: "pages/001.jpg".into(),
            compressed_size: 10,
            uncompressed_size: 20,
        }];
        let mut collection = Collection {
            id: CollectionId::generate(),
            library_id: None,
            name: "book".into(),
            description: None,
            path: "book.cbz".into(),
            collection_type: CollectionType::Archive,
            is_active: true,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            statistics: CollectionStatistics::default(),
            tags: vec![],
            images: vec![image_entry("001.jpg", "001.jpg")],
            thumbnails: vec![],
            cache_images: vec![],
        };

        assert_eq!(repair_entry_paths(&mut collection, &entries), 1);
        assert_eq!(
            collection.images[0].archive_entry.entry_name,
            "pages/001.jpg"
        );
        assert_eq!(collection.images[0].relative_path, "pages/001.jpg");
        // second run is a no-op
        assert_eq!(repair_entry_paths(&mut collection, &entries), 0);
    }

    #[test]
    fn apple_double_detection() {
        assert!(is_apple_double("__MACOSX/._001.jpg"));
        assert!(is_apple_double("._cover.png"));
        assert!(!is_apple_double("chapter/001.jpg"));
    }
}
