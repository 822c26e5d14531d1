//! Image decoding, resizing, and encoding, plus the inline-thumbnail policy.

pub mod data_url;
pub mod policy;
pub mod processor;
pub mod video;

use std::path::Path;

pub use data_url::{mime_for_format, to_data_url};
pub use policy::ThumbnailPolicy;
pub use processor::{EncodeFormat, ImageProcessor, ProcessedImage};

/// Extensions treated as images during scans.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "avif",
];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
