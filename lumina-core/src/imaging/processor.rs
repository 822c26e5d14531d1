use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::debug;

use crate::error::{CoreError, Result};

/// Output formats the processor can encode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
    Jpeg,
    Png,
    WebP,
    Bmp,
}

impl EncodeFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Bmp => "bmp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: EncodeFormat,
}

/// Decode/resize/encode pipeline. CPU-bound and synchronous: callers run it
/// on a worker that tolerates blocking for the duration of one image.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn dimensions(&self, data: &[u8]) -> Result<(u32, u32)> {
        let img = image::load_from_memory(data)?;
        Ok(img.dimensions())
    }

    /// Decode `data`, shrink it to fit within `max_width` × `max_height`
    /// preserving aspect ratio (never upscaling), and encode.
    pub fn process(
        &self,
        data: &[u8],
        max_width: u32,
        max_height: u32,
        format: EncodeFormat,
        quality: u8,
    ) -> Result<ProcessedImage> {
        if max_width == 0 || max_height == 0 {
            return Err(CoreError::Validation(
                "target dimensions must be positive".into(),
            ));
        }
        let img = image::load_from_memory(data)?;
        let (orig_w, orig_h) = img.dimensions();

        let img = if orig_w > max_width || orig_h > max_height {
            img.resize(max_width, max_height, FilterType::Lanczos3)
        } else {
            img
        };
        let (width, height) = img.dimensions();
        debug!(
            "Processed image {}x{} -> {}x{} ({:?})",
            orig_w, orig_h, width, height, format
        );

        let data = Self::encode(&img, format, quality)?;
        Ok(ProcessedImage {
            data,
            width,
            height,
            format,
        })
    }

    fn encode(
        img: &DynamicImage,
        format: EncodeFormat,
        quality: u8,
    ) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match format {
            EncodeFormat::Jpeg => {
                // JPEG has no alpha channel; flatten first.
                let rgb = img.to_rgb8();
                let encoder =
                    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
                rgb.write_with_encoder(encoder)?;
            }
            EncodeFormat::Png => {
                img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
            }
            EncodeFormat::WebP => {
                // The lossless WebP encoder accepts RGB8/RGBA8 only.
                let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
                rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)?;
            }
            EncodeFormat::Bmp => {
                img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Bmp)?;
            }
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn reads_dimensions() {
        let processor = ImageProcessor::new();
        let png = sample_png(64, 48);
        assert_eq!(processor.dimensions(&png).unwrap(), (64, 48));
    }

    #[test]
    fn downscales_preserving_aspect() {
        let processor = ImageProcessor::new();
        let png = sample_png(800, 400);
        let out = processor
            .process(&png, 300, 300, EncodeFormat::Jpeg, 85)
            .unwrap();
        assert_eq!(out.width, 300);
        assert_eq!(out.height, 150);
        assert!(!out.data.is_empty());
    }

    #[test]
    fn never_upscales() {
        let processor = ImageProcessor::new();
        let png = sample_png(100, 80);
        let out = processor
            .process(&png, 300, 300, EncodeFormat::Png, 85)
            .unwrap();
        assert_eq!((out.width, out.height), (100, 80));
    }

    #[test]
    fn rejects_garbage() {
        let processor = ImageProcessor::new();
        assert!(processor
            .process(b"not an image", 100, 100, EncodeFormat::Jpeg, 85)
            .is_err());
    }

    #[test]
    fn format_parsing() {
        assert_eq!(EncodeFormat::parse("JPG"), Some(EncodeFormat::Jpeg));
        assert_eq!(EncodeFormat::parse("webp"), Some(EncodeFormat::WebP));
        assert_eq!(EncodeFormat::parse("tiff"), None);
    }
}
