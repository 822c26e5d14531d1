use lumina_model::ThumbnailEmbedded;

/// Largest side a stored thumbnail may have and still be inlined as-is.
pub const MAX_INLINE_DIMENSION: u32 = 400;
/// Largest file size a stored thumbnail may have and still be inlined as-is.
pub const MAX_INLINE_BYTES: u64 = 500 * 1024;

/// Decides whether a stored thumbnail must be re-encoded before being
/// inlined into a summary payload.
///
/// Three layers, any of which forces a re-encode: the record points straight
/// at the original image (`is_direct`), either dimension exceeds 400 px, or
/// the file exceeds 500 KiB.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThumbnailPolicy;

impl ThumbnailPolicy {
    pub fn needs_reencode(
        &self,
        is_direct: bool,
        width: u32,
        height: u32,
        file_size: u64,
    ) -> bool {
        is_direct
            || width > MAX_INLINE_DIMENSION
            || height > MAX_INLINE_DIMENSION
            || file_size > MAX_INLINE_BYTES
    }

    pub fn needs_reencode_for(&self, thumbnail: &ThumbnailEmbedded) -> bool {
        self.needs_reencode(
            thumbnail.is_direct,
            thumbnail.width,
            thumbnail.height,
            thumbnail.file_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_dimensions() {
        let policy = ThumbnailPolicy;
        assert!(!policy.needs_reencode(false, 400, 400, 500 * 1024));
        assert!(policy.needs_reencode(false, 401, 400, 100));
        assert!(policy.needs_reencode(false, 400, 401, 100));
    }

    #[test]
    fn boundary_size() {
        let policy = ThumbnailPolicy;
        assert!(policy.needs_reencode(false, 100, 100, 501 * 1024));
        assert!(!policy.needs_reencode(false, 100, 100, 500 * 1024));
    }

    #[test]
    fn direct_always_reencodes() {
        let policy = ThumbnailPolicy;
        assert!(policy.needs_reencode(true, 10, 10, 10));
    }
}
