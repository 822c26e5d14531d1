use base64::prelude::{Engine as _, BASE64_STANDARD};

/// MIME type for a stored thumbnail format. Unknown formats fall back to
/// JPEG, the catalogue's dominant format.
pub fn mime_for_format(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Encode raw image bytes as a `data:` URL for inlining into summaries.
pub fn to_data_url(format: &str, data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_for_format(format),
        BASE64_STANDARD.encode(data)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_mapping() {
        assert_eq!(mime_for_format("jpg"), "image/jpeg");
        assert_eq!(mime_for_format("JPEG"), "image/jpeg");
        assert_eq!(mime_for_format("png"), "image/png");
        assert_eq!(mime_for_format("webp"), "image/webp");
        assert_eq!(mime_for_format("gif"), "image/gif");
        assert_eq!(mime_for_format("bmp"), "image/bmp");
        assert_eq!(mime_for_format("tga"), "image/jpeg");
    }

    #[test]
    fn data_url_shape() {
        let url = to_data_url("png", b"abc");
        assert_eq!(url, "data:image/png;base64,YWJj");
    }
}
