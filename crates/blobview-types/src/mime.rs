//! MIME type constants and helpers for compressed content.

pub const MIME_OCTET: &str = "application/octet-stream";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_JSON: &str = "application/json";
pub const MIME_YAML: &str = "application/x-yaml";
pub const MIME_TAR: &str = "application/x-tar";
pub const MIME_ZSTD: &str = "application/zstd";

/// Structured-syntax suffix marking zstd-compressed content.
pub const ZSTD_SUFFIX: &str = "+zstd";

/// Returns `true` if the MIME type denotes zstd-compressed content.
pub fn is_zstd(mime: &str) -> bool {
    mime == MIME_ZSTD || mime.ends_with(ZSTD_SUFFIX)
}

/// MIME type of the zstd-compressed form of `mime`.
pub fn compressed(mime: &str) -> String {
    if is_zstd(mime) {
        mime.to_string()
    } else if mime.is_empty() {
        MIME_ZSTD.to_string()
    } else {
        format!("{mime}{ZSTD_SUFFIX}")
    }
}

/// MIME type of the decompressed form of `mime`.
pub fn decompressed(mime: &str) -> String {
    if mime == MIME_ZSTD {
        MIME_OCTET.to_string()
    } else if let Some(base) = mime.strip_suffix(ZSTD_SUFFIX) {
        base.to_string()
    } else {
        mime.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_roundtrip() {
        assert_eq!(compressed(MIME_TAR), "application/x-tar+zstd");
        assert_eq!(decompressed("application/x-tar+zstd"), MIME_TAR);
    }

    #[test]
    fn already_compressed_is_kept() {
        assert_eq!(compressed("application/x-tar+zstd"), "application/x-tar+zstd");
        assert_eq!(compressed(MIME_ZSTD), MIME_ZSTD);
        assert_eq!(compressed(""), MIME_ZSTD);
    }

    #[test]
    fn plain_zstd_decompresses_to_octet() {
        assert_eq!(decompressed(MIME_ZSTD), MIME_OCTET);
        assert_eq!(decompressed(MIME_TEXT), MIME_TEXT);
    }

    #[test]
    fn detection() {
        assert!(is_zstd(MIME_ZSTD));
        assert!(is_zstd("text/plain+zstd"));
        assert!(!is_zstd(MIME_TEXT));
    }
}
