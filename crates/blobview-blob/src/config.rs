use std::path::PathBuf;

use blobview_types::DigestAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::{BlobError, BlobResult};

/// Tuning knobs for blob transforms, temporary files, and caches.
///
/// Every field has a default, so a TOML document only needs to name the
/// values it changes:
///
/// ```toml
/// compression_level = 9
/// temp_dir = "/var/tmp/blobs"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// zstd level used by compression wrappers.
    pub compression_level: i32,
    /// Number of chunks buffered between a transform thread and its reader.
    pub pipe_capacity: usize,
    /// Bytes moved per step by a transform thread.
    pub chunk_size: usize,
    /// Directory for temporary files and caches (system default when unset).
    pub temp_dir: Option<PathBuf>,
    /// Algorithm used to key cached blobs.
    pub cache_digest: DigestAlgorithm,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            compression_level: 3,
            pipe_capacity: 16,
            chunk_size: 64 * 1024, // 64 KiB
            temp_dir: None,
            cache_digest: DigestAlgorithm::CANONICAL,
        }
    }
}

impl BlobConfig {
    /// Parse and validate a TOML configuration document.
    pub fn from_toml_str(s: &str) -> BlobResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| BlobError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BlobResult<()> {
        if !zstd::compression_level_range().contains(&self.compression_level) {
            return Err(BlobError::Config(format!(
                "compression level {} outside {:?}",
                self.compression_level,
                zstd::compression_level_range()
            )));
        }
        if self.pipe_capacity == 0 {
            return Err(BlobError::Config("pipe capacity must be positive".into()));
        }
        if self.chunk_size == 0 {
            return Err(BlobError::Config("chunk size must be positive".into()));
        }
        Ok(())
    }

    /// Effective directory for temporary files.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = BlobConfig::default();
        assert_eq!(c.compression_level, 3);
        assert_eq!(c.pipe_capacity, 16);
        assert_eq!(c.chunk_size, 64 * 1024);
        assert!(c.temp_dir.is_none());
        assert_eq!(c.cache_digest, DigestAlgorithm::Sha256);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = BlobConfig::from_toml_str(
            r#"
            compression_level = 9
            temp_dir = "/var/tmp/blobs"
            cache_digest = "blake3"
            "#,
        )
        .unwrap();
        assert_eq!(c.compression_level, 9);
        assert_eq!(c.temp_dir(), PathBuf::from("/var/tmp/blobs"));
        assert_eq!(c.cache_digest, DigestAlgorithm::Blake3);
        assert_eq!(c.pipe_capacity, 16);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(BlobConfig::from_toml_str("").unwrap(), BlobConfig::default());
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            BlobConfig::from_toml_str("pipe_capacity = 0"),
            Err(BlobError::Config(_))
        ));
        assert!(matches!(
            BlobConfig::from_toml_str("compression_level = 1000"),
            Err(BlobError::Config(_))
        ));
        assert!(matches!(
            BlobConfig::from_toml_str("chunk_size = \"big\""),
            Err(BlobError::Config(_))
        ));
    }

    #[test]
    fn temp_dir_defaults_to_system() {
        assert_eq!(BlobConfig::default().temp_dir(), std::env::temp_dir());
    }
}
