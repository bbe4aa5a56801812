use std::collections::HashSet;
use std::path::Path;

use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;

use crate::record::ConfigSignature;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding run records, verification reports and the digest
    /// cache. Relative paths are resolved against the working directory.
    pub state_dir: String,
    pub verify: VerifyConfig,
    pub cleanup: CleanupConfig,
    pub mapping: MappingConfig,
    pub scan: ScanConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_dir: ".snapvault".to_string(),
            verify: VerifyConfig::default(),
            cleanup: CleanupConfig::default(),
            mapping: MappingConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// "sha256" or "quick". Quick compares sizes only and is never proof of
    /// content equality.
    pub algorithm: String,
    /// Fallback destination search by content hash during reconstruction.
    pub content_search_on_reconstruct: bool,
    /// Allow cleanup of entries verified with the quick algorithm.
    pub allow_cleanup_on_quick: bool,
    pub enable_digest_cache: bool,
    pub digest_cache_file: String,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            algorithm: "sha256".to_string(),
            content_search_on_reconstruct: false,
            allow_cleanup_on_quick: false,
            enable_digest_cache: false,
            digest_cache_file: "digest_cache.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub dry_run_default: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            dry_run_default: true,
        }
    }
}

/// The subset of organizing-run settings that determine where a file lands.
/// Must match the settings the apply run used or reconstruction is undefined.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// "YYYY", "YYYY/MM" or "YYYY/MM/DD".
    pub folder_structure: String,
    pub renaming_enabled: bool,
    pub renaming_pattern: String,
    pub date_format: String,
    pub time_format: String,
    pub folder_tags_enabled: bool,
    pub on_collision: String,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            folder_structure: "YYYY/MM".to_string(),
            renaming_enabled: false,
            renaming_pattern: "{date}_{time}".to_string(),
            date_format: "%Y%m%d".to_string(),
            time_format: "%H%M%S".to_string(),
            folder_tags_enabled: false,
            on_collision: "check_hash".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub raw_extensions: Vec<String>,
    pub ignore_hidden_files: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            image_extensions: vec![
                ".jpg", ".jpeg", ".png", ".tiff", ".tif", ".heic", ".heif", ".webp", ".bmp",
                ".gif",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            video_extensions: vec![".mp4", ".mov", ".avi", ".mkv", ".m4v", ".3gp", ".wmv", ".webm"]
                .into_iter()
                .map(String::from)
                .collect(),
            raw_extensions: vec![".cr2", ".nef", ".arw", ".dng", ".orf", ".rw2"]
                .into_iter()
                .map(String::from)
                .collect(),
            ignore_hidden_files: true,
        }
    }
}

impl AppConfig {
    /// All media extensions, lowercased, with leading dot.
    pub fn all_extensions(&self) -> HashSet<String> {
        self.scan
            .image_extensions
            .iter()
            .chain(self.scan.video_extensions.iter())
            .chain(self.scan.raw_extensions.iter())
            .map(|e| e.to_lowercase())
            .collect()
    }

    /// The mapping settings frozen into run records for drift detection.
    pub fn config_signature(&self) -> ConfigSignature {
        ConfigSignature {
            folder_structure: self.mapping.folder_structure.clone(),
            renaming_enabled: self.mapping.renaming_enabled,
            renaming_pattern: self.mapping.renaming_pattern.clone(),
            folder_tags_enabled: self.mapping.folder_tags_enabled,
            on_collision: self.mapping.on_collision.clone(),
        }
    }
}

pub fn load_configuration(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let builder = match path {
        Some(p) => Config::builder().add_source(ConfigFile::from(p)),
        None => Config::builder().add_source(ConfigFile::with_name("snapvault").required(false)),
    };
    builder.build()?.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.state_dir, ".snapvault");
        assert_eq!(cfg.verify.algorithm, "sha256");
        assert!(!cfg.verify.content_search_on_reconstruct);
        assert!(cfg.cleanup.dry_run_default);
        assert_eq!(cfg.mapping.folder_structure, "YYYY/MM");
    }

    #[test]
    fn test_all_extensions_lowercased() {
        let mut cfg = AppConfig::default();
        cfg.scan.image_extensions.push(".JPG".to_string());
        let exts = cfg.all_extensions();
        assert!(exts.contains(".jpg"));
        assert!(exts.contains(".mp4"));
        assert!(!exts.contains(".JPG"));
    }

    #[test]
    fn test_signature_reflects_mapping_settings() {
        let mut cfg = AppConfig::default();
        let sig_a = cfg.config_signature();
        cfg.mapping.folder_structure = "YYYY/MM/DD".to_string();
        let sig_b = cfg.config_signature();
        assert_ne!(sig_a.fingerprint(), sig_b.fingerprint());
    }
}
