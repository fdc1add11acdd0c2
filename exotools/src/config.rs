//! Configuration file support.
//!
//! Settings are read from `exotools.toml`:
//!
//! ```toml
//! [storage]
//! type = "parquet"          # hierarchical | csv | parquet | memory
//! root = "./exotools_data"
//! file_name = "exotools.json"   # hierarchical only
//! root_group = "main"           # hierarchical only
//!
//! [download]
//! workers = 8
//! override_existing = false
//! timeout_secs = 300
//!
//! [services]
//! exoplanet_archive_url = "https://exoplanetarchive.ipac.caltech.edu/TAP"
//! ```
//!
//! `EXOTOOLS_STORAGE_TYPE` and `EXOTOOLS_STORAGE_ROOT` override the storage
//! section.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ExoError, ExoResult};
use crate::storage::StorageType;

pub const STORAGE_TYPE_ENV: &str = "EXOTOOLS_STORAGE_TYPE";
pub const STORAGE_ROOT_ENV: &str = "EXOTOOLS_STORAGE_ROOT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExotoolsConfig {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub services: ServiceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(rename = "type", default = "default_storage_type")]
    pub storage_type: String,
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub root_group: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            storage_type: default_storage_type(),
            root: default_root(),
            file_name: None,
            root_group: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub override_existing: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_gaia_chunk_size")]
    pub gaia_chunk_size: usize,
    #[serde(default = "default_tic_chunk_size")]
    pub tic_chunk_size: usize,
    #[serde(default = "default_observations_chunk_size")]
    pub observations_chunk_size: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            override_existing: false,
            timeout_secs: default_timeout_secs(),
            gaia_chunk_size: default_gaia_chunk_size(),
            tic_chunk_size: default_tic_chunk_size(),
            observations_chunk_size: default_observations_chunk_size(),
        }
    }
}

impl DownloadSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// TAP endpoints of the public archives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_exoplanet_archive_url")]
    pub exoplanet_archive_url: String,
    #[serde(default = "default_gaia_url")]
    pub gaia_url: String,
    #[serde(default = "default_tic_url")]
    pub tic_url: String,
    #[serde(default = "default_caom_url")]
    pub caom_url: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            exoplanet_archive_url: default_exoplanet_archive_url(),
            gaia_url: default_gaia_url(),
            tic_url: default_tic_url(),
            caom_url: default_caom_url(),
        }
    }
}

fn default_storage_type() -> String {
    "parquet".to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from("exotools_data")
}

fn default_workers() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_gaia_chunk_size() -> usize {
    1000
}

fn default_tic_chunk_size() -> usize {
    400
}

fn default_observations_chunk_size() -> usize {
    2000
}

fn default_exoplanet_archive_url() -> String {
    "https://exoplanetarchive.ipac.caltech.edu/TAP".to_string()
}

fn default_gaia_url() -> String {
    "https://gea.esac.esa.int/tap-server/tap".to_string()
}

fn default_tic_url() -> String {
    "https://mast.stsci.edu/vo-tap/api/v0.1/tic".to_string()
}

fn default_caom_url() -> String {
    "https://mast.stsci.edu/vo-tap/api/v0.1/caom".to_string()
}

impl ExotoolsConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ExoResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ExoError::configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ExoResult<Self> {
        let config: ExotoolsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `exotools.toml` in:
    /// 1. Current directory
    /// 2. `config/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> ExoResult<Self> {
        let search_paths = [
            PathBuf::from("exotools.toml"),
            PathBuf::from("config/exotools.toml"),
            PathBuf::from("../exotools.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(ExoError::configuration(
            "No exotools.toml found in standard locations",
        ))
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> ExoResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Replace storage settings with `EXOTOOLS_STORAGE_*` variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(STORAGE_TYPE_ENV) {
            self.storage.storage_type = value;
        }
        if let Ok(value) = std::env::var(STORAGE_ROOT_ENV) {
            self.storage.root = PathBuf::from(value);
        }
    }

    /// Get the storage type from configuration.
    pub fn storage_type(&self) -> ExoResult<StorageType> {
        StorageType::from_str(&self.storage.storage_type).map_err(ExoError::configuration)
    }

    fn validate(&self) -> ExoResult<()> {
        self.storage_type()?;
        if self.download.workers == 0 {
            return Err(ExoError::configuration("download.workers must be at least 1"));
        }
        let chunks = [
            self.download.gaia_chunk_size,
            self.download.tic_chunk_size,
            self.download.observations_chunk_size,
        ];
        if chunks.contains(&0) {
            return Err(ExoError::configuration("chunk sizes must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[storage]
type = "csv"
root = "/tmp/exo"
"#;

        let config = ExotoolsConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.storage_type().unwrap(), StorageType::Csv);
        assert_eq!(config.storage.root, PathBuf::from("/tmp/exo"));
        assert_eq!(config.download.workers, 8);
        assert_eq!(config.download.gaia_chunk_size, 1000);
        assert!(config.services.gaia_url.starts_with("https://"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[storage]
type = "hdf5"
root = "data"
file_name = "catalogs.json"
root_group = "v2"

[download]
workers = 3
override_existing = true
timeout_secs = 10
tic_chunk_size = 100

[services]
exoplanet_archive_url = "http://localhost:8080/TAP"
"#;

        let config = ExotoolsConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.storage_type().unwrap(), StorageType::Hierarchical);
        assert_eq!(config.storage.root_group.as_deref(), Some("v2"));
        assert_eq!(config.download.workers, 3);
        assert!(config.download.override_existing);
        assert_eq!(config.download.tic_chunk_size, 100);
        assert_eq!(config.services.exoplanet_archive_url, "http://localhost:8080/TAP");
        assert_eq!(config.services.tic_url, default_tic_url());
    }

    #[test]
    fn test_invalid_type_is_rejected() {
        let err = ExotoolsConfig::from_toml_str("[storage]\ntype = \"sqlite\"\n").unwrap_err();
        assert!(matches!(err, ExoError::Configuration { .. }));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        assert!(ExotoolsConfig::from_toml_str("[download]\nworkers = 0\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = ExotoolsConfig::from_file("/nonexistent/exotools.toml").unwrap_err();
        assert!(matches!(err, ExoError::Configuration { .. }));
    }
}
