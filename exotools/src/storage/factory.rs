//! Storage factory for dependency injection.
//!
//! Creates `Arc<dyn StorageBackend>` instances from a [`StorageType`] and a
//! root path, from environment variables or from `exotools.toml`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use log::info;

use super::{CsvStorage, HierarchicalStorage, MemoryStorage, ParquetStorage, StorageBackend};
use crate::config::{ExotoolsConfig, StorageSettings, STORAGE_TYPE_ENV};
use crate::error::{ExoError, ExoResult};

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// Single JSON document file with groups
    Hierarchical,
    /// One CSV file per dataset
    Csv,
    /// One Parquet file per dataset
    Parquet,
    /// Process-local
    Memory,
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hierarchical" | "hdf5" | "h5" => Ok(Self::Hierarchical),
            "csv" | "ecsv" => Ok(Self::Csv),
            "parquet" | "feather" | "columnar" => Ok(Self::Parquet),
            "memory" | "mem" | "local" => Ok(Self::Memory),
            _ => Err(format!("Unknown storage type: {}", s)),
        }
    }
}

impl StorageType {
    /// Read `EXOTOOLS_STORAGE_TYPE`, defaulting to Parquet when unset or
    /// unparseable.
    pub fn from_env() -> Self {
        std::env::var(STORAGE_TYPE_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::Parquet)
    }
}

pub struct StorageFactory;

impl StorageFactory {
    /// Create a backend of the given type rooted at `root`.
    pub fn create(storage_type: StorageType, root: &Path) -> ExoResult<Arc<dyn StorageBackend>> {
        Self::create_with(storage_type, root, None, None)
    }

    fn create_with(
        storage_type: StorageType,
        root: &Path,
        file_name: Option<&str>,
        root_group: Option<&str>,
    ) -> ExoResult<Arc<dyn StorageBackend>> {
        let storage: Arc<dyn StorageBackend> = match storage_type {
            StorageType::Hierarchical => {
                Arc::new(HierarchicalStorage::new(root, file_name, root_group)?)
            }
            StorageType::Csv => Arc::new(CsvStorage::new(root)?),
            StorageType::Parquet => Arc::new(ParquetStorage::new(root)?),
            StorageType::Memory => Self::create_memory(),
        };
        info!("Using {:?} storage at {}", storage_type, root.display());
        Ok(storage)
    }

    pub fn create_memory() -> Arc<dyn StorageBackend> {
        Arc::new(MemoryStorage::new())
    }

    /// Create a backend from `EXOTOOLS_STORAGE_TYPE` / `EXOTOOLS_STORAGE_ROOT`.
    pub fn from_env() -> ExoResult<Arc<dyn StorageBackend>> {
        let config = ExotoolsConfig::from_env()?;
        Self::from_settings(&config.storage)
    }

    pub fn from_config_file<P: AsRef<Path>>(config_path: P) -> ExoResult<Arc<dyn StorageBackend>> {
        let config = ExotoolsConfig::from_file(config_path)?;
        Self::from_settings(&config.storage)
    }

    /// Searches for `exotools.toml` in standard locations.
    pub fn from_default_config() -> ExoResult<Arc<dyn StorageBackend>> {
        let config = ExotoolsConfig::from_default_location()?;
        Self::from_settings(&config.storage)
    }

    pub fn from_config(config: &ExotoolsConfig) -> ExoResult<Arc<dyn StorageBackend>> {
        Self::from_settings(&config.storage)
    }

    fn from_settings(settings: &StorageSettings) -> ExoResult<Arc<dyn StorageBackend>> {
        let storage_type = StorageType::from_str(&settings.storage_type)
            .map_err(ExoError::configuration)?;
        Self::create_with(
            storage_type,
            &settings.root,
            settings.file_name.as_deref(),
            settings.root_group.as_deref(),
        )
    }
}

/// Fluent configuration of a storage backend.
#[derive(Debug, Clone)]
pub struct StorageBuilder {
    storage_type: StorageType,
    root: PathBuf,
    file_name: Option<String>,
    root_group: Option<String>,
}

impl StorageBuilder {
    /// Defaults to the environment's storage type under `./exotools_data`.
    pub fn new() -> Self {
        let settings = StorageSettings::default();
        Self {
            storage_type: StorageType::from_env(),
            root: settings.root,
            file_name: None,
            root_group: None,
        }
    }

    pub fn storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// File name of the hierarchical store.
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Group of the hierarchical store.
    pub fn root_group(mut self, group: impl Into<String>) -> Self {
        self.root_group = Some(group.into());
        self
    }

    /// Take every setting from a configuration.
    pub fn from_config(mut self, config: &ExotoolsConfig) -> ExoResult<Self> {
        self.storage_type = config.storage_type()?;
        self.root = config.storage.root.clone();
        self.file_name = config.storage.file_name.clone();
        self.root_group = config.storage.root_group.clone();
        Ok(self)
    }

    pub fn build(self) -> ExoResult<Arc<dyn StorageBackend>> {
        StorageFactory::create_with(
            self.storage_type,
            &self.root,
            self.file_name.as_deref(),
            self.root_group.as_deref(),
        )
    }
}

impl Default for StorageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_from_str() {
        assert_eq!(StorageType::from_str("hdf5").unwrap(), StorageType::Hierarchical);
        assert_eq!(StorageType::from_str("ECSV").unwrap(), StorageType::Csv);
        assert_eq!(StorageType::from_str("feather").unwrap(), StorageType::Parquet);
        assert_eq!(StorageType::from_str("columnar").unwrap(), StorageType::Parquet);
        assert_eq!(StorageType::from_str("mem").unwrap(), StorageType::Memory);
        assert!(StorageType::from_str("sqlite").is_err());
    }

    #[test]
    fn test_builder_creates_each_backend() {
        let dir = tempfile::tempdir().unwrap();
        for storage_type in [
            StorageType::Hierarchical,
            StorageType::Csv,
            StorageType::Parquet,
            StorageType::Memory,
        ] {
            let storage = StorageBuilder::new()
                .storage_type(storage_type)
                .root(dir.path().join(format!("{:?}", storage_type)))
                .build()
                .unwrap();
            assert!(storage.list().unwrap().is_empty());
            assert_eq!(storage.root_path().is_some(), storage_type != StorageType::Memory);
        }
    }

    #[test]
    fn test_factory_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[storage]\ntype = \"hierarchical\"\nroot = \"{}\"\nroot_group = \"g\"\n",
            dir.path().display()
        );
        let config = ExotoolsConfig::from_toml_str(&toml).unwrap();
        let storage = StorageFactory::from_config(&config).unwrap();
        assert_eq!(storage.root_path(), Some(dir.path()));
    }
}
