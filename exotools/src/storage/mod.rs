//! Persistence of catalog tables and small JSON documents.
//!
//! Every backend implements [`StorageBackend`] and is handed to the dataset
//! accessors as `Arc<dyn StorageBackend>`:
//!
//! - [`HierarchicalStorage`]: one JSON document file holding every table
//! - [`CsvStorage`] / [`ParquetStorage`]: one data file per table plus a
//!   JSON manifest
//! - [`MemoryStorage`]: process-local, for tests and throwaway sessions
//!
//! Use [`StorageFactory`] or [`StorageBuilder`] to pick one at runtime.

pub(crate) mod atomic;
pub mod checksum;
pub mod factory;
pub mod file;
pub mod hierarchical;
pub mod memory;


pub use factory::{StorageBuilder, StorageFactory, StorageType};
pub use file::{CsvCodec, CsvStorage, FileStorage, ParquetCodec, ParquetStorage, TableCodec};
pub use hierarchical::HierarchicalStorage;
pub use memory::MemoryStorage;

use std::fmt;
use std::path::Path;

use crate::error::{ErrorContext, ExoError, ExoResult};
use crate::table::{CatalogTable, TableHeader};

/// Storage contract shared by all backends.
///
/// Implementations must round-trip row order, values, nulls, dtypes and the
/// header. Writes replace the previous dataset of the same name atomically.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Persist a table and its header, replacing any dataset of that name.
    fn save(&self, name: &str, table: &CatalogTable) -> ExoResult<()>;

    /// Load a dataset. Fails with `NotFound` if it does not exist.
    fn load(&self, name: &str) -> ExoResult<CatalogTable>;

    /// Load only the header of a dataset.
    fn load_header(&self, name: &str) -> ExoResult<TableHeader>;

    fn exists(&self, name: &str) -> ExoResult<bool>;

    /// Remove a dataset. Returns whether anything was removed.
    fn delete(&self, name: &str) -> ExoResult<bool>;

    /// Names of all stored datasets, sorted.
    fn list(&self) -> ExoResult<Vec<String>>;

    /// Store a small JSON document. Without `overwrite`, an existing
    /// document of the same name is a validation error.
    fn write_json(&self, name: &str, value: &serde_json::Value, overwrite: bool) -> ExoResult<()>;

    fn read_json(&self, name: &str) -> ExoResult<serde_json::Value>;

    /// Filesystem root of the backend, if it has one.
    fn root_path(&self) -> Option<&Path>;
}

/// Dataset and document names become file names, so keep them plain.
pub(crate) fn validate_name(name: &str) -> ExoResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !name.ends_with(".header");
    if valid {
        Ok(())
    } else {
        Err(ExoError::validation_with_context(
            format!("invalid dataset name '{}'", name),
            ErrorContext::new("validate_name").with_entity("dataset").with_entity_id(name),
        ))
    }
}

pub(crate) fn dataset_not_found(name: &str) -> ExoError {
    ExoError::not_found_with_context(
        format!("dataset '{}' does not exist", name),
        ErrorContext::new("load").with_entity("dataset").with_entity_id(name),
    )
}

pub(crate) fn document_exists(name: &str) -> ExoError {
    ExoError::validation_with_context(
        format!("JSON document '{}' already exists", name),
        ErrorContext::new("write_json")
            .with_entity("document")
            .with_entity_id(name)
            .with_details("pass overwrite=true to replace it"),
    )
}

pub(crate) fn document_not_found(name: &str) -> ExoError {
    ExoError::not_found_with_context(
        format!("JSON document '{}' does not exist", name),
        ErrorContext::new("read_json").with_entity("document").with_entity_id(name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("ps").is_ok());
        assert!(validate_name("ps_reduced_v2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../ps").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("ps.header").is_err());
    }
}
