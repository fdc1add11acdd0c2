//! In-memory storage.
//!
//! Data lives in a shared map for the lifetime of the process. Cloned
//! handles see the same data, which makes this backend convenient for tests
//! and short interactive sessions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::{
    dataset_not_found, document_exists, document_not_found, validate_name, StorageBackend,
};
use crate::error::ExoResult;
use crate::table::{CatalogTable, TableHeader};

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<MemoryData>>,
}

#[derive(Debug, Default)]
struct MemoryData {
    tables: HashMap<String, CatalogTable>,
    json: HashMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored datasets.
    pub fn len(&self) -> usize {
        self.data.read().tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every dataset and document.
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.tables.clear();
        data.json.clear();
    }
}

impl StorageBackend for MemoryStorage {
    fn save(&self, name: &str, table: &CatalogTable) -> ExoResult<()> {
        validate_name(name)?;
        self.data
            .write()
            .tables
            .insert(name.to_string(), table.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> ExoResult<CatalogTable> {
        validate_name(name)?;
        self.data
            .read()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| dataset_not_found(name))
    }

    fn load_header(&self, name: &str) -> ExoResult<TableHeader> {
        validate_name(name)?;
        self.data
            .read()
            .tables
            .get(name)
            .map(|t| t.header().clone())
            .ok_or_else(|| dataset_not_found(name))
    }

    fn exists(&self, name: &str) -> ExoResult<bool> {
        validate_name(name)?;
        Ok(self.data.read().tables.contains_key(name))
    }

    fn delete(&self, name: &str) -> ExoResult<bool> {
        validate_name(name)?;
        Ok(self.data.write().tables.remove(name).is_some())
    }

    fn list(&self) -> ExoResult<Vec<String>> {
        let mut names: Vec<String> = self.data.read().tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn write_json(&self, name: &str, value: &Value, overwrite: bool) -> ExoResult<()> {
        validate_name(name)?;
        let mut data = self.data.write();
        if !overwrite && data.json.contains_key(name) {
            return Err(document_exists(name));
        }
        data.json.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn read_json(&self, name: &str) -> ExoResult<Value> {
        validate_name(name)?;
        self.data
            .read()
            .json
            .get(name)
            .cloned()
            .ok_or_else(|| document_not_found(name))
    }

    fn root_path(&self) -> Option<&Path> {
        None
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::{Column, NamedFrom};

    use super::*;

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStorage::new();
        let other = store.clone();
        let table = CatalogTable::new(vec![Column::new("a".into(), &[1i64])]).unwrap();
        store.save("t", &table).unwrap();
        assert_eq!(other.load("t").unwrap(), table);
        other.clear();
        assert!(store.is_empty());
    }
}
