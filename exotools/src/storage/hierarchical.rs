//! Single-file hierarchical store.
//!
//! The whole store is one JSON document:
//!
//! ```text
//! {
//!   "<root_group>": {                 // optional nesting level
//!     "tables": { "<name>": { "header": {...}, "columns": [...] } },
//!     "json":   { "<name>": <document> }
//!   }
//! }
//! ```
//!
//! Several stores can share one file under different root groups. Every
//! write rewrites the file through a temporary file and a rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::Mutex;
use polars::prelude::{Column, NamedFrom};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::atomic::write_atomic;
use super::{
    dataset_not_found, document_exists, document_not_found, validate_name, StorageBackend,
};
use crate::error::{ErrorContext, ExoError, ExoResult};
use crate::table::{CatalogTable, DType, TableHeader};

pub const DEFAULT_FILE_NAME: &str = "exotools.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Group {
    #[serde(default)]
    tables: BTreeMap<String, StoredTable>,
    #[serde(default)]
    json: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredTable {
    header: TableHeader,
    columns: Vec<StoredColumn>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredColumn {
    name: String,
    #[serde(flatten)]
    values: StoredValues,
}

/// Cells of one column; `null` marks a missing value.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
enum StoredValues {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Utf8(Vec<Option<String>>),
}

impl StoredColumn {
    fn encode(table: &CatalogTable, column: &Column) -> ExoResult<Self> {
        let name = column.name().to_string();
        let series = column.as_materialized_series();
        let values = match table.dtype(&name) {
            Some(DType::Int64) => StoredValues::Int64(series.i64()?.into_iter().collect()),
            Some(DType::Float64) => StoredValues::Float64(series.f64()?.into_iter().collect()),
            Some(DType::Bool) => StoredValues::Bool(series.bool()?.into_iter().collect()),
            Some(DType::Utf8) => StoredValues::Utf8(
                series
                    .str()?
                    .into_iter()
                    .map(|v| v.map(str::to_string))
                    .collect(),
            ),
            None => {
                return Err(ExoError::internal(format!(
                    "column '{}' has no table dtype",
                    name
                )))
            }
        };
        Ok(Self { name, values })
    }

    fn decode(self) -> Column {
        let name = self.name.as_str().into();
        match self.values {
            StoredValues::Int64(v) => Column::new(name, v),
            StoredValues::Float64(v) => Column::new(name, v),
            StoredValues::Bool(v) => Column::new(name, v),
            StoredValues::Utf8(v) => Column::new(name, v),
        }
    }
}

#[derive(Debug)]
pub struct HierarchicalStorage {
    root: PathBuf,
    file_path: PathBuf,
    root_group: Option<String>,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl HierarchicalStorage {
    /// Store inside `root/file_name`, optionally nested under `root_group`.
    pub fn new(
        root: impl Into<PathBuf>,
        file_name: Option<&str>,
        root_group: Option<&str>,
    ) -> ExoResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let file_path = root.join(file_name.unwrap_or(DEFAULT_FILE_NAME));
        Ok(Self {
            root,
            file_path,
            root_group: root_group.map(str::to_string),
            write_lock: Mutex::new(()),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn read_document(&self) -> ExoResult<Value> {
        match fs::read(&self.file_path) {
            Ok(bytes) if bytes.is_empty() => Ok(Value::Object(Default::default())),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Value::Object(Default::default()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_group(&self) -> ExoResult<Group> {
        let mut document = self.read_document()?;
        self.take_group(&mut document)
    }

    /// Move this store's group out of the document.
    fn take_group(&self, document: &mut Value) -> ExoResult<Group> {
        let value = match &self.root_group {
            Some(group) => match document.get_mut(group) {
                Some(v) => v.take(),
                None => return Ok(Group::default()),
            },
            None => document.take(),
        };
        serde_json::from_value(value).map_err(|e| {
            ExoError::storage_with_context(
                format!("malformed store document: {}", e),
                ErrorContext::new("read").with_details(self.file_path.display().to_string()),
            )
        })
    }

    /// Apply `update` to the group and write the file back atomically.
    fn update_group<R>(&self, update: impl FnOnce(&mut Group) -> ExoResult<R>) -> ExoResult<R> {
        let _guard = self.write_lock.lock();
        let mut document = self.read_document()?;
        let mut group = self.take_group(&mut document)?;
        let result = update(&mut group)?;
        let group_value = serde_json::to_value(&group)?;
        match &self.root_group {
            Some(name) => {
                let object = document.as_object_mut().ok_or_else(|| {
                    ExoError::storage("store document root is not an object")
                })?;
                object.insert(name.clone(), group_value);
            }
            None => document = group_value,
        }
        let bytes = serde_json::to_vec(&document)?;
        write_atomic(&self.file_path, &bytes)?;
        Ok(result)
    }
}

impl StorageBackend for HierarchicalStorage {
    fn save(&self, name: &str, table: &CatalogTable) -> ExoResult<()> {
        validate_name(name)?;
        let stored = StoredTable {
            header: table.header().clone(),
            columns: table
                .columns()
                .iter()
                .map(|c| StoredColumn::encode(table, c))
                .collect::<ExoResult<Vec<_>>>()?,
        };
        self.update_group(|group| {
            group.tables.insert(name.to_string(), stored);
            Ok(())
        })?;
        debug!(
            "Saved dataset '{}' ({} rows) to {}",
            name,
            table.len(),
            self.file_path.display()
        );
        Ok(())
    }

    fn load(&self, name: &str) -> ExoResult<CatalogTable> {
        validate_name(name)?;
        let mut group = self.read_group()?;
        let stored = group
            .tables
            .remove(name)
            .ok_or_else(|| dataset_not_found(name))?;
        let columns = stored.columns.into_iter().map(StoredColumn::decode).collect();
        CatalogTable::new(columns)?.with_header(stored.header)
    }

    fn load_header(&self, name: &str) -> ExoResult<TableHeader> {
        validate_name(name)?;
        let mut group = self.read_group()?;
        group
            .tables
            .remove(name)
            .map(|t| t.header)
            .ok_or_else(|| dataset_not_found(name))
    }

    fn exists(&self, name: &str) -> ExoResult<bool> {
        validate_name(name)?;
        Ok(self.read_group()?.tables.contains_key(name))
    }

    fn delete(&self, name: &str) -> ExoResult<bool> {
        validate_name(name)?;
        if !self.exists(name)? {
            return Ok(false);
        }
        self.update_group(|group| Ok(group.tables.remove(name).is_some()))
    }

    fn list(&self) -> ExoResult<Vec<String>> {
        Ok(self.read_group()?.tables.into_keys().collect())
    }

    fn write_json(&self, name: &str, value: &Value, overwrite: bool) -> ExoResult<()> {
        validate_name(name)?;
        self.update_group(|group| {
            if !overwrite && group.json.contains_key(name) {
                return Err(document_exists(name));
            }
            group.json.insert(name.to_string(), value.clone());
            Ok(())
        })
    }

    fn read_json(&self, name: &str) -> ExoResult<Value> {
        validate_name(name)?;
        self.read_group()?
            .json
            .remove(name)
            .ok_or_else(|| document_not_found(name))
    }

    fn root_path(&self) -> Option<&Path> {
        Some(&self.root)
    }
}
