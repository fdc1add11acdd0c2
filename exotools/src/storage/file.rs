//! One-file-per-dataset stores with a JSON manifest.
//!
//! Layout under the root directory:
//!
//! ```text
//! <name>.header.json          manifest: format, data file, dtypes, header
//! <name>.<sha8>.<ext>         data file, named after its content
//! json/<name>.json            free-form JSON documents
//! ```
//!
//! `save` writes the data file first, then atomically replaces the manifest
//! (the commit point) and finally removes the previous data file. A reader
//! therefore always resolves the manifest to a complete data file.

use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use polars::prelude::{
    Column, CsvReadOptions, CsvWriter, DataType, IntoSeries, ParquetReader, ParquetWriter, Schema,
    SerReader, SerWriter, StringChunked,
};
use serde::{Deserialize, Serialize};

use super::atomic::{remove_if_exists, write_atomic};
use super::checksum::{calculate_checksum, short_checksum};
use super::{
    dataset_not_found, document_exists, document_not_found, validate_name, StorageBackend,
};
use crate::error::{ErrorContext, ExoError, ExoResult};
use crate::table::{CatalogTable, DType, TableHeader};

const MANIFEST_SUFFIX: &str = ".header.json";
const JSON_DIR: &str = "json";

/// Encoding of a table's data into one file.
pub trait TableCodec: Send + Sync + Default + fmt::Debug + 'static {
    /// Format tag recorded in the manifest.
    const FORMAT: &'static str;
    const EXTENSION: &'static str;

    fn encode(&self, table: &CatalogTable) -> ExoResult<Vec<u8>>;

    /// Decode a table with the manifest's columns, order and dtypes.
    fn decode(&self, bytes: &[u8], columns: &[ManifestColumn]) -> ExoResult<CatalogTable>;
}

/// Row-oriented CSV with a header line. Nulls are empty fields, so empty
/// strings are written (and read back) as nulls.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvCodec;

impl TableCodec for CsvCodec {
    const FORMAT: &'static str = "csv";
    const EXTENSION: &'static str = "csv";

    fn encode(&self, table: &CatalogTable) -> ExoResult<Vec<u8>> {
        let mut df = blank_strings_to_null(table)?;
        let mut buffer = Vec::new();
        CsvWriter::new(&mut buffer)
            .include_header(true)
            .finish(&mut df)?;
        Ok(buffer)
    }

    fn decode(&self, bytes: &[u8], columns: &[ManifestColumn]) -> ExoResult<CatalogTable> {
        if columns.is_empty() {
            return Ok(CatalogTable::empty());
        }
        let schema = schema_for(columns);
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_schema(Some(Arc::new(schema)))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()?;
        conform_columns(CatalogTable::from_frame(df)?, columns)
    }
}

/// Columnar Parquet.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParquetCodec;

impl TableCodec for ParquetCodec {
    const FORMAT: &'static str = "parquet";
    const EXTENSION: &'static str = "parquet";

    fn encode(&self, table: &CatalogTable) -> ExoResult<Vec<u8>> {
        let mut df = table.frame().clone();
        let mut buffer = Vec::new();
        ParquetWriter::new(&mut buffer).finish(&mut df)?;
        Ok(buffer)
    }

    fn decode(&self, bytes: &[u8], columns: &[ManifestColumn]) -> ExoResult<CatalogTable> {
        if columns.is_empty() {
            return Ok(CatalogTable::empty());
        }
        let df = ParquetReader::new(Cursor::new(bytes)).finish()?;
        conform_columns(CatalogTable::from_frame(df)?, columns)
    }
}

fn schema_for(columns: &[ManifestColumn]) -> Schema {
    let mut schema = Schema::default();
    for column in columns {
        schema.with_column(column.name.as_str().into(), column.dtype.to_polars());
    }
    schema
}

fn blank_strings_to_null(table: &CatalogTable) -> ExoResult<polars::prelude::DataFrame> {
    let mut df = table.frame().clone();
    let text_columns: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| c.dtype() == &DataType::String)
        .map(|c| c.name().to_string())
        .collect();
    for name in text_columns {
        let blanked: StringChunked = df
            .column(&name)?
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| v.filter(|s| !s.is_empty()))
            .collect();
        df.with_column(Column::from(blanked.with_name(name.as_str().into()).into_series()))?;
    }
    Ok(df)
}

/// Reorder decoded columns to the manifest and restore manifest dtypes.
fn conform_columns(decoded: CatalogTable, expected: &[ManifestColumn]) -> ExoResult<CatalogTable> {
    for spec in expected {
        if !decoded.has_column(&spec.name) {
            return Err(ExoError::schema_mismatch_with_context(
                format!("data file lacks column '{}'", spec.name),
                ErrorContext::new("load").with_entity("column").with_entity_id(&spec.name),
            ));
        }
    }
    let names: Vec<&str> = expected.iter().map(|c| c.name.as_str()).collect();
    let mut table = decoded.select(&names)?;
    for spec in expected {
        table.cast_column(&spec.name, spec.dtype)?;
    }
    Ok(table)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestColumn {
    pub name: String,
    pub dtype: DType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    format: String,
    data_file: String,
    checksum: String,
    rows: usize,
    columns: Vec<ManifestColumn>,
    header: TableHeader,
}

/// File store parameterized by its data codec.
pub struct FileStorage<C: TableCodec> {
    root: PathBuf,
    codec: C,
}

pub type CsvStorage = FileStorage<CsvCodec>;
pub type ParquetStorage = FileStorage<ParquetCodec>;

impl<C: TableCodec> fmt::Debug for FileStorage<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorage")
            .field("format", &C::FORMAT)
            .field("root", &self.root)
            .finish()
    }
}

impl<C: TableCodec> FileStorage<C> {
    pub fn new(root: impl Into<PathBuf>) -> ExoResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            codec: C::default(),
        })
    }

    fn manifest_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, MANIFEST_SUFFIX))
    }

    fn json_path(&self, name: &str) -> PathBuf {
        self.root.join(JSON_DIR).join(format!("{}.json", name))
    }

    fn read_manifest(&self, name: &str) -> ExoResult<Manifest> {
        let path = self.manifest_path(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(dataset_not_found(name))
            }
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&bytes)?;
        if manifest.format != C::FORMAT {
            return Err(ExoError::schema_mismatch_with_context(
                format!(
                    "dataset stored as {}, this store reads {}",
                    manifest.format,
                    C::FORMAT
                ),
                ErrorContext::new("load").with_entity("dataset").with_entity_id(name),
            ));
        }
        Ok(manifest)
    }
}

impl<C: TableCodec> StorageBackend for FileStorage<C> {
    fn save(&self, name: &str, table: &CatalogTable) -> ExoResult<()> {
        validate_name(name)?;
        let bytes = self.codec.encode(table)?;
        let data_file = format!("{}.{}.{}", name, short_checksum(&bytes), C::EXTENSION);
        write_atomic(&self.root.join(&data_file), &bytes)?;

        let previous = match self.read_manifest(name) {
            Ok(m) => Some(m.data_file),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!("Replacing unreadable manifest for '{}': {}", name, e);
                None
            }
        };

        let manifest = Manifest {
            format: C::FORMAT.to_string(),
            data_file: data_file.clone(),
            checksum: calculate_checksum(&bytes),
            rows: table.len(),
            columns: table
                .columns()
                .iter()
                .map(|c| {
                    let name = c.name().as_str();
                    table
                        .dtype(name)
                        .map(|dtype| ManifestColumn {
                            name: name.to_string(),
                            dtype,
                        })
                        .ok_or_else(|| {
                            ExoError::internal(format!("column '{}' has no table dtype", name))
                        })
                })
                .collect::<ExoResult<Vec<_>>>()?,
            header: table.header().clone(),
        };
        write_atomic(&self.manifest_path(name), &serde_json::to_vec_pretty(&manifest)?)?;

        if let Some(old) = previous.filter(|old| *old != data_file) {
            if let Err(e) = remove_if_exists(&self.root.join(&old)) {
                warn!("Could not remove stale data file {}: {}", old, e);
            }
        }
        debug!(
            "Saved dataset '{}' ({} rows) as {}",
            name,
            table.len(),
            data_file
        );
        Ok(())
    }

    fn load(&self, name: &str) -> ExoResult<CatalogTable> {
        validate_name(name)?;
        let manifest = self.read_manifest(name)?;
        let bytes = fs::read(self.root.join(&manifest.data_file)).map_err(|e| {
            ExoError::storage_with_context(
                format!("data file {} unreadable: {}", manifest.data_file, e),
                ErrorContext::new("load").with_entity("dataset").with_entity_id(name),
            )
        })?;
        if calculate_checksum(&bytes) != manifest.checksum {
            return Err(ExoError::storage_with_context(
                format!("data file {} does not match its checksum", manifest.data_file),
                ErrorContext::new("load").with_entity("dataset").with_entity_id(name),
            ));
        }
        let table = self.codec.decode(&bytes, &manifest.columns)?;
        if table.len() != manifest.rows && !manifest.columns.is_empty() {
            return Err(ExoError::storage(format!(
                "dataset '{}' has {} rows, manifest says {}",
                name,
                table.len(),
                manifest.rows
            )));
        }
        table.with_header(manifest.header)
    }

    fn load_header(&self, name: &str) -> ExoResult<TableHeader> {
        validate_name(name)?;
        Ok(self.read_manifest(name)?.header)
    }

    fn exists(&self, name: &str) -> ExoResult<bool> {
        validate_name(name)?;
        Ok(self.manifest_path(name).is_file())
    }

    fn delete(&self, name: &str) -> ExoResult<bool> {
        validate_name(name)?;
        let manifest = match self.read_manifest(name) {
            Ok(m) => m,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        remove_if_exists(&self.manifest_path(name))?;
        remove_if_exists(&self.root.join(&manifest.data_file))?;
        Ok(true)
    }

    fn list(&self) -> ExoResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(|f| f.strip_suffix(MANIFEST_SUFFIX)) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn write_json(&self, name: &str, value: &serde_json::Value, overwrite: bool) -> ExoResult<()> {
        validate_name(name)?;
        let path = self.json_path(name);
        if !overwrite && path.exists() {
            return Err(document_exists(name));
        }
        write_atomic(&path, &serde_json::to_vec_pretty(value)?)
    }

    fn read_json(&self, name: &str) -> ExoResult<serde_json::Value> {
        validate_name(name)?;
        match fs::read(self.json_path(name)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(document_not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    fn root_path(&self) -> Option<&Path> {
        Some(&self.root)
    }
}
