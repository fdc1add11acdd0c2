//! Schema registry: static column metadata for every known catalog.
//!
//! Each catalog is described by a JSON document mapping column names to
//! `{description, unit, dtype, time_info?}`. Documents for the public
//! archives are bundled with the crate; callers may register their own.
//! The registry is an immutable value, shared as `Arc<SchemaRegistry>`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorContext, ExoError, ExoResult};
use crate::table::{CatalogTable, ColumnInfo, DType, TableHeader};

/// Catalog names of the bundled documents.
pub const PS: &str = "ps";
pub const PS_COMPOSITE: &str = "ps_composite";
pub const TOI: &str = "toi";
pub const GAIA: &str = "gaia";
pub const TIC: &str = "tic";
pub const TESS_OBSERVATIONS: &str = "tess_observations";
pub const LIGHTCURVES: &str = "lightcurves";

const BUNDLED: &[(&str, &str)] = &[
    (PS, include_str!("../../schema/ps.json")),
    (PS_COMPOSITE, include_str!("../../schema/ps_composite.json")),
    (TOI, include_str!("../../schema/toi.json")),
    (GAIA, include_str!("../../schema/gaia.json")),
    (TIC, include_str!("../../schema/tic.json")),
    (TESS_OBSERVATIONS, include_str!("../../schema/tess_observations.json")),
    (LIGHTCURVES, include_str!("../../schema/lightcurves.json")),
];

/// Time representation of a time-valued column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInfo {
    /// e.g. `jd`, `mjd`
    pub format: String,
    /// e.g. `tdb`, `utc`
    pub scale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: Option<String>,
    pub dtype: DType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_info: Option<TimeInfo>,
}

impl ColumnSchema {
    pub fn to_column_info(&self) -> ColumnInfo {
        ColumnInfo {
            description: self.description.clone(),
            unit: self.unit.clone(),
            dtype: Some(self.dtype),
        }
    }
}

/// Column metadata of one catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSchema {
    name: String,
    columns: BTreeMap<String, ColumnSchema>,
}

impl CatalogSchema {
    pub fn new(name: impl Into<String>, columns: BTreeMap<String, ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Parse a registry document. Errors point at the offending JSON path.
    pub fn from_json_str(name: &str, document: &str) -> ExoResult<Self> {
        let mut de = serde_json::Deserializer::from_str(document);
        let columns: BTreeMap<String, ColumnSchema> = serde_path_to_error::deserialize(&mut de)
            .map_err(|e| {
                ExoError::configuration(format!("invalid schema document: {}", e))
                    .with_entity("catalog", name)
            })?;
        Ok(Self::new(name, columns))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns carrying a time representation.
    pub fn time_columns(&self) -> impl Iterator<Item = (&str, &TimeInfo)> {
        self.columns
            .iter()
            .filter_map(|(name, c)| c.time_info.as_ref().map(|t| (name.as_str(), t)))
    }

    /// Header for the columns of `table`. Columns the registry does not
    /// know keep their table dtype and get a placeholder description.
    pub fn header_for(&self, table: &CatalogTable) -> TableHeader {
        table
            .column_names()
            .into_iter()
            .map(|name| {
                let info = match self.columns.get(name) {
                    Some(schema) => schema.to_column_info(),
                    None => {
                        debug!("Column '{}' not described by catalog '{}'", name, self.name);
                        ColumnInfo::undescribed(table.dtype(name).unwrap_or(DType::Float64))
                    }
                };
                (name.to_string(), info)
            })
            .collect()
    }

    /// Cast known columns to their registered dtype and attach the header.
    pub fn normalize(&self, mut table: CatalogTable) -> ExoResult<CatalogTable> {
        let casts: Vec<(String, DType)> = table
            .column_names()
            .into_iter()
            .filter_map(|name| {
                let expected = self.columns.get(name)?.dtype;
                (Some(expected) != table.dtype(name)).then(|| (name.to_string(), expected))
            })
            .collect();
        for (name, dtype) in casts {
            table.cast_column(&name, dtype).map_err(|e| match e {
                ExoError::Validation { message, .. } => ExoError::schema_mismatch_with_context(
                    message,
                    ErrorContext::new("normalize")
                        .with_entity("column")
                        .with_entity_id(&name),
                ),
                other => other,
            })?;
        }
        let header = self.header_for(&table);
        table.with_header(header)
    }

    /// Check that every registered column of `table` has the registered
    /// dtype and unit.
    pub fn validate(&self, table: &CatalogTable) -> ExoResult<()> {
        for name in table.column_names() {
            let Some(expected) = self.columns.get(name) else {
                continue;
            };
            let context = || {
                ErrorContext::new("validate")
                    .with_entity(self.name.clone())
                    .with_entity_id(name)
            };
            let actual = table.dtype(name);
            if actual != Some(expected.dtype) {
                return Err(ExoError::schema_mismatch_with_context(
                    format!(
                        "column '{}' is {}, registry says {}",
                        name,
                        actual.map_or("untyped", |d| d.as_str()),
                        expected.dtype
                    ),
                    context(),
                ));
            }
            let unit = table.unit(name);
            if table.column_info(name).is_some() && unit != expected.unit.as_deref() {
                return Err(ExoError::schema_mismatch_with_context(
                    format!(
                        "column '{}' has unit {:?}, registry says {:?}",
                        name, unit, expected.unit
                    ),
                    context(),
                ));
            }
        }
        Ok(())
    }
}

/// All known catalogs.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    catalogs: HashMap<String, CatalogSchema>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the documents shipped with the crate.
    pub fn bundled() -> ExoResult<Self> {
        let mut registry = Self::empty();
        for (name, document) in BUNDLED {
            registry.register(CatalogSchema::from_json_str(name, document)?);
        }
        Ok(registry)
    }

    /// Add or replace a catalog.
    pub fn register(&mut self, schema: CatalogSchema) {
        self.catalogs.insert(schema.name.clone(), schema);
    }

    /// Register a catalog from a JSON document on disk.
    pub fn register_file(&mut self, name: &str, path: impl AsRef<Path>) -> ExoResult<()> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| {
            ExoError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        self.register(CatalogSchema::from_json_str(name, &document)?);
        Ok(())
    }

    pub fn catalog(&self, name: &str) -> ExoResult<&CatalogSchema> {
        self.catalogs.get(name).ok_or_else(|| {
            ExoError::not_found_with_context(
                format!("catalog '{}' is not registered", name),
                ErrorContext::new("schema_lookup").with_entity("catalog").with_entity_id(name),
            )
        })
    }

    pub fn column(&self, catalog: &str, column: &str) -> Option<&ColumnSchema> {
        self.catalogs.get(catalog)?.column(column)
    }

    pub fn catalog_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.catalogs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
