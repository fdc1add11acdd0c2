//! Dataset accessors: download, normalize, persist and load each catalog.
//!
//! Every accessor takes its collaborators by injection: a storage backend,
//! the schema registry and the remote service it needs. Stored dataset
//! names follow `<base>[_<tag>][_<with_name>]`.

pub mod candidates;
pub mod catalog;
pub mod gaia;
pub mod known_exoplanets;
pub mod lightcurves;
pub mod observations;
pub mod planetary_composite;
pub mod reducer;
pub mod tic;

pub use candidates::CandidateExoplanetsDataset;
pub use catalog::{
    CandidateCatalog, CatalogView, ExoplanetCatalog, GaiaCatalog, LightcurveCatalog,
    ObservationCatalog, TicCatalog,
};
pub use gaia::GaiaParametersDataset;
pub use known_exoplanets::{DownloadOptions, KnownExoplanetsDataset};
pub use lightcurves::{DownloadFailure, DownloadReport, LightcurveDataset};
pub use observations::TessObservationsDataset;
pub use planetary_composite::PlanetarySystemsCompositeDataset;
pub use reducer::reduce_exoplanets;
pub use tic::{TicCatalogDataset, TicCriteria};

use std::sync::Arc;

use log::info;
use polars::prelude::Column;

use crate::error::ExoResult;
use crate::schema::SchemaRegistry;
use crate::storage::StorageBackend;
use crate::table::CatalogTable;

/// `<base>[_<tag>][_<with_name>]`
pub fn dataset_name(base: &str, tag: Option<&str>, with_name: Option<&str>) -> String {
    let mut name = base.to_string();
    for part in [tag, with_name].into_iter().flatten() {
        if !part.is_empty() {
            name.push('_');
            name.push_str(part);
        }
    }
    name
}

/// Storage, registry and naming shared by the accessors.
///
/// `catalog` names the registry entry the stored tables are normalized
/// with on download and validated against on load.
#[derive(Debug, Clone)]
pub(crate) struct DatasetStore {
    storage: Arc<dyn StorageBackend>,
    registry: Arc<SchemaRegistry>,
    catalog: &'static str,
    base: String,
    tag: Option<String>,
}

impl DatasetStore {
    pub(crate) fn new(
        storage: Arc<dyn StorageBackend>,
        registry: Arc<SchemaRegistry>,
        catalog: &'static str,
        base: &str,
        tag: Option<&str>,
    ) -> Self {
        Self {
            storage,
            registry,
            catalog,
            base: base.to_string(),
            tag: tag.map(str::to_string),
        }
    }

    pub(crate) fn with_tag(mut self, tag: Option<&str>) -> Self {
        self.tag = tag.map(str::to_string);
        self
    }

    pub(crate) fn name(&self, with_name: Option<&str>) -> String {
        dataset_name(&self.base, self.tag.as_deref(), with_name)
    }

    pub(crate) fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Cast to the catalog's registered dtypes and attach its header.
    pub(crate) fn normalize(&self, table: CatalogTable) -> ExoResult<CatalogTable> {
        self.registry
            .catalog(self.catalog)?
            .normalize(table)
            .map_err(|e| e.with_operation(format!("normalize_{}", self.catalog)))
    }

    /// Zero-row table with every registered column of the catalog.
    pub(crate) fn empty_table(&self) -> ExoResult<CatalogTable> {
        let schema = self.registry.catalog(self.catalog)?;
        let columns = schema
            .column_names()
            .filter_map(|name| schema.column(name).map(|c| (name, c.dtype)))
            .map(|(name, dtype)| Column::full_null(name.into(), 0, &dtype.to_polars()))
            .collect();
        schema.normalize(CatalogTable::new(columns)?)
    }

    pub(crate) fn save(&self, with_name: Option<&str>, table: &CatalogTable) -> ExoResult<()> {
        let name = self.name(with_name);
        self.storage.save(&name, table)?;
        info!("Stored {} rows as '{}'", table.len(), name);
        Ok(())
    }

    /// Load a stored table and check it still matches the registry.
    pub(crate) fn load(&self, with_name: Option<&str>) -> ExoResult<CatalogTable> {
        let name = self.name(with_name);
        let table = self.storage.load(&name)?;
        self.registry
            .catalog(self.catalog)?
            .validate(&table)
            .map_err(|e| e.with_operation(format!("load_{}", name)))?;
        Ok(table)
    }

    pub(crate) fn exists(&self, with_name: Option<&str>) -> ExoResult<bool> {
        self.storage.exists(&self.name(with_name))
    }
}
