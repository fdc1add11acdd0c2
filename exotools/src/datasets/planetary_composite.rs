//! Composite planetary parameters from the NASA Exoplanet Archive
//! `pscomppars` table: one row per planet, each value picked from the most
//! complete published solution.

use std::sync::Arc;

use log::info;

use super::catalog::{CatalogView, ExoplanetCatalog};
use super::known_exoplanets::{
    exoplanets_query, parse_designations, requested_fields, DownloadOptions,
};
use super::reducer::reduce_exoplanets;
use super::DatasetStore;
use crate::error::ExoResult;
use crate::remote::CatalogQueryService;
use crate::schema::{SchemaRegistry, PS_COMPOSITE};
use crate::storage::StorageBackend;
use crate::system::StarSystemCatalog;

const DATASET_NAME: &str = "ps_composite";
const ARCHIVE_TABLE: &str = "pscomppars";
const REDUCED_NAME: &str = "reduced";

/// `<name>_reduced`, or `<with_name>_reduced` under a custom name.
fn reduced_name(with_name: Option<&str>) -> String {
    match with_name {
        Some(name) if !name.is_empty() => format!("{}_{}", name, REDUCED_NAME),
        _ => REDUCED_NAME.to_string(),
    }
}

pub struct PlanetarySystemsCompositeDataset {
    store: DatasetStore,
    service: Arc<dyn CatalogQueryService>,
}

impl PlanetarySystemsCompositeDataset {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        registry: Arc<SchemaRegistry>,
        service: Arc<dyn CatalogQueryService>,
    ) -> Self {
        Self {
            store: DatasetStore::new(storage, registry, PS_COMPOSITE, DATASET_NAME, None),
            service,
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.store = self.store.with_tag(Some(tag));
        self
    }

    pub fn name(&self, with_name: Option<&str>) -> String {
        self.store.name(with_name)
    }

    /// Query `pscomppars`, normalize and optionally store under `with_name`.
    ///
    /// `with_gaia_star_data` is ignored: composite parameters already carry
    /// the archive's preferred stellar values.
    pub async fn download_composite_dataset(
        &self,
        options: &DownloadOptions,
        with_name: Option<&str>,
    ) -> ExoResult<ExoplanetCatalog> {
        let fields = requested_fields(self.store.registry(), PS_COMPOSITE, options)?;
        let query = exoplanets_query(ARCHIVE_TABLE, &fields, options)?;
        info!("Querying composite planetary parameters ({} columns)", fields.len());
        let mut table = self
            .service
            .query(&query)
            .await
            .map_err(|e| e.with_operation("download_composite_dataset"))?;
        if table.num_columns() == 0 {
            table = self.store.empty_table()?;
        }
        parse_designations(&mut table)?;
        let table = self.store.normalize(table)?;
        info!("Downloaded {} composite planet records", table.len());
        if options.store {
            self.store.save(with_name, &table)?;
        }
        Ok(ExoplanetCatalog::from_table(table))
    }

    /// The stored composite table. Fails with `NotFound` before a download.
    pub fn load_composite_dataset(&self, with_name: Option<&str>) -> ExoResult<ExoplanetCatalog> {
        self.store.load(with_name).map(ExoplanetCatalog::from_table)
    }

    /// Star systems of the transiting planets. The reduced table is computed
    /// from the stored composite table on first use and stored next to it.
    pub fn load_star_system_dataset(&self, with_name: Option<&str>) -> ExoResult<StarSystemCatalog> {
        let reduced_name = reduced_name(with_name);
        let reduced = if self.store.exists(Some(&reduced_name))? {
            self.store.load(Some(&reduced_name))?
        } else {
            let composite = self.load_composite_dataset(with_name)?;
            info!("Reduced dataset not found, computing it from '{}'", self.name(with_name));
            let reduced = reduce_exoplanets(&composite)?;
            self.store.save(Some(&reduced_name), &reduced)?;
            reduced
        };
        StarSystemCatalog::from_table(reduced)
    }
}
