//! TESS Input Catalog records, by id or by selection criteria.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::info;

use super::catalog::{CatalogView, TicCatalog};
use super::DatasetStore;
use crate::config::DownloadSettings;
use crate::error::{ExoError, ExoResult};
use crate::remote::{query_by_id_chunks, query_pages, CatalogQueryService};
use crate::schema::{SchemaRegistry, TIC};
use crate::storage::StorageBackend;
use crate::table::CatalogTable;

const DATASET_NAME: &str = "tic_catalog";
pub const DEFAULT_CHUNK_SIZE: usize = 400;
const PAGE_SIZE: usize = 50_000;

const FIELDS: &str = "id AS tic_id, gaia AS gaia_id, priority, ra, dec, mass, rad, teff, tmag";

/// Star selection for a criteria download.
#[derive(Debug, Clone, PartialEq)]
pub struct TicCriteria {
    /// Maximum number of stars. `None` pages through every match.
    pub limit: Option<usize>,
    /// Inclusive stellar mass range in solar masses.
    pub star_mass_range: (f64, f64),
    /// Keep stars with a TESS priority strictly above this.
    pub priority_threshold: f64,
}

impl Default for TicCriteria {
    fn default() -> Self {
        Self {
            limit: None,
            star_mass_range: (0.7, 1.3),
            priority_threshold: 0.001,
        }
    }
}

impl TicCriteria {
    fn validate(&self) -> ExoResult<()> {
        let (low, high) = self.star_mass_range;
        if low.is_nan() || high.is_nan() || low > high {
            return Err(ExoError::validation(format!(
                "invalid stellar mass range ({}, {})",
                low, high
            )));
        }
        Ok(())
    }

    fn from_where(&self) -> String {
        format!(
            "from dbo.CatalogRecord where gaia is not null and priority > {} and mass between {} and {}",
            self.priority_threshold, self.star_mass_range.0, self.star_mass_range.1
        )
    }
}

pub fn tic_by_id_query(ids: &str) -> String {
    format!(
        "select {} from dbo.CatalogRecord where gaia is not null and id in ({})",
        FIELDS, ids
    )
}

pub struct TicCatalogDataset {
    store: DatasetStore,
    service: Arc<dyn CatalogQueryService>,
    chunk_size: usize,
}

impl TicCatalogDataset {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        registry: Arc<SchemaRegistry>,
        service: Arc<dyn CatalogQueryService>,
    ) -> Self {
        Self {
            store: DatasetStore::new(storage, registry, TIC, DATASET_NAME, None),
            service,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.store = self.store.with_tag(Some(tag));
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_settings(self, settings: &DownloadSettings) -> Self {
        self.with_chunk_size(settings.tic_chunk_size)
    }

    pub fn name(&self, with_name: Option<&str>) -> String {
        self.store.name(with_name)
    }

    /// Records of `tic_ids` that have a Gaia counterpart.
    pub async fn download_by_ids(
        &self,
        tic_ids: &[i64],
        with_name: Option<&str>,
        store: bool,
    ) -> ExoResult<TicCatalog> {
        let ids: Vec<i64> = tic_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        info!("Querying TIC for {} stars", ids.len());
        let table = query_by_id_chunks(self.service.as_ref(), &ids, self.chunk_size, tic_by_id_query)
            .await
            .map_err(|e| e.with_operation("download_tic_by_ids"))?;
        self.finish(table, with_name, store)
    }

    pub async fn download_by_criteria(
        &self,
        criteria: &TicCriteria,
        with_name: Option<&str>,
        store: bool,
    ) -> ExoResult<TicCatalog> {
        criteria.validate()?;
        info!(
            "Querying TIC for stars with priority > {} and mass in [{}, {}]",
            criteria.priority_threshold, criteria.star_mass_range.0, criteria.star_mass_range.1
        );
        let table = query_pages(
            self.service.as_ref(),
            FIELDS,
            &criteria.from_where(),
            "id",
            criteria.limit,
            PAGE_SIZE,
        )
        .await
        .map_err(|e| e.with_operation("download_tic_by_criteria"))?;
        self.finish(table, with_name, store)
    }

    fn finish(&self, table: CatalogTable, with_name: Option<&str>, store: bool) -> ExoResult<TicCatalog> {
        let table = if table.num_columns() == 0 {
            self.store.empty_table()?
        } else {
            self.store.normalize(table)?
        };
        info!("Collected {} TIC records", table.len());
        if store {
            self.store.save(with_name, &table)?;
        }
        Ok(TicCatalog::from_table(table))
    }

    pub fn load(&self, with_name: Option<&str>) -> ExoResult<TicCatalog> {
        Ok(TicCatalog::from_table(self.store.load(with_name)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_defaults_and_validation() {
        let criteria = TicCriteria::default();
        assert_eq!(criteria.star_mass_range, (0.7, 1.3));
        assert!(criteria.validate().is_ok());
        assert!(criteria.from_where().contains("mass between 0.7 and 1.3"));

        let inverted = TicCriteria {
            star_mass_range: (2.0, 1.0),
            ..TicCriteria::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_by_id_query() {
        let query = tic_by_id_query("1, 2");
        assert!(query.starts_with("select id AS tic_id, gaia AS gaia_id"));
        assert!(query.ends_with("id in (1, 2)"));
    }
}
