//! TESS 2-minute SPOC lightcurve products listed by MAST.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::info;
use polars::prelude::{Column, NamedFrom};

use super::catalog::{CatalogView, ObservationCatalog};
use super::DatasetStore;
use crate::config::DownloadSettings;
use crate::error::ExoResult;
use crate::remote::{adql_string, CatalogQueryService};
use crate::schema::{SchemaRegistry, TESS_OBSERVATIONS};
use crate::storage::StorageBackend;
use crate::table::CatalogTable;

const DATASET_NAME: &str = "tic_observations";
pub const DEFAULT_CHUNK_SIZE: usize = 2000;
const LIGHTCURVE_SUFFIX: &str = "s_lc.fits";

/// Observations of `targets` (quoted TIC ids) with 120 s SPOC cadence.
pub fn observations_query(targets: &str) -> String {
    format!(
        "select obs_id, target_name, dataURL, t_exptime, t_obs_release, t_min, t_max \
         from dbo.ObsPointing \
         where obs_collection = 'TESS' and provenance_name = 'SPOC' \
         and dataproduct_type = 'timeseries' \
         and t_exptime between 119 and 121 \
         and target_name in ({})",
        targets
    )
}

/// Sector number from an observation id such as
/// `tess2018206045859-s0001-0000000025155310-0120-s`.
pub fn sequence_number(obs_id: &str) -> Option<i64> {
    obs_id
        .split('-')
        .find_map(|part| part.strip_prefix('s').filter(|d| d.len() == 4))
        .and_then(|digits| digits.parse().ok())
}

/// Keep lightcurve files, name the target `tic_id` and add `sequence_number`.
fn lightcurve_products(mut table: CatalogTable) -> ExoResult<CatalogTable> {
    if table.has_column("target_name") {
        table.rename_column("target_name", "tic_id")?;
    }
    table.require_column("dataURL")?;
    let mask: Vec<bool> = table
        .rows()
        .map(|row| row.str("dataURL").map_or(false, |u| u.ends_with(LIGHTCURVE_SUFFIX)))
        .collect();
    let mut table = table.filter_mask(&mask)?;
    let sequence: Vec<Option<i64>> = table
        .rows()
        .map(|row| row.str("obs_id").and_then(sequence_number))
        .collect();
    table.set_column(Column::new("sequence_number".into(), sequence))?;
    Ok(table)
}

pub struct TessObservationsDataset {
    store: DatasetStore,
    service: Arc<dyn CatalogQueryService>,
    chunk_size: usize,
}

impl TessObservationsDataset {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        registry: Arc<SchemaRegistry>,
        service: Arc<dyn CatalogQueryService>,
    ) -> Self {
        Self {
            store: DatasetStore::new(storage, registry, TESS_OBSERVATIONS, DATASET_NAME, None),
            service,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.store = self.store.with_tag(Some(tag));
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_settings(self, settings: &DownloadSettings) -> Self {
        self.with_chunk_size(settings.observations_chunk_size)
    }

    pub fn name(&self, with_name: Option<&str>) -> String {
        self.store.name(with_name)
    }

    pub async fn download(
        &self,
        tic_ids: &[i64],
        with_name: Option<&str>,
        store: bool,
    ) -> ExoResult<ObservationCatalog> {
        let ids: Vec<i64> = tic_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        info!("Querying TESS observations for {} targets", ids.len());
        let mut result = CatalogTable::empty();
        for chunk in ids.chunks(self.chunk_size) {
            // MAST stores target names as text
            let targets = chunk
                .iter()
                .map(|id| adql_string(&id.to_string()))
                .collect::<Vec<_>>()
                .join(", ");
            let part = self
                .service
                .query(&observations_query(&targets))
                .await
                .map_err(|e| e.with_operation("download_observations"))?;
            if part.is_empty() {
                continue;
            }
            let part = self.store.normalize(lightcurve_products(part)?)?;
            result = result.vstack(&part)?;
        }
        if result.num_columns() == 0 {
            result = self.store.empty_table()?;
        }
        info!("Found {} lightcurve products", result.len());
        if store {
            self.store.save(with_name, &result)?;
        }
        Ok(ObservationCatalog::from_table(result))
    }

    pub fn load(&self, with_name: Option<&str>) -> ExoResult<ObservationCatalog> {
        Ok(ObservationCatalog::from_table(self.store.load(with_name)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_number() {
        assert_eq!(
            sequence_number("tess2018206045859-s0001-0000000025155310-0120-s"),
            Some(1)
        );
        assert_eq!(
            sequence_number("tess2020294194027-s0031-0000000150428135-0198-s"),
            Some(31)
        );
        assert_eq!(sequence_number("kplr0001"), None);
    }

    #[test]
    fn test_lightcurve_products() {
        let table = CatalogTable::new(vec![
            Column::new(
                "obs_id".into(),
                vec![
                    Some("tess2018206045859-s0001-0000000025155310-0120-s"),
                    Some("tess2018206045859-s0001-0000000025155310-0120-s"),
                ],
            ),
            Column::new("target_name".into(), vec![Some("25155310"), Some("25155310")]),
            Column::new(
                "dataURL".into(),
                vec![
                    Some("mast:TESS/product/tess2018206045859-s0001-0000000025155310-0120-s_lc.fits"),
                    Some("mast:TESS/product/tess2018206045859-s0001-0000000025155310-0120-s_tp.fits"),
                ],
            ),
        ])
        .unwrap();
        let products = lightcurve_products(table).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products.row(0).str("tic_id"), Some("25155310"));
        assert_eq!(products.row(0).i64("sequence_number"), Some(1));
    }
}
