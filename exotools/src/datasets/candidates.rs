//! TESS Objects of Interest from the NASA Exoplanet Archive `toi` table.

use std::sync::Arc;

use log::info;

use super::catalog::{CandidateCatalog, CatalogView};
use super::DatasetStore;
use crate::error::ExoResult;
use crate::remote::CatalogQueryService;
use crate::schema::{SchemaRegistry, TOI};
use crate::storage::StorageBackend;

const DATASET_NAME: &str = "candidate_exoplanets";

/// `select [top n] <columns | *> from toi`. The archive names the TIC id
/// `tid`; it is always requested.
pub fn candidates_query(limit: Option<usize>, columns: Option<&[&str]>) -> String {
    let top = limit.map(|n| format!("top {} ", n)).unwrap_or_default();
    let fields = match columns {
        Some(columns) => {
            let mut fields: Vec<&str> = columns
                .iter()
                .copied()
                .filter(|c| *c != "tid" && *c != "tic_id")
                .collect();
            fields.push("tid");
            fields.join(", ")
        }
        None => "*".to_string(),
    };
    format!("select {}{} from toi", top, fields)
}

pub struct CandidateExoplanetsDataset {
    store: DatasetStore,
    service: Arc<dyn CatalogQueryService>,
}

impl CandidateExoplanetsDataset {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        registry: Arc<SchemaRegistry>,
        service: Arc<dyn CatalogQueryService>,
    ) -> Self {
        Self {
            store: DatasetStore::new(storage, registry, TOI, DATASET_NAME, None),
            service,
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.store = self.store.with_tag(Some(tag));
        self
    }

    pub fn name(&self) -> String {
        self.store.name(None)
    }

    pub async fn download(
        &self,
        limit: Option<usize>,
        columns: Option<&[&str]>,
        store: bool,
    ) -> ExoResult<CandidateCatalog> {
        let mut table = self
            .service
            .query(&candidates_query(limit, columns))
            .await
            .map_err(|e| e.with_operation("download_candidates"))?;
        if table.num_columns() == 0 {
            table = self.store.empty_table()?;
        } else if table.has_column("tid") {
            table.rename_column("tid", "tic_id")?;
        }
        let table = self.store.normalize(table)?;
        info!("Downloaded {} TESS objects of interest", table.len());
        if store {
            self.store.save(None, &table)?;
        }
        Ok(CandidateCatalog::from_table(table))
    }

    pub fn load(&self) -> ExoResult<CandidateCatalog> {
        Ok(CandidateCatalog::from_table(self.store.load(None)?))
    }
}
