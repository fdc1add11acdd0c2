//! Gaia DR3 astrophysical parameters, queried by Gaia DR2 source id.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::info;
use polars::prelude::{Column, NamedFrom};

use super::catalog::{CatalogView, GaiaCatalog};
use super::DatasetStore;
use crate::config::DownloadSettings;
use crate::error::ExoResult;
use crate::remote::{query_by_id_chunks, CatalogQueryService};
use crate::schema::{SchemaRegistry, GAIA};
use crate::storage::StorageBackend;
use crate::table::CatalogTable;

const DATASET_NAME: &str = "known_gaia_astro_parameters";
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

const PHOTOMETRY_FIELDS: [&str; 7] = [
    "phot_g_mean_mag",
    "phot_bp_mean_mag",
    "phot_rp_mean_mag",
    "phot_g_mean_flux_over_error",
    "phot_bp_mean_flux_over_error",
    "phot_rp_mean_flux_over_error",
    "phot_variable_flag",
];

const ASTROPHYSICAL_FIELDS: [&str; 17] = [
    "teff_gspphot",
    "teff_gspspec",
    "teff_esphs",
    "teff_espucd",
    "teff_msc1",
    "teff_msc2",
    "mh_gspphot",
    "logg_gspphot",
    "distance_gspphot",
    "distance_msc",
    "mg_gspphot",
    "spectraltype_esphs",
    "age_flame",
    "mass_flame",
    "lum_flame",
    "radius_flame",
    "radius_gspphot",
];

/// Astrophysical parameters published with 16th/84th percentile bounds.
const BOUNDED_FIELDS: [&str; 9] = [
    "teff_gspphot",
    "mh_gspphot",
    "logg_gspphot",
    "distance_gspphot",
    "age_flame",
    "mass_flame",
    "lum_flame",
    "radius_flame",
    "radius_gspphot",
];

const TEMPERATURE_FIELDS: [&str; 6] = [
    "teff_gspphot",
    "teff_gspspec",
    "teff_esphs",
    "teff_espucd",
    "teff_msc1",
    "teff_msc2",
];

/// ADQL selecting single stars by DR2 id through the DR2 to DR3 crossmatch.
pub fn gaia_query(dr2_ids: &str) -> String {
    let mut fields = vec![
        "dr2.source_id AS gaia_id".to_string(),
        "dr3.source_id AS dr3_source_id".to_string(),
    ];
    fields.extend(PHOTOMETRY_FIELDS.iter().map(|f| format!("dr3.{}", f)));
    fields.extend(ASTROPHYSICAL_FIELDS.iter().map(|f| format!("dr3_astro.{}", f)));
    for field in BOUNDED_FIELDS {
        fields.push(format!("dr3_astro.{}_lower", field));
        fields.push(format!("dr3_astro.{}_upper", field));
    }
    format!(
        "SELECT {} \
         FROM gaiadr2.gaia_source AS dr2 \
         JOIN gaiadr3.dr2_neighbourhood AS dr3_n ON dr2.source_id = dr3_n.dr2_source_id \
         JOIN gaiadr3.gaia_source_lite AS dr3 ON dr3.source_id = dr3_n.dr3_source_id \
         JOIN gaiadr3.astrophysical_parameters AS dr3_astro ON dr3.source_id = dr3_astro.source_id \
         WHERE dr2.source_id IN ({}) \
         AND dr3.non_single_star = 0 \
         AND dr3_astro.classprob_dsc_combmod_star > 0.99",
        fields.join(", "),
        dr2_ids
    )
}

fn mean_of_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Add `radius`, `teff_mean`, `inner_hz` and `outer_hz`.
///
/// `radius` averages the FLAME and GSP-Phot radii that are present.
/// The habitable zone edges follow Whitmire & Reynolds (1996):
/// `sqrt(L / 1.1)` and `sqrt(L / 0.53)` AU for a positive FLAME luminosity.
pub fn derive_parameters(table: &CatalogTable) -> ExoResult<CatalogTable> {
    let mut radius = Vec::with_capacity(table.len());
    let mut teff = Vec::with_capacity(table.len());
    let mut inner = Vec::with_capacity(table.len());
    let mut outer = Vec::with_capacity(table.len());
    for row in table.rows() {
        radius.push(mean_of_present(
            ["radius_flame", "radius_gspphot"].iter().map(|c| row.f64(c)),
        ));
        teff.push(mean_of_present(TEMPERATURE_FIELDS.iter().map(|c| row.f64(c))));
        let luminosity = row.f64("lum_flame").filter(|l| *l > 0.0);
        inner.push(luminosity.map(|l| (l / 1.1).sqrt()));
        outer.push(luminosity.map(|l| (l / 0.53).sqrt()));
    }
    let mut out = table.clone();
    out.set_column(Column::new("radius".into(), radius))?;
    out.set_column(Column::new("teff_mean".into(), teff))?;
    out.set_column(Column::new("inner_hz".into(), inner))?;
    out.set_column(Column::new("outer_hz".into(), outer))?;
    Ok(out)
}

/// Lowercase the column names and name the DR2 id `gaia_id`.
fn clean_columns(mut table: CatalogTable) -> ExoResult<CatalogTable> {
    let names: Vec<String> = table.column_names().iter().map(|s| s.to_string()).collect();
    for name in names {
        let lower = name.to_lowercase();
        if lower != name {
            table.rename_column(&name, &lower)?;
        }
    }
    if !table.has_column("gaia_id") && table.has_column("source_id") {
        table.rename_column("source_id", "gaia_id")?;
    }
    Ok(table)
}

pub struct GaiaParametersDataset {
    store: DatasetStore,
    service: Arc<dyn CatalogQueryService>,
    chunk_size: usize,
}

impl GaiaParametersDataset {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        registry: Arc<SchemaRegistry>,
        service: Arc<dyn CatalogQueryService>,
    ) -> Self {
        Self {
            store: DatasetStore::new(storage, registry, GAIA, DATASET_NAME, None),
            service,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_settings(self, settings: &DownloadSettings) -> Self {
        self.with_chunk_size(settings.gaia_chunk_size)
    }

    pub fn name(&self) -> String {
        self.store.name(None)
    }

    /// Download parameters for `gaia_ids` (duplicates and negative ids are
    /// ignored).
    pub async fn download(&self, gaia_ids: &[i64], store: bool) -> ExoResult<GaiaCatalog> {
        let ids: Vec<i64> = gaia_ids
            .iter()
            .copied()
            .filter(|id| *id >= 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        info!("Preparing to download Gaia DR3 data for {} stars", ids.len());
        let raw = query_by_id_chunks(self.service.as_ref(), &ids, self.chunk_size, gaia_query)
            .await
            .map_err(|e| e.with_operation("download_gaia"))?;
        let table = if raw.num_columns() == 0 {
            self.store.empty_table()?
        } else {
            clean_columns(raw)?
        };
        let table = self.store.normalize(derive_parameters(&table)?)?;
        info!("Collected Gaia parameters for {} stars", table.len());
        if store {
            self.store.save(None, &table)?;
        }
        Ok(GaiaCatalog::from_table(table))
    }

    pub fn load(&self) -> ExoResult<GaiaCatalog> {
        Ok(GaiaCatalog::from_table(self.store.load(None)?))
    }

    pub fn exists(&self) -> ExoResult<bool> {
        self.store.exists(None)
    }
}
