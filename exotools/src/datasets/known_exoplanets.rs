//! Confirmed exoplanets from the NASA Exoplanet Archive `ps` table.

use std::sync::Arc;

use log::{info, warn};
use polars::prelude::{Column, NamedFrom};

use super::catalog::{CatalogView, ExoplanetCatalog};
use super::gaia::GaiaParametersDataset;
use super::reducer::reduce_exoplanets;
use super::DatasetStore;
use crate::config::DownloadSettings;
use crate::crossmatch::impute_stellar_parameters;
use crate::error::{ExoError, ExoResult};
use crate::ids::{GaiaId, TicId};
use crate::remote::{adql_string, CatalogQueryService};
use crate::schema::{SchemaRegistry, PS};
use crate::storage::StorageBackend;
use crate::system::StarSystemCatalog;
use crate::table::{CatalogTable, DType, Value};
use crate::uncertainty::{compute_bounds, ErrorColumns};

const DATASET_NAME: &str = "known_exoplanets";
const ARCHIVE_TABLE: &str = "ps";
const REDUCED_NAME: &str = "reduced";

/// Columns always requested, whatever the selection.
const MANDATORY_COLUMNS: [&str; 4] = ["pl_name", "hostname", "tic_id", "gaia_id"];

/// What to request from the archive.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Maximum number of rows (`TOP n`).
    pub limit: Option<usize>,
    /// Columns to request. `None` requests every registered column.
    pub columns: Option<Vec<String>>,
    /// `column = value` conditions, joined with `AND`.
    pub filters: Vec<(String, Value)>,
    /// Also download Gaia parameters for the host stars.
    pub with_gaia_star_data: bool,
    pub store: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            limit: None,
            columns: None,
            filters: Vec::new(),
            with_gaia_star_data: false,
            store: true,
        }
    }
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn with_gaia_star_data(mut self) -> Self {
        self.with_gaia_star_data = true;
        self
    }

    pub fn without_storing(mut self) -> Self {
        self.store = false;
        self
    }
}

fn adql_literal(value: &Value) -> ExoResult<String> {
    Ok(match value {
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Bool(v) => i64::from(*v).to_string(),
        Value::Str(s) => adql_string(s),
        Value::Null => {
            return Err(ExoError::validation("null is not a valid filter value"));
        }
    })
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `select [top n] <fields> from <table> [where ...]`
///
/// Filter columns are spliced into the query text, so anything that is
/// not a plain identifier is rejected.
pub fn exoplanets_query(
    table: &str,
    fields: &[String],
    options: &DownloadOptions,
) -> ExoResult<String> {
    let mut query = String::from("select ");
    if let Some(limit) = options.limit {
        query.push_str(&format!("top {} ", limit));
    }
    query.push_str(&fields.join(", "));
    query.push_str(" from ");
    query.push_str(table);
    if !options.filters.is_empty() {
        let conditions = options
            .filters
            .iter()
            .map(|(column, value)| {
                if !is_identifier(column) {
                    return Err(ExoError::validation(format!(
                        "'{}' is not a valid filter column",
                        column
                    )));
                }
                Ok(format!("{} = {}", column, adql_literal(value)?))
            })
            .collect::<ExoResult<Vec<_>>>()?;
        query.push_str(" where ");
        query.push_str(&conditions.join(" and "));
    }
    Ok(query)
}

/// Requested columns plus the mandatory identifiers. Without an explicit
/// selection every registered column of `catalog` is requested, minus the
/// archive's formatted `*str` duplicates.
pub(crate) fn requested_fields(
    registry: &SchemaRegistry,
    catalog: &str,
    options: &DownloadOptions,
) -> ExoResult<Vec<String>> {
    let mut fields: Vec<String> = match &options.columns {
        Some(columns) => columns.clone(),
        None => registry
            .catalog(catalog)?
            .column_names()
            .filter(|name| !name.ends_with("str"))
            .map(str::to_string)
            .collect(),
    };
    for mandatory in MANDATORY_COLUMNS {
        if !fields.iter().any(|f| f == mandatory) {
            fields.push(mandatory.to_string());
        }
    }
    Ok(fields)
}

/// Replace a designation column (`"TIC 123"`) by its integer id.
///
/// Integer columns are left alone; unparseable designations become null.
pub(crate) fn parse_id_column(
    table: &mut CatalogTable,
    column: &str,
    parse: fn(&str) -> Option<i64>,
) -> ExoResult<()> {
    if table.dtype(column) != Some(DType::Utf8) {
        return Ok(());
    }
    let designations: Vec<Option<&str>> = table.rows().map(|row| row.str(column)).collect();
    let ids: Vec<Option<i64>> = designations.iter().map(|s| s.and_then(parse)).collect();
    let unparsed = designations
        .iter()
        .zip(&ids)
        .filter(|(designation, id)| designation.is_some() && id.is_none())
        .count();
    if unparsed > 0 {
        warn!("{} values of '{}' are not valid designations", unparsed, column);
    }
    table.set_column(Column::new(column.into(), ids))
}

/// Parse the `tic_id` and `gaia_id` designations of an archive result.
pub(crate) fn parse_designations(table: &mut CatalogTable) -> ExoResult<()> {
    parse_id_column(table, "tic_id", |s| TicId::parse_designation(s).map(|id| id.value()))?;
    parse_id_column(table, "gaia_id", |s| GaiaId::parse_designation(s).map(|id| id.value()))
}

pub struct KnownExoplanetsDataset {
    store: DatasetStore,
    service: Arc<dyn CatalogQueryService>,
    gaia: GaiaParametersDataset,
}

impl KnownExoplanetsDataset {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        registry: Arc<SchemaRegistry>,
        service: Arc<dyn CatalogQueryService>,
        gaia_service: Arc<dyn CatalogQueryService>,
    ) -> Self {
        Self {
            gaia: GaiaParametersDataset::new(storage.clone(), registry.clone(), gaia_service),
            store: DatasetStore::new(storage, registry, PS, DATASET_NAME, None),
            service,
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.store = self.store.with_tag(Some(tag));
        self
    }

    pub fn with_gaia_chunk_size(mut self, chunk_size: usize) -> Self {
        self.gaia = self.gaia.with_chunk_size(chunk_size);
        self
    }

    pub fn with_settings(mut self, settings: &DownloadSettings) -> Self {
        self.gaia = self.gaia.with_settings(settings);
        self
    }

    pub fn name(&self) -> String {
        self.store.name(None)
    }

    pub fn gaia(&self) -> &GaiaParametersDataset {
        &self.gaia
    }

    pub async fn download(&self, options: &DownloadOptions) -> ExoResult<ExoplanetCatalog> {
        let fields = requested_fields(self.store.registry(), PS, options)?;
        let query = exoplanets_query(ARCHIVE_TABLE, &fields, options)?;
        info!("Querying known exoplanets ({} columns)", fields.len());
        let mut table = self
            .service
            .query(&query)
            .await
            .map_err(|e| e.with_operation("download_known_exoplanets"))?;
        if table.num_columns() == 0 {
            table = self.store.empty_table()?;
        }
        parse_designations(&mut table)?;
        let table = self.store.normalize(table)?;
        info!("Downloaded {} known exoplanet records", table.len());
        if options.store {
            self.store.save(None, &table)?;
        }

        let catalog = ExoplanetCatalog::from_table(table);
        if options.with_gaia_star_data {
            let gaia_ids = catalog.unique_gaia_ids()?;
            self.gaia.download(&gaia_ids, options.store).await?;
        }
        Ok(catalog)
    }

    /// Load the stored catalog. With `with_gaia`, missing stellar radii are
    /// imputed from the stored Gaia parameters and `_lower`/`_upper` bounds
    /// are added for every parameter with error columns.
    pub fn load(&self, with_gaia: bool) -> ExoResult<ExoplanetCatalog> {
        let table = self.store.load(None)?;
        if !with_gaia {
            return Ok(ExoplanetCatalog::from_table(table));
        }
        let gaia = self.gaia.load()?;
        let imputed = impute_stellar_parameters(&table, gaia.table())?;
        let params = ErrorColumns::parameters_with_errors(&imputed);
        let params: Vec<&str> = params.iter().map(String::as_str).collect();
        Ok(ExoplanetCatalog::from_table(compute_bounds(&imputed, &params)?))
    }

    /// Star systems of the transiting planets, computing and storing the
    /// reduced dataset on first use.
    pub fn load_star_systems(&self) -> ExoResult<StarSystemCatalog> {
        let reduced = if self.store.exists(Some(REDUCED_NAME))? {
            self.store.load(Some(REDUCED_NAME))?
        } else {
            info!("Reduced dataset not found, computing it from '{}'", self.name());
            let reduced = reduce_exoplanets(&self.load(true)?)?;
            self.store.save(Some(REDUCED_NAME), &reduced)?;
            reduced
        };
        StarSystemCatalog::from_table(reduced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_building() {
        let fields = vec!["pl_name".to_string(), "hostname".to_string()];
        let options = DownloadOptions::new()
            .limit(5)
            .filter("hostname", "Kepler-90")
            .filter("default_flag", 1);
        assert_eq!(
            exoplanets_query("ps", &fields, &options).unwrap(),
            "select top 5 pl_name, hostname from ps where hostname = 'Kepler-90' and default_flag = 1"
        );
        assert_eq!(
            exoplanets_query("pscomppars", &fields, &DownloadOptions::new()).unwrap(),
            "select pl_name, hostname from pscomppars"
        );
        let bad = DownloadOptions::new().filter("hostname", Value::Null);
        assert!(exoplanets_query("ps", &fields, &bad).is_err());
    }

    #[test]
    fn test_filter_columns_must_be_identifiers() {
        let fields = vec!["pl_name".to_string()];
        for column in ["1=1 or pl_name", "pl name", "", "9lives", "hostname;--"] {
            let options = DownloadOptions::new().filter(column, "x");
            let err = exoplanets_query("ps", &fields, &options).unwrap_err();
            assert!(matches!(err, ExoError::Validation { .. }), "{column}");
        }
        for column in ["_private", "sy_snum", "Pl_Name2"] {
            let options = DownloadOptions::new().filter(column, 1);
            assert!(exoplanets_query("ps", &fields, &options).is_ok(), "{column}");
        }
    }

    #[test]
    fn test_default_options_store() {
        let options = DownloadOptions::default();
        assert!(options.store);
        assert!(options.limit.is_none());
        assert!(!options.with_gaia_star_data);
        assert!(DownloadOptions::new().store);
        assert!(!DownloadOptions::default().without_storing().store);
    }

    #[test]
    fn test_parse_id_column() {
        let mut table = CatalogTable::new(vec![Column::new(
            "tic_id".into(),
            vec![Some("TIC 27677846"), None, Some("garbage")],
        )])
        .unwrap();
        parse_id_column(&mut table, "tic_id", |s| {
            TicId::parse_designation(s).map(|id| id.value())
        })
        .unwrap();
        assert_eq!(table.row(0).i64("tic_id"), Some(27677846));
        assert_eq!(table.row(1).i64("tic_id"), None);
        assert_eq!(table.row(2).i64("tic_id"), None);
    }
}
