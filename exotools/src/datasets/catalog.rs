//! Typed views over dataset tables.
//!
//! Every view wraps a [`CatalogTable`] and knows its identifier column. The
//! shared selection operations live on [`CatalogView`]; catalog-specific
//! selectors are inherent methods.

use std::collections::BTreeSet;

use crate::error::{ErrorContext, ExoError, ExoResult};
use crate::table::{value_at, CatalogTable, DType, Row, Value};

/// Operations shared by every catalog view.
pub trait CatalogView: Sized {
    /// Column identifying a record.
    const ID_COLUMN: &'static str;

    fn from_table(table: CatalogTable) -> Self;
    fn table(&self) -> &CatalogTable;
    fn into_table(self) -> CatalogTable;

    fn len(&self) -> usize {
        self.table().len()
    }

    fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Records whose `column` equals `value`.
    fn where_eq(&self, column: &str, value: impl Into<Value>) -> ExoResult<Self> {
        let value = value.into();
        let data = self.table().require_column(column)?;
        let mask: Vec<bool> = (0..data.len()).map(|i| value_at(data, i).matches(&value)).collect();
        Ok(Self::from_table(self.table().filter_mask(&mask)?))
    }

    /// Records whose `column` equals any of `values`.
    fn where_in<V>(&self, column: &str, values: impl IntoIterator<Item = V>) -> ExoResult<Self>
    where
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let data = self.table().require_column(column)?;
        let mask: Vec<bool> = (0..data.len())
            .map(|i| {
                let cell = value_at(data, i);
                values.iter().any(|v| cell.matches(v))
            })
            .collect();
        Ok(Self::from_table(self.table().filter_mask(&mask)?))
    }

    fn filter<F>(&self, predicate: F) -> ExoResult<Self>
    where
        F: Fn(&Row<'_>) -> bool,
    {
        Ok(Self::from_table(self.table().filter(predicate)?))
    }

    /// Drop records with a null or negative identifier.
    fn with_valid_ids(&self) -> ExoResult<Self> {
        let data = self.table().require_column(Self::ID_COLUMN)?;
        let mask: Vec<bool> = (0..data.len())
            .map(|i| match value_at(data, i) {
                Value::Null => false,
                Value::Int(v) => v >= 0,
                Value::Str(s) => !s.trim().is_empty(),
                _ => true,
            })
            .collect();
        Ok(Self::from_table(self.table().filter_mask(&mask)?))
    }

    /// Sorted distinct non-null integers of `column`.
    fn unique_ints(&self, column: &str) -> ExoResult<Vec<i64>> {
        let data = self.table().require_column(column)?;
        if self.table().dtype(column) != Some(DType::Int64) {
            return Err(ExoError::schema_mismatch_with_context(
                format!("column '{}' is {}, expected int64", column, data.dtype()),
                ErrorContext::new("unique_ids").with_entity("column").with_entity_id(column),
            ));
        }
        let set: BTreeSet<i64> = data.as_materialized_series().i64()?.into_iter().flatten().collect();
        Ok(set.into_iter().collect())
    }

    /// Sorted distinct non-null strings of `column`.
    fn unique_strings(&self, column: &str) -> ExoResult<Vec<String>> {
        self.table().require_column(column)?;
        let set: BTreeSet<String> = self
            .table()
            .rows()
            .filter_map(|row| row.str(column).map(str::to_string))
            .collect();
        Ok(set.into_iter().collect())
    }

    /// Records of `self` followed by those of `other`.
    fn append(&self, other: &Self) -> ExoResult<Self> {
        Ok(Self::from_table(self.table().vstack(other.table())?))
    }
}

/// Declare a catalog view type over a table with the given id column.
macro_rules! define_catalog {
    ($(#[$meta:meta])* $name:ident, $id:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            table: CatalogTable,
        }

        impl CatalogView for $name {
            const ID_COLUMN: &'static str = $id;

            fn from_table(table: CatalogTable) -> Self {
                Self { table }
            }

            fn table(&self) -> &CatalogTable {
                &self.table
            }

            fn into_table(self) -> CatalogTable {
                self.table
            }
        }
    };
}

define_catalog!(
    /// Confirmed planets from the NASA `ps` (one row per parameter set) or
    /// `pscomppars` (one row per planet) tables.
    ExoplanetCatalog,
    "tic_id"
);
define_catalog!(
    /// TESS Objects of Interest.
    CandidateCatalog,
    "tic_id"
);
define_catalog!(
    /// Gaia DR3 astrophysical parameters keyed by DR2 source id.
    GaiaCatalog,
    "gaia_id"
);
define_catalog!(TicCatalog, "tic_id");
define_catalog!(
    /// TESS lightcurve products.
    ObservationCatalog,
    "obs_id"
);
define_catalog!(
    /// Lightcurve files on disk.
    LightcurveCatalog,
    "obs_id"
);

fn telescope_contains(row: &Row<'_>, needles: &[&str]) -> bool {
    row.str("disc_telescope")
        .map_or(false, |t| needles.iter().any(|n| t.contains(n)))
}

impl ExoplanetCatalog {
    pub fn unique_tic_ids(&self) -> ExoResult<Vec<i64>> {
        self.unique_ints("tic_id")
    }

    pub fn unique_gaia_ids(&self) -> ExoResult<Vec<i64>> {
        self.unique_ints("gaia_id")
    }

    /// Distinct host names.
    pub fn star_names(&self) -> ExoResult<Vec<String>> {
        self.unique_strings("hostname")
    }

    pub fn tess_planets(&self) -> ExoResult<Self> {
        self.filter(|row| telescope_contains(row, &["TESS"]))
    }

    /// Discoveries by Kepler or K2.
    pub fn kepler_planets(&self) -> ExoResult<Self> {
        self.filter(|row| telescope_contains(row, &["Kepler", "K2"]))
    }

    /// Rows with `tran_flag == 1`, optionally only TESS or Kepler discoveries.
    pub fn transiting_planets(&self, kepler_or_tess_only: bool) -> ExoResult<Self> {
        self.filter(|row| {
            row.i64("tran_flag") == Some(1)
                && (!kepler_or_tess_only || telescope_contains(row, &["TESS", "Kepler", "K2"]))
        })
    }

    /// The archive's default parameter set of each planet.
    pub fn default_records(&self) -> ExoResult<Self> {
        self.filter(|row| row.i64("default_flag") == Some(1))
    }
}

impl CandidateCatalog {
    pub fn unique_tic_ids(&self) -> ExoResult<Vec<i64>> {
        self.unique_ints("tic_id")
    }
}

impl GaiaCatalog {
    pub fn unique_gaia_ids(&self) -> ExoResult<Vec<i64>> {
        self.unique_ints("gaia_id")
    }
}

impl TicCatalog {
    pub fn unique_tic_ids(&self) -> ExoResult<Vec<i64>> {
        self.unique_ints("tic_id")
    }

    pub fn unique_gaia_ids(&self) -> ExoResult<Vec<i64>> {
        self.unique_ints("gaia_id")
    }
}

impl ObservationCatalog {
    pub fn unique_tic_ids(&self) -> ExoResult<Vec<i64>> {
        self.unique_ints("tic_id")
    }

    pub fn unique_obs_ids(&self) -> ExoResult<Vec<String>> {
        self.unique_strings("obs_id")
    }

    pub fn data_urls(&self) -> Vec<&str> {
        self.table.rows().filter_map(|row| row.str("dataURL")).collect()
    }

    pub fn select_by_obs_ids(&self, obs_ids: &[&str]) -> ExoResult<Self> {
        self.where_in("obs_id", obs_ids.iter().copied())
    }

    pub fn select_by_tic_ids(&self, tic_ids: &[i64]) -> ExoResult<Self> {
        self.where_in("tic_id", tic_ids.iter().copied())
    }
}

impl LightcurveCatalog {
    pub fn unique_tic_ids(&self) -> ExoResult<Vec<i64>> {
        self.unique_ints("tic_id")
    }

    pub fn unique_obs_ids(&self) -> ExoResult<Vec<String>> {
        self.unique_strings("obs_id")
    }

    pub fn select_by_tic_ids(&self, tic_ids: &[i64]) -> ExoResult<Self> {
        self.where_in("tic_id", tic_ids.iter().copied())
    }

    /// Paths of the files of one target, sorted.
    pub fn paths_for_tic(&self, tic_id: i64) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .table
            .rows()
            .filter(|row| row.i64("tic_id") == Some(tic_id))
            .filter_map(|row| row.str("path"))
            .collect();
        paths.sort_unstable();
        paths
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::{Column, NamedFrom};

    use super::*;

    fn exoplanets() -> ExoplanetCatalog {
        ExoplanetCatalog::from_table(
            CatalogTable::new(vec![
                Column::new("pl_name".into(), vec![Some("TOI-700 d"), Some("Kepler-90 h"), Some("K2-18 b"), Some("HD 1 b")]),
                Column::new("hostname".into(), vec![Some("TOI-700"), Some("Kepler-90"), Some("K2-18"), Some("HD 1")]),
                Column::new("tic_id".into(), vec![Some(150428135i64), Some(27677846), None, Some(27677846)]),
                Column::new(
                    "disc_telescope".into(),
                    vec![Some("0.1 m TESS Telescope"), Some("0.95 m Kepler Telescope"), Some("0.95 m Kepler Telescope"), Some("3.6 m ESO")],
                ),
                Column::new("tran_flag".into(), vec![Some(1i64), Some(1), Some(1), Some(0)]),
                Column::new("default_flag".into(), vec![Some(1i64), Some(0), Some(1), Some(1)]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_where_eq_and_in() {
        let catalog = exoplanets();
        assert_eq!(catalog.where_eq("hostname", "K2-18").unwrap().len(), 1);
        assert_eq!(catalog.where_eq("tic_id", 27677846).unwrap().len(), 2);
        // Integer columns match float literals
        assert_eq!(catalog.where_eq("tran_flag", 1.0).unwrap().len(), 3);
        let some = catalog
            .where_in("pl_name", ["TOI-700 d", "HD 1 b", "nope"])
            .unwrap();
        assert_eq!(some.len(), 2);
        assert!(catalog.where_eq("missing", 1).is_err());
    }

    #[test]
    fn test_selectors() {
        let catalog = exoplanets();
        assert_eq!(catalog.tess_planets().unwrap().len(), 1);
        assert_eq!(catalog.kepler_planets().unwrap().len(), 2);
        assert_eq!(catalog.transiting_planets(false).unwrap().len(), 3);
        assert_eq!(catalog.transiting_planets(true).unwrap().len(), 3);
        assert_eq!(catalog.default_records().unwrap().len(), 3);
    }

    #[test]
    fn test_ids_and_append() {
        let catalog = exoplanets();
        assert_eq!(catalog.with_valid_ids().unwrap().len(), 3);
        assert_eq!(catalog.unique_tic_ids().unwrap(), vec![27677846, 150428135]);
        assert_eq!(catalog.star_names().unwrap()[0], "HD 1");
        let doubled = catalog.append(&catalog).unwrap();
        assert_eq!(doubled.len(), 8);
        assert!(catalog.unique_ints("hostname").is_err());
    }
}
