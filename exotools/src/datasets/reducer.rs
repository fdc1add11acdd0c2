//! One row per transiting planet.
//!
//! The `ps` table holds one row per published parameter set. Reduction keeps
//! transiting planets and merges the rows of each planet column by column,
//! taking the most recently updated non-null value.

use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use polars::prelude::{col, Column, IntoLazy, NamedFrom, SortMultipleOptions};

use super::catalog::{CatalogView, ExoplanetCatalog};
use crate::error::ExoResult;
use crate::system::{MANDATORY_PLANET_COLUMNS, PLANET_NAME_COLUMN, VALID_FLAG_COLUMN};
use crate::table::{CatalogTable, ColumnInfo, DType, TableHeader};

const DATASET_COLUMNS: [&str; 4] = ["tic_id", "gaia_id", "disc_telescope", "rowupdate"];
const STAR_COLUMNS: [&str; 4] = ["hostname", "st_rad", "st_rad_gaia", "st_mass"];
const PLANET_COLUMNS: [&str; 15] = [
    "pl_name",
    "pl_rade",
    "pl_masse",
    "pl_dens",
    "pl_orbeccen",
    "pl_orbper",
    "pl_orblper",
    "pl_orbincl",
    "pl_orbsmax",
    "pl_tranmid",
    "pl_trandur",
    "pl_trandep",
    "pl_imppar",
    "pl_ratror",
    "pl_ratdor",
];

/// Parse the archive's `rowupdate` stamp (`2023-05-02` or with a time).
pub fn parse_row_update(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Columns kept by the reduction, with their `_lower`/`_upper` bounds.
fn reduced_columns(table: &CatalogTable) -> Vec<String> {
    let base: Vec<&str> = DATASET_COLUMNS
        .iter()
        .chain(STAR_COLUMNS.iter())
        .chain(PLANET_COLUMNS.iter())
        .copied()
        .filter(|name| table.has_column(name))
        .collect();
    let mut names: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    for name in &base {
        for suffix in ["_lower", "_upper"] {
            let bound = format!("{}{}", name, suffix);
            if table.has_column(&bound) {
                names.push(bound);
            }
        }
    }
    names
}

const FIRST_ROW: &str = "__first_row";
const UPDATED: &str = "__updated";

/// Reduce a known-exoplanets catalog to one row per transiting planet.
///
/// Planets appear in the order of their first row in the input. Rows with
/// a null `pl_name` are dropped. `pl_valid_flag` is true when every column
/// of [`MANDATORY_PLANET_COLUMNS`] is present.
pub fn reduce_exoplanets(catalog: &ExoplanetCatalog) -> ExoResult<CatalogTable> {
    let transiting = catalog.transiting_planets(false)?;
    let table = transiting.table();
    table.require_column(PLANET_NAME_COLUMN)?;

    // Rows without a parseable stamp sort last
    let stamps: Vec<Option<i64>> = table
        .rows()
        .map(|row| {
            row.str("rowupdate")
                .and_then(parse_row_update)
                .map(|t| t.and_utc().timestamp())
        })
        .collect();
    let names = reduced_columns(table);
    let selected: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut frame = table
        .select(&selected)?
        .into_frame()
        .with_row_index(FIRST_ROW.into(), None)?;
    frame.with_column(Column::new(UPDATED.into(), stamps))?;

    let mut aggregations = vec![col(FIRST_ROW).min()];
    aggregations.extend(
        selected
            .iter()
            .filter(|name| **name != PLANET_NAME_COLUMN)
            .map(|name| col(*name).drop_nulls().first()),
    );
    let merged = frame
        .lazy()
        .filter(col(PLANET_NAME_COLUMN).is_not_null())
        .sort(
            [UPDATED],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .group_by_stable([col(PLANET_NAME_COLUMN)])
        .agg(aggregations)
        .sort([FIRST_ROW], SortMultipleOptions::default())
        .select(selected.iter().map(|name| col(*name)).collect::<Vec<_>>())
        .collect()?;

    let mut header = TableHeader::new();
    for name in &names {
        if let Some(info) = table.column_info(name) {
            header.insert(name.clone(), info.clone());
        }
    }
    let mut reduced = CatalogTable::from_frame(merged)?;
    let valid: Vec<bool> = reduced
        .rows()
        .map(|row| MANDATORY_PLANET_COLUMNS.iter().all(|c| !row.is_null(c)))
        .collect();
    reduced.set_column(Column::new(VALID_FLAG_COLUMN.into(), valid))?;
    header.insert(
        VALID_FLAG_COLUMN.to_string(),
        ColumnInfo::new("True if the planet has all the parameters to determine transit events")
            .with_dtype(DType::Bool),
    );
    debug!(
        "Reduced {} rows to {} transiting planets",
        catalog.len(),
        reduced.len()
    );
    reduced.with_header(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ExoplanetCatalog {
        ExoplanetCatalog::from_table(
            CatalogTable::new(vec![
                Column::new("pl_name".into(), vec![Some("A b"), Some("B b"), Some("A b"), Some("C b"), Some("A b")]),
                Column::new("hostname".into(), vec![Some("A"), Some("B"), Some("A"), Some("C"), Some("A")]),
                Column::new("tran_flag".into(), vec![Some(1i64), Some(1), Some(1), Some(0), Some(1)]),
                Column::new(
                    "rowupdate".into(),
                    vec![Some("2014-05-14"), Some("2020-01-01"), Some("2021-09-01"), Some("2020-01-01"), None],
                ),
                Column::new("pl_rade".into(), vec![Some(1.0), Some(2.0), None, Some(3.0), Some(9.0)]),
                Column::new("pl_orbper".into(), vec![Some(10.0), None, Some(11.0), None, None]),
                Column::new("pl_trandur".into(), vec![Some(3.0), Some(2.0), None, None, None]),
                Column::new("pl_tranmid".into(), vec![Some(2455000.0), Some(2456000.0), None, None, None]),
                Column::new("pl_orbsmax".into(), vec![Some(0.1), None, None, None, None]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_parse_row_update() {
        assert!(parse_row_update("2023-05-02").is_some());
        assert!(parse_row_update("2023-05-02 10:11:12").is_some());
        assert!(parse_row_update("yesterday").is_none());
    }

    #[test]
    fn test_reduce_takes_most_recent_non_null() {
        let reduced = reduce_exoplanets(&catalog()).unwrap();
        // C b is not transiting
        assert_eq!(reduced.len(), 2);
        let a = reduced.row(0);
        assert_eq!(a.str("pl_name"), Some("A b"));
        // 2021 row has no radius, so the 2014 row wins over the undated one
        assert_eq!(a.f64("pl_rade"), Some(1.0));
        assert_eq!(a.f64("pl_orbper"), Some(11.0));
        assert_eq!(a.str("rowupdate"), Some("2021-09-01"));
        assert_eq!(a.bool("pl_valid_flag"), Some(true));

        let b = reduced.row(1);
        assert_eq!(b.str("pl_name"), Some("B b"));
        assert_eq!(b.bool("pl_valid_flag"), Some(false));
        assert!(reduced.column_info("pl_valid_flag").is_some());
    }
}
