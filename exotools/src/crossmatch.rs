//! Cross-matching catalogs on TIC ID, Gaia source ID or host name.
//!
//! Identifiers are not unique upstream: a star may appear in several rows of
//! a stellar catalog and a planet in several rows of the planetary table.
//! [`join`] pairs every left row with all (or the first) matching right rows
//! and remembers which input rows produced each output row.

use std::collections::HashSet;
use std::ops::Range;

use log::debug;
use polars::prelude::{
    col, BooleanChunked, Column, DataFrame, DataType, IntoLazy, IntoSeries, JoinArgs, JoinType,
    NamedFrom, NewChunkedArray, SortMultipleOptions, StringChunked,
};

use crate::error::{ErrorContext, ExoError, ExoResult};
use crate::table::{CatalogTable, ColumnInfo, DType, TableHeader};

/// Solar radius in metres (IAU nominal).
pub const SOLAR_RADIUS_M: f64 = 6.957e8;
/// Earth equatorial radius in metres (IAU nominal).
pub const EARTH_RADIUS_M: f64 = 6.3781e6;
pub const ASTRONOMICAL_UNIT_M: f64 = 1.495978707e11;

/// Columns to match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKey {
    pub left: String,
    pub right: String,
    /// Compare string keys trimmed and case-insensitively.
    pub fold_case: bool,
}

impl JoinKey {
    /// Exact match between two columns.
    pub fn on(left: &str, right: &str) -> Self {
        Self {
            left: left.to_string(),
            right: right.to_string(),
            fold_case: false,
        }
    }

    pub fn tic_id() -> Self {
        Self::on("tic_id", "tic_id")
    }

    pub fn gaia_id() -> Self {
        Self::on("gaia_id", "gaia_id")
    }

    /// Host star names, matched case-insensitively.
    pub fn host_name() -> Self {
        Self {
            fold_case: true,
            ..Self::on("hostname", "hostname")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    /// Keep unmatched left rows with null right-hand columns.
    #[default]
    Left,
    /// Drop unmatched left rows.
    Inner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateKeys {
    /// Pair a left row with every matching right row.
    #[default]
    KeepAll,
    /// Use only the first matching right row in source order.
    FirstWins,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOptions {
    pub kind: JoinKind,
    pub duplicates: DuplicateKeys,
    /// Appended to right column names that collide with left ones.
    pub suffix: String,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            kind: JoinKind::Left,
            duplicates: DuplicateKeys::KeepAll,
            suffix: "_right".to_string(),
        }
    }
}

impl JoinOptions {
    pub fn left() -> Self {
        Self::default()
    }

    pub fn inner() -> Self {
        Self {
            kind: JoinKind::Inner,
            ..Self::default()
        }
    }

    pub fn first_wins(mut self) -> Self {
        self.duplicates = DuplicateKeys::FirstWins;
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }
}

/// Join output with row provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTable {
    pub table: CatalogTable,
    /// Left input row of each output row.
    pub left_rows: Vec<usize>,
    /// Right input row of each output row, `None` when unmatched.
    pub right_rows: Vec<Option<usize>>,
}

/// Output rows produced by one left input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeftGroup {
    pub left_row: usize,
    pub rows: Range<usize>,
}

impl JoinedTable {
    pub fn len(&self) -> usize {
        self.left_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left_rows.is_empty()
    }

    /// Contiguous output ranges per left row, in left order.
    pub fn left_groups(&self) -> Vec<LeftGroup> {
        let mut groups: Vec<LeftGroup> = Vec::new();
        for (i, &left_row) in self.left_rows.iter().enumerate() {
            match groups.last_mut() {
                Some(group) if group.left_row == left_row => group.rows.end = i + 1,
                _ => groups.push(LeftGroup {
                    left_row,
                    rows: i..i + 1,
                }),
            }
        }
        groups
    }

    /// First output row of each left group.
    pub fn first_rows(&self) -> ExoResult<CatalogTable> {
        let indices: Vec<usize> = self.left_groups().iter().map(|g| g.rows.start).collect();
        self.table.take(&indices)
    }

    pub fn into_table(self) -> CatalogTable {
        self.table
    }
}

const LEFT_ROW: &str = "__left_row";
const RIGHT_ROW: &str = "__right_row";
const JOIN_KEY: &str = "__join_key";

/// Normalized copy of a key column under [`JOIN_KEY`]. String keys are
/// trimmed, optionally lowercased, and blank strings become nulls.
fn key_column(column: &Column, fold_case: bool) -> ExoResult<Column> {
    if column.dtype() == &DataType::Int64 {
        let mut key = column.clone();
        key.rename(JOIN_KEY.into());
        return Ok(key);
    }
    let normalized: StringChunked = column
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| if fold_case { s.to_lowercase() } else { s.to_string() })
        })
        .collect();
    Ok(Column::from(normalized.with_name(JOIN_KEY.into()).into_series()))
}

/// True for the first row holding each key value.
fn first_occurrences(key: &Column) -> ExoResult<Vec<bool>> {
    let series = key.as_materialized_series();
    if series.dtype() == &DataType::Int64 {
        let mut seen = HashSet::new();
        return Ok(series
            .i64()?
            .into_iter()
            .map(|v| v.map_or(true, |v| seen.insert(v)))
            .collect());
    }
    let mut seen = HashSet::new();
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map_or(true, |v| seen.insert(v)))
        .collect())
}

fn check_key_dtypes(left: &Column, right: &Column) -> ExoResult<()> {
    let (left_dtype, right_dtype) = (DType::from_polars(left.dtype()), DType::from_polars(right.dtype()));
    let compatible = matches!(
        (left_dtype, right_dtype),
        (Some(DType::Int64), Some(DType::Int64)) | (Some(DType::Utf8), Some(DType::Utf8))
    );
    if compatible {
        return Ok(());
    }
    Err(ExoError::schema_mismatch_with_context(
        format!(
            "cannot join {} key '{}' with {} key '{}'",
            left.dtype(),
            left.name(),
            right.dtype(),
            right.name()
        ),
        ErrorContext::new("join").with_entity("key").with_entity_id(left.name()),
    ))
}

fn row_indices(frame: &DataFrame, name: &str) -> ExoResult<Vec<Option<usize>>> {
    let rows = frame.column(name)?.cast(&DataType::Int64)?;
    Ok(rows
        .as_materialized_series()
        .i64()?
        .into_iter()
        .map(|v| v.map(|r| r as usize))
        .collect())
}

/// Join `right` onto `left`.
///
/// Output rows follow left row order, then right source order. The output
/// holds all left columns followed by the right columns minus the right key;
/// right names that collide get `options.suffix`. Null keys never match.
pub fn join(
    left: &CatalogTable,
    right: &CatalogTable,
    key: &JoinKey,
    options: &JoinOptions,
) -> ExoResult<JoinedTable> {
    let left_key = left
        .require_column(&key.left)
        .map_err(|e| e.with_operation("join").with_entity("table", "left"))?;
    let right_key = right
        .require_column(&key.right)
        .map_err(|e| e.with_operation("join").with_entity("table", "right"))?;
    check_key_dtypes(left_key, right_key)?;

    let mut left_frame = left.frame().clone();
    left_frame.with_column(key_column(left_key, key.fold_case)?)?;
    let left_frame = left_frame.with_row_index(LEFT_ROW.into(), None)?;

    let mut header: TableHeader = left.header().clone();
    let mut taken: HashSet<String> = left.column_names().iter().map(|n| n.to_string()).collect();
    let mut right_frame = right.frame().clone();
    right_frame.drop_in_place(&key.right)?;
    for original in right.column_names() {
        if original == key.right {
            continue;
        }
        let mut name = original.to_string();
        while taken.contains(&name) {
            name.push_str(&options.suffix);
        }
        if name != original {
            right_frame.rename(original, name.as_str().into())?;
        }
        if let Some(info) = right.column_info(original) {
            header.insert(name.clone(), info.clone());
        }
        taken.insert(name);
    }
    right_frame.with_column(key_column(right_key, key.fold_case)?)?;
    let mut right_frame = right_frame.with_row_index(RIGHT_ROW.into(), None)?;
    if options.duplicates == DuplicateKeys::FirstWins {
        let mask = first_occurrences(right_frame.column(JOIN_KEY)?)?;
        right_frame = right_frame.filter(&BooleanChunked::from_slice("first".into(), &mask))?;
    }

    let how = match options.kind {
        JoinKind::Left => JoinType::Left,
        JoinKind::Inner => JoinType::Inner,
    };
    let mut joined = left_frame
        .lazy()
        .join(
            right_frame.lazy(),
            [col(JOIN_KEY)],
            [col(JOIN_KEY)],
            JoinArgs::new(how),
        )
        .sort(
            [LEFT_ROW, RIGHT_ROW],
            SortMultipleOptions::default()
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()?;

    let left_rows = row_indices(&joined, LEFT_ROW)?
        .into_iter()
        .map(|r| r.ok_or_else(|| ExoError::internal("join produced a row without a left source")))
        .collect::<ExoResult<Vec<_>>>()?;
    let right_rows = row_indices(&joined, RIGHT_ROW)?;
    let helpers: Vec<String> = joined
        .get_column_names()
        .iter()
        .map(|n| n.as_str())
        .filter(|n| *n == LEFT_ROW || *n == RIGHT_ROW || n.starts_with(JOIN_KEY))
        .map(str::to_string)
        .collect();
    for name in helpers {
        joined.drop_in_place(&name)?;
    }

    debug!(
        "Joined {} x {} rows on {}/{}: {} output rows",
        left.len(),
        right.len(),
        key.left,
        key.right,
        left_rows.len()
    );
    Ok(JoinedTable {
        table: CatalogTable::from_frame(joined)?.with_header(header)?,
        left_rows,
        right_rows,
    })
}

/// Fill missing stellar radii and radius ratios from Gaia.
///
/// Each planet row is matched to the first Gaia row with the same
/// `gaia_id`. Where Gaia has a radius: a null `st_rad` takes it; a null
/// `pl_ratror` is computed from `pl_rade`; a null `pl_ratdor` from
/// `pl_orbsmax`. The Gaia radius is kept as `st_rad_gaia`. Row order is
/// preserved.
pub fn impute_stellar_parameters(
    planets: &CatalogTable,
    gaia: &CatalogTable,
) -> ExoResult<CatalogTable> {
    for name in ["gaia_id", "st_rad", "pl_ratror", "pl_ratdor", "pl_rade", "pl_orbsmax"] {
        planets
            .require_column(name)
            .map_err(|e| e.with_operation("impute_stellar_parameters"))?;
    }
    let gaia_radius = gaia
        .select(&["gaia_id", "radius"])
        .map_err(|e| e.with_operation("impute_stellar_parameters"))?;
    let joined = join(
        planets,
        &gaia_radius,
        &JoinKey::gaia_id(),
        &JoinOptions::left().first_wins().with_suffix("_gaia"),
    )?;
    let radius_column = if planets.has_column("radius") {
        "radius_gaia"
    } else {
        "radius"
    };
    let table = &joined.table;

    let mut st_rad = Vec::with_capacity(table.len());
    let mut ratror = Vec::with_capacity(table.len());
    let mut ratdor = Vec::with_capacity(table.len());
    let mut gaia_rad = Vec::with_capacity(table.len());
    let mut repaired = 0usize;
    for row in table.rows() {
        let radius = row.f64(radius_column);
        let current_rad = row.f64("st_rad");
        let current_ratror = row.f64("pl_ratror");
        let current_ratdor = row.f64("pl_ratdor");

        let new_rad = current_rad.or(radius);
        let new_ratror = current_ratror.or_else(|| {
            let rade = row.f64("pl_rade")?;
            Some(rade * EARTH_RADIUS_M / SOLAR_RADIUS_M / radius?)
        });
        let new_ratdor = current_ratdor.or_else(|| {
            let orbsmax = row.f64("pl_orbsmax")?;
            Some(orbsmax * ASTRONOMICAL_UNIT_M / SOLAR_RADIUS_M / radius?)
        });
        if new_rad != current_rad || new_ratror != current_ratror || new_ratdor != current_ratdor {
            repaired += 1;
        }
        st_rad.push(new_rad);
        ratror.push(new_ratror);
        ratdor.push(new_ratdor);
        gaia_rad.push(radius);
    }
    debug!("Imputed stellar parameters for {} of {} rows", repaired, table.len());

    let mut out = planets.clone();
    out.set_column(Column::new("st_rad".into(), st_rad))?;
    out.set_column(Column::new("pl_ratror".into(), ratror))?;
    out.set_column(Column::new("pl_ratdor".into(), ratdor))?;
    out.set_column(Column::new("st_rad_gaia".into(), gaia_rad))?;
    let mut info = gaia
        .column_info("radius")
        .cloned()
        .unwrap_or_else(|| ColumnInfo::new("Stellar radius from Gaia"));
    info.dtype = Some(DType::Float64);
    out.set_column_info("st_rad_gaia", info);
    Ok(out)
}
