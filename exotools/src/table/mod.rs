//! Null-aware catalog tables.
//!
//! A [`CatalogTable`] is a polars `DataFrame` restricted to four logical
//! column types ([`DType`]) plus a [`TableHeader`] describing the columns.
//! Every column the header mentions is present in the table, null-filled
//! when the data never contained it.

mod column;
mod header;

pub use column::{DType, Value};
pub use header::{rename_entries, ColumnInfo, TableHeader};

pub(crate) use column::{cast_column, conform_column, value_at};

use std::collections::HashSet;

use polars::prelude::{BooleanChunked, Column, DataFrame, IdxCa, IdxSize, NewChunkedArray};

use crate::error::{ErrorContext, ExoError, ExoResult};

#[derive(Debug, Clone, Default)]
pub struct CatalogTable {
    frame: DataFrame,
    header: TableHeader,
}

impl PartialEq for CatalogTable {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.column_names() == other.column_names()
            && self.frame.dtypes() == other.frame.dtypes()
            && self.frame.equals_missing(&other.frame)
    }
}

impl CatalogTable {
    /// Build a table from columns. Names must be unique and lengths equal.
    pub fn new(columns: Vec<Column>) -> ExoResult<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name().as_str()) {
                return Err(ExoError::validation_with_context(
                    format!("duplicate column '{}'", column.name()),
                    ErrorContext::new("new_table")
                        .with_entity("column")
                        .with_entity_id(column.name()),
                ));
            }
        }
        if let Some(first) = columns.first() {
            let expected = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != expected) {
                return Err(ExoError::validation(format!(
                    "column '{}' has {} rows, expected {}",
                    bad.name(),
                    bad.len(),
                    expected
                )));
            }
        }
        let columns = columns
            .into_iter()
            .map(conform_column)
            .collect::<ExoResult<Vec<_>>>()?;
        Ok(Self {
            frame: DataFrame::new(columns)?,
            header: TableHeader::new(),
        })
    }

    /// Wrap a DataFrame, conforming its dtypes.
    pub fn from_frame(frame: DataFrame) -> ExoResult<Self> {
        Self::new(frame.take_columns())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// Attach a header, null-filling any column it references that the
    /// table lacks. Columns without a declared dtype are filled as float64.
    pub fn with_header(mut self, header: TableHeader) -> ExoResult<Self> {
        self.set_header(header)?;
        Ok(self)
    }

    pub fn set_header(&mut self, header: TableHeader) -> ExoResult<()> {
        let rows = self.len();
        for (name, info) in &header {
            if !self.has_column(name) {
                let dtype = info.dtype.unwrap_or(DType::Float64).to_polars();
                self.frame
                    .with_column(Column::full_null(name.as_str().into(), rows, &dtype))?;
            }
        }
        self.header = header;
        Ok(())
    }

    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    pub fn column_info(&self, name: &str) -> Option<&ColumnInfo> {
        self.header.get(name)
    }

    pub fn unit(&self, name: &str) -> Option<&str> {
        self.header.get(name).and_then(|info| info.unit.as_deref())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_columns(&self) -> usize {
        self.frame.width()
    }

    pub fn columns(&self) -> &[Column] {
        self.frame.get_columns()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns().iter().map(|c| c.name().as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.frame.column(name).ok()
    }

    pub fn require_column(&self, name: &str) -> ExoResult<&Column> {
        self.column(name).ok_or_else(|| ExoError::missing_column(name))
    }

    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.column(name).and_then(|c| DType::from_polars(c.dtype()))
    }

    /// Insert or replace a column. Its length must match the table unless
    /// the table has no columns yet.
    pub fn set_column(&mut self, column: Column) -> ExoResult<()> {
        if self.num_columns() > 0 && column.len() != self.len() {
            return Err(ExoError::validation(format!(
                "column '{}' has {} rows, table has {}",
                column.name(),
                column.len(),
                self.len()
            )));
        }
        self.frame.with_column(conform_column(column)?)?;
        Ok(())
    }

    pub fn set_column_info(&mut self, name: impl Into<String>, info: ColumnInfo) {
        self.header.insert(name.into(), info);
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let column = self.frame.drop_in_place(name).ok()?;
        self.header.remove(name);
        Some(column)
    }

    /// Rename a column and its header entry.
    pub fn rename_column(&mut self, from: &str, to: &str) -> ExoResult<()> {
        if from == to {
            return Ok(());
        }
        if self.has_column(to) {
            return Err(ExoError::validation(format!(
                "cannot rename '{}' to existing column '{}'",
                from, to
            )));
        }
        if !self.has_column(from) {
            return Err(ExoError::missing_column(from));
        }
        self.frame.rename(from, to.into())?;
        if let Some(info) = self.header.remove(from) {
            self.header.insert(to.to_string(), info);
        }
        Ok(())
    }

    /// Convert a column in place, keeping its name and header entry.
    pub fn cast_column(&mut self, name: &str, dtype: DType) -> ExoResult<()> {
        let converted =
            cast_column(self.require_column(name)?, dtype).map_err(|e| e.with_entity("column", name))?;
        self.frame.with_column(converted)?;
        Ok(())
    }

    /// Keep only the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> ExoResult<Self> {
        let mut header = TableHeader::new();
        for name in names {
            self.require_column(name)?;
            if let Some(info) = self.header.get(*name) {
                header.insert(name.to_string(), info.clone());
            }
        }
        Ok(Self {
            frame: self.frame.select(names.iter().copied())?,
            header,
        })
    }

    /// Gather rows by index, preserving the header.
    pub fn take(&self, indices: &[usize]) -> ExoResult<Self> {
        let idx = IdxCa::from_vec(
            "row".into(),
            indices.iter().map(|&i| i as IdxSize).collect(),
        );
        Ok(Self {
            frame: self.frame.take(&idx)?,
            header: self.header.clone(),
        })
    }

    /// Rows where `mask` is true. A short mask treats missing entries as false.
    pub fn filter_mask(&self, mask: &[bool]) -> ExoResult<Self> {
        let mut mask = mask.to_vec();
        mask.resize(self.len(), false);
        let mask = BooleanChunked::from_slice("mask".into(), &mask);
        Ok(Self {
            frame: self.frame.filter(&mask)?,
            header: self.header.clone(),
        })
    }

    /// Rows for which `predicate` holds.
    pub fn filter<F>(&self, predicate: F) -> ExoResult<Self>
    where
        F: Fn(&Row<'_>) -> bool,
    {
        let mask: Vec<bool> = self.rows().map(|r| predicate(&r)).collect();
        self.filter_mask(&mask)
    }

    pub fn head(&self, n: usize) -> Self {
        Self {
            frame: self.frame.head(Some(n)),
            header: self.header.clone(),
        }
    }

    /// Append the rows of `other`.
    ///
    /// Both tables must have the same column names. A column that is entirely
    /// null on one side adopts the dtype of the other side; int64 and float64
    /// widen to float64. Other dtype disagreements are a schema mismatch.
    pub fn vstack(&self, other: &CatalogTable) -> ExoResult<Self> {
        if self.num_columns() == 0 {
            return Ok(other.clone());
        }
        if other.num_columns() == 0 {
            return Ok(self.clone());
        }
        let mut top = Vec::with_capacity(self.num_columns());
        let mut bottom = Vec::with_capacity(self.num_columns());
        for left in self.columns() {
            let name = left.name().as_str();
            let right = other.column(name).ok_or_else(|| {
                ExoError::schema_mismatch_with_context(
                    format!("column '{}' missing from appended table", name),
                    ErrorContext::new("vstack"),
                )
            })?;
            let dtype = common_dtype(left, right).ok_or_else(|| {
                ExoError::schema_mismatch_with_context(
                    format!(
                        "column '{}' is {} on one side and {} on the other",
                        name,
                        left.dtype(),
                        right.dtype()
                    ),
                    ErrorContext::new("vstack"),
                )
            })?;
            top.push(cast_column(left, dtype)?);
            bottom.push(cast_column(right, dtype)?);
        }
        if other.num_columns() != self.num_columns() {
            return Err(ExoError::schema_mismatch(
                "appended table has extra columns".to_string(),
            ));
        }
        let mut frame = DataFrame::new(top)?;
        frame.vstack_mut(&DataFrame::new(bottom)?)?;
        let mut header = other.header.clone();
        header.extend(self.header.clone());
        Ok(Self { frame, header })
    }

    pub fn row(&self, index: usize) -> Row<'_> {
        Row { table: self, index }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        (0..self.len()).map(move |index| Row { table: self, index })
    }
}

fn is_all_null(column: &Column) -> bool {
    column.null_count() == column.len()
}

fn common_dtype(a: &Column, b: &Column) -> Option<DType> {
    let (da, db) = (DType::from_polars(a.dtype())?, DType::from_polars(b.dtype())?);
    if da == db || is_all_null(b) {
        return Some(da);
    }
    if is_all_null(a) {
        return Some(db);
    }
    match (da, db) {
        (DType::Int64, DType::Float64) | (DType::Float64, DType::Int64) => Some(DType::Float64),
        _ => None,
    }
}

/// Borrowed view of a single row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a CatalogTable,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn table(&self) -> &'a CatalogTable {
        self.table
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.table.has_column(name)
    }

    /// Cell value; fails if the column does not exist.
    pub fn get(&self, name: &str) -> ExoResult<Value> {
        Ok(value_at(self.table.require_column(name)?, self.index))
    }

    /// Cell value, or `None` when the column does not exist.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.table.column(name).map(|c| value_at(c, self.index))
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(|v| v.as_f64())
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(|v| v.as_i64())
    }

    pub fn str(&self, name: &str) -> Option<&'a str> {
        let column = self.table.column(name)?;
        if self.index >= column.len() {
            return None;
        }
        column.as_materialized_series().str().ok()?.get(self.index)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(|v| v.as_bool())
    }

    pub fn is_null(&self, name: &str) -> bool {
        self.value(name).map_or(true, |v| v.is_null())
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::NamedFrom;

    use super::*;

    fn sample() -> CatalogTable {
        CatalogTable::new(vec![
            Column::new("hostname".into(), vec![Some("Kepler-90"), Some("TOI-700"), None]),
            Column::new("pl_rade".into(), vec![Some(1.3), None, Some(2.1)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_and_duplicate_columns() {
        let ragged = CatalogTable::new(vec![
            Column::new("a".into(), &[1i64]),
            Column::new("b".into(), &[1i64, 2]),
        ]);
        assert!(matches!(ragged, Err(ExoError::Validation { .. })));
        let duplicate = CatalogTable::new(vec![
            Column::new("a".into(), &[1i64]),
            Column::new("a".into(), &[2i64]),
        ]);
        assert!(matches!(duplicate, Err(ExoError::Validation { .. })));
    }

    #[test]
    fn test_header_null_fills_missing_columns() {
        let mut header = TableHeader::new();
        header.insert(
            "sy_dist".into(),
            ColumnInfo::new("Distance").with_unit("pc").with_dtype(DType::Float64),
        );
        let table = sample().with_header(header).unwrap();
        let col = table.column("sy_dist").unwrap();
        assert_eq!(col.len(), 3);
        assert_eq!(col.null_count(), 3);
        assert_eq!(table.dtype("sy_dist"), Some(DType::Float64));
        assert_eq!(table.unit("sy_dist"), Some("pc"));
    }

    #[test]
    fn test_row_accessors() {
        let table = sample();
        let row = table.row(0);
        assert_eq!(row.str("hostname"), Some("Kepler-90"));
        assert_eq!(row.f64("pl_rade"), Some(1.3));
        assert!(table.row(1).is_null("pl_rade"));
        assert!(table.row(2).is_null("hostname"));
        assert!(row.get("missing").is_err());
        assert!(row.value("missing").is_none());
    }

    #[test]
    fn test_filter_and_take() {
        let table = sample();
        let with_radius = table.filter(|r| r.f64("pl_rade").is_some()).unwrap();
        assert_eq!(with_radius.len(), 2);
        let reversed = table.take(&[2, 1, 0]).unwrap();
        assert_eq!(reversed.row(0).f64("pl_rade"), Some(2.1));
        assert!(table.take(&[7]).is_err());
        assert_eq!(table.filter_mask(&[false, true]).unwrap().len(), 1);
    }

    #[test]
    fn test_rename_moves_header_entry() {
        let mut table = sample()
            .with_header([("hostname".to_string(), ColumnInfo::new("Host"))].into_iter().collect())
            .unwrap();
        table.rename_column("hostname", "host").unwrap();
        assert!(table.has_column("host"));
        assert!(table.column_info("host").is_some());
        assert!(table.column_info("hostname").is_none());
        assert!(table.rename_column("nope", "other").is_err());
    }

    #[test]
    fn test_cast_column_keeps_header() {
        let mut table = CatalogTable::new(vec![Column::new("tic_id".into(), vec![Some("42"), None])])
            .unwrap()
            .with_header([("tic_id".to_string(), ColumnInfo::new("TIC"))].into_iter().collect())
            .unwrap();
        table.cast_column("tic_id", DType::Int64).unwrap();
        assert_eq!(table.dtype("tic_id"), Some(DType::Int64));
        assert_eq!(table.row(0).i64("tic_id"), Some(42));
        assert!(table.column_info("tic_id").is_some());
    }

    #[test]
    fn test_vstack_widens_null_columns() {
        let a = CatalogTable::new(vec![Column::new("tic_id".into(), &[1i64])]).unwrap();
        let b = CatalogTable::new(vec![Column::new("tic_id".into(), vec![None::<&str>])]).unwrap();
        let stacked = a.vstack(&b).unwrap();
        assert_eq!(stacked.len(), 2);
        assert_eq!(stacked.dtype("tic_id"), Some(DType::Int64));

        let floats = CatalogTable::new(vec![Column::new("tic_id".into(), &[2.5f64])]).unwrap();
        let widened = a.vstack(&floats).unwrap();
        assert_eq!(widened.dtype("tic_id"), Some(DType::Float64));
        assert_eq!(widened.row(1).f64("tic_id"), Some(2.5));

        let c = CatalogTable::new(vec![Column::new("tic_id".into(), &["x"])]).unwrap();
        assert!(matches!(a.vstack(&c), Err(ExoError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_equality_checks_dtypes() {
        let ints = CatalogTable::new(vec![Column::new("n".into(), &[1i64])]).unwrap();
        let floats = CatalogTable::new(vec![Column::new("n".into(), &[1.0f64])]).unwrap();
        assert_ne!(ints, floats);
        assert_eq!(ints, ints.clone());
    }
}
