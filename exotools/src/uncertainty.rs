//! Values with asymmetric uncertainties.
//!
//! Catalogs publish errors in several conventions. The NASA archive uses
//! `<p>err1` (upper error, positive), `<p>err2` (lower error, negative),
//! `<p>lim` (limit flag) and `<p>symerr` (symmetric flag). Gaia publishes
//! the 16th/84th percentiles as `<p>_lower` / `<p>_upper`. [`ErrorColumns`]
//! names the columns of one convention and [`UncertainValue::from_row`]
//! turns a table row into a central value with bounds.

use std::fmt;

use polars::prelude::{Column, NamedFrom};

use crate::error::{ErrorContext, ExoError, ExoResult};
use crate::table::{CatalogTable, ColumnInfo, DType, Row, Value};

/// One side of an uncertainty interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Known(f64),
    /// The catalog gives no information about this side.
    Unknown,
}

impl Bound {
    pub fn value(&self) -> Option<f64> {
        match self {
            Bound::Known(v) => Some(*v),
            Bound::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Bound::Known(_))
    }
}

/// Which side a one-sided measurement bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// The true value is at most `central`.
    Upper,
    /// The true value is at least `central`.
    Lower,
}

/// Central estimate with lower and upper bounds.
///
/// When both bounds are known, `lower <= central <= upper`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UncertainValue {
    pub central: f64,
    pub lower: Bound,
    pub upper: Bound,
    pub limit: Option<LimitKind>,
}

impl UncertainValue {
    /// A value without uncertainty.
    pub fn exact(central: f64) -> Self {
        Self {
            central,
            lower: Bound::Known(central),
            upper: Bound::Known(central),
            limit: None,
        }
    }

    pub fn symmetric(central: f64, error: f64) -> Self {
        Self::asymmetric(central, error, error)
    }

    /// Errors are magnitudes; their sign is ignored.
    pub fn asymmetric(central: f64, error_upper: f64, error_lower: f64) -> Self {
        Self {
            central,
            lower: Bound::Known(central - error_lower.abs()),
            upper: Bound::Known(central + error_upper.abs()),
            limit: None,
        }
    }

    /// Bounds given directly, clamped around `central`.
    pub fn from_bounds(central: f64, lower: f64, upper: f64) -> Self {
        Self {
            central,
            lower: Bound::Known(lower.min(central)),
            upper: Bound::Known(upper.max(central)),
            limit: None,
        }
    }

    /// `central` is an upper limit: nothing is known below it.
    pub fn upper_limit(central: f64) -> Self {
        Self {
            central,
            lower: Bound::Unknown,
            upper: Bound::Known(central),
            limit: Some(LimitKind::Upper),
        }
    }

    /// `central` is a lower limit: nothing is known above it.
    pub fn lower_limit(central: f64) -> Self {
        Self {
            central,
            lower: Bound::Known(central),
            upper: Bound::Unknown,
            limit: Some(LimitKind::Lower),
        }
    }

    pub fn lower_bound(&self) -> Option<f64> {
        self.lower.value()
    }

    pub fn upper_bound(&self) -> Option<f64> {
        self.upper.value()
    }

    /// Distance from the central value to the upper bound.
    pub fn error_upper(&self) -> Option<f64> {
        self.upper.value().map(|u| u - self.central)
    }

    pub fn error_lower(&self) -> Option<f64> {
        self.lower.value().map(|l| self.central - l)
    }

    pub fn is_limit(&self) -> bool {
        self.limit.is_some()
    }

    /// Build the value for `columns` from a table row.
    ///
    /// Fails with `MissingColumn` when the base column does not exist and
    /// returns `None` when its value is null. Error columns that are absent
    /// from the table count as null.
    pub fn from_row(row: &Row<'_>, columns: &ErrorColumns) -> ExoResult<Option<Self>> {
        let central = match row.get(&columns.base)? {
            Value::Null => return Ok(None),
            value => value.as_f64().ok_or_else(|| not_numeric(&columns.base))?,
        };

        if let Some(flag) = columns.limit_flag.as_deref().and_then(|c| row.f64(c)) {
            if flag == 1.0 {
                return Ok(Some(Self::upper_limit(central)));
            }
            if flag == -1.0 {
                return Ok(Some(Self::lower_limit(central)));
            }
            if flag != 0.0 {
                return Err(ExoError::validation_with_context(
                    format!("limit flag must be -1, 0 or 1, got {}", flag),
                    ErrorContext::new("uncertain_value")
                        .with_entity("row")
                        .with_entity_id(row.index()),
                ));
            }
        }

        let symmetric_flag = columns
            .symmetric_flag
            .as_deref()
            .and_then(|c| row.f64(c))
            .map_or(false, |f| f != 0.0);
        let err_upper = columns.upper_error.as_deref().and_then(|c| row.f64(c));
        let err_lower = columns.lower_error.as_deref().and_then(|c| row.f64(c));

        if symmetric_flag {
            if let Some(error) = err_upper.or(err_lower) {
                return Ok(Some(Self::symmetric(central, error)));
            }
        }
        if let Some(error) = columns.symmetric_error.as_deref().and_then(|c| row.f64(c)) {
            return Ok(Some(Self::symmetric(central, error)));
        }
        if err_upper.is_some() || err_lower.is_some() {
            return Ok(Some(Self::asymmetric(
                central,
                err_upper.unwrap_or(0.0),
                err_lower.unwrap_or(0.0),
            )));
        }

        let lower = columns.lower_bound.as_deref().and_then(|c| row.f64(c));
        let upper = columns.upper_bound.as_deref().and_then(|c| row.f64(c));
        if lower.is_some() || upper.is_some() {
            return Ok(Some(Self::from_bounds(
                central,
                lower.unwrap_or(central),
                upper.unwrap_or(central),
            )));
        }

        Ok(Some(Self::exact(central)))
    }
}

fn not_numeric(column: &str) -> ExoError {
    ExoError::schema_mismatch_with_context(
        format!("column '{}' is not numeric", column),
        ErrorContext::new("uncertain_value").with_entity("column").with_entity_id(column),
    )
}

impl fmt::Display for UncertainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit {
            Some(LimitKind::Upper) => return write!(f, "< {}", self.central),
            Some(LimitKind::Lower) => return write!(f, "> {}", self.central),
            None => {}
        }
        match (self.error_upper(), self.error_lower()) {
            (Some(up), Some(low)) if up == 0.0 && low == 0.0 => write!(f, "{}", self.central),
            (Some(up), Some(low)) if (up - low).abs() <= f64::EPSILON * self.central.abs() => {
                write!(f, "{} ± {}", self.central, up)
            }
            (Some(up), Some(low)) => write!(f, "{} (+{} / -{})", self.central, up, low),
            _ => write!(f, "{}", self.central),
        }
    }
}

/// Names of the columns describing one parameter's uncertainty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorColumns {
    pub base: String,
    pub upper_error: Option<String>,
    pub lower_error: Option<String>,
    pub symmetric_error: Option<String>,
    pub lower_bound: Option<String>,
    pub upper_bound: Option<String>,
    pub limit_flag: Option<String>,
    pub symmetric_flag: Option<String>,
}

impl ErrorColumns {
    /// No error information at all.
    pub fn none(param: &str) -> Self {
        Self {
            base: param.to_string(),
            ..Default::default()
        }
    }

    /// NASA archive convention: `err1`, `err2`, `lim`, `symerr`.
    pub fn nasa(param: &str) -> Self {
        Self {
            base: param.to_string(),
            upper_error: Some(format!("{}err1", param)),
            lower_error: Some(format!("{}err2", param)),
            limit_flag: Some(format!("{}lim", param)),
            symmetric_flag: Some(format!("{}symerr", param)),
            ..Default::default()
        }
    }

    /// Gaia percentile bounds: `_lower`, `_upper`.
    pub fn gaia(param: &str) -> Self {
        Self {
            base: param.to_string(),
            lower_bound: Some(format!("{}_lower", param)),
            upper_bound: Some(format!("{}_upper", param)),
            ..Default::default()
        }
    }

    /// A single symmetric error column.
    pub fn symmetric(param: &str, error_column: &str) -> Self {
        Self {
            base: param.to_string(),
            symmetric_error: Some(error_column.to_string()),
            ..Default::default()
        }
    }

    /// Pick the convention whose columns exist in `table`.
    pub fn detect(table: &CatalogTable, param: &str) -> Self {
        let has = |suffix: &str| table.has_column(&format!("{}{}", param, suffix));
        if has("err1") || has("err2") || has("lim") {
            Self::nasa(param)
        } else if has("_lower") || has("_upper") {
            Self::gaia(param)
        } else if has("_error") {
            Self::symmetric(param, &format!("{}_error", param))
        } else if has("err") {
            Self::symmetric(param, &format!("{}err", param))
        } else {
            Self::none(param)
        }
    }

    /// True if any column besides the base is named.
    pub fn has_error_info(&self) -> bool {
        self.upper_error.is_some()
            || self.lower_error.is_some()
            || self.symmetric_error.is_some()
            || self.lower_bound.is_some()
            || self.upper_bound.is_some()
            || self.limit_flag.is_some()
    }

    /// Parameters of `table` published with NASA-style error columns.
    pub fn parameters_with_errors(table: &CatalogTable) -> Vec<String> {
        table
            .column_names()
            .into_iter()
            .filter_map(|name| name.strip_suffix("err1"))
            .filter(|param| table.has_column(param))
            .map(str::to_string)
            .collect()
    }
}

/// Add `<p>_lower` / `<p>_upper` float columns for each parameter that has
/// error columns. Unknown bounds and null central values are null.
///
/// Parameters already published as bounds (Gaia convention) are skipped.
pub fn compute_bounds(table: &CatalogTable, params: &[&str]) -> ExoResult<CatalogTable> {
    let mut out = table.clone();
    for param in params {
        let columns = ErrorColumns::detect(table, param);
        if !columns.has_error_info() || columns.lower_bound.is_some() {
            continue;
        }
        let mut lower = Vec::with_capacity(table.len());
        let mut upper = Vec::with_capacity(table.len());
        for row in table.rows() {
            let value = UncertainValue::from_row(&row, &columns)
                .map_err(|e| e.with_operation("compute_bounds"))?;
            lower.push(value.and_then(|v| v.lower_bound()));
            upper.push(value.and_then(|v| v.upper_bound()));
        }
        let base_info = table.column_info(param).cloned();
        for (suffix, values) in [("_lower", lower), ("_upper", upper)] {
            let name = format!("{}{}", param, suffix);
            out.set_column(Column::new(name.as_str().into(), values))?;
            let mut info = ColumnInfo::new(format!("{} bound of {}", &suffix[1..], param));
            if let Some(unit) = base_info.as_ref().and_then(|i| i.unit.clone()) {
                info = info.with_unit(unit);
            }
            out.set_column_info(name, info.with_dtype(DType::Float64));
        }
    }
    Ok(out)
}
