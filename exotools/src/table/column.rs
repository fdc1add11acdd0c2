//! Logical column types and cell values over polars columns.

use std::fmt;
use std::str::FromStr;

use polars::prelude::{
    AnyValue, Column, DataType, Float64Chunked, IntoSeries, NamedFrom, PolarsError, Series,
    StringChunked,
};
use serde::{Deserialize, Serialize};

use crate::error::{ExoError, ExoResult};

/// Logical column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int64,
    Float64,
    Bool,
    Utf8,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Bool => "bool",
            DType::Utf8 => "utf8",
        }
    }

    pub fn to_polars(self) -> DataType {
        match self {
            DType::Int64 => DataType::Int64,
            DType::Float64 => DataType::Float64,
            DType::Bool => DataType::Boolean,
            DType::Utf8 => DataType::String,
        }
    }

    /// The logical type of a conformed polars column.
    pub fn from_polars(dtype: &DataType) -> Option<Self> {
        match dtype {
            DataType::Int64 => Some(DType::Int64),
            DataType::Float64 => Some(DType::Float64),
            DataType::Boolean => Some(DType::Bool),
            DataType::String => Some(DType::Utf8),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = String;

    /// Accepts the crate's own tags plus the numpy and VOTable spellings
    /// found in archive metadata (`<f8`, `double`, `long`, `char`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().trim_start_matches(['<', '>', '|', '=']).to_lowercase();
        match tag.as_str() {
            "int64" | "int32" | "int16" | "int8" | "int" | "long" | "short" | "i8" | "i4"
            | "i2" | "i1" | "unsignedbyte" => Ok(DType::Int64),
            "float64" | "float32" | "float" | "double" | "f8" | "f4" | "real" => Ok(DType::Float64),
            "bool" | "boolean" | "b1" => Ok(DType::Bool),
            "utf8" | "str" | "string" | "char" | "unicodechar" | "object" | "o" => Ok(DType::Utf8),
            other if other.starts_with('u') || other.starts_with('s') => Ok(DType::Utf8),
            _ => Err(format!("Unknown dtype: {}", s)),
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Equality across numeric types. Null equals nothing, itself included.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("--"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(v) => f.write_str(v),
        }
    }
}

impl Value {
    /// Non-finite floats read as null.
    fn from_any(value: AnyValue<'_>) -> Self {
        match value {
            AnyValue::Null => Value::Null,
            AnyValue::Boolean(v) => Value::Bool(v),
            AnyValue::Int64(v) => Value::Int(v),
            AnyValue::Int32(v) => Value::Int(v.into()),
            AnyValue::Int16(v) => Value::Int(v.into()),
            AnyValue::Int8(v) => Value::Int(v.into()),
            AnyValue::UInt32(v) => Value::Int(v.into()),
            AnyValue::UInt16(v) => Value::Int(v.into()),
            AnyValue::UInt8(v) => Value::Int(v.into()),
            AnyValue::Float64(v) if v.is_finite() => Value::Float(v),
            AnyValue::Float32(v) if v.is_finite() => Value::Float(v.into()),
            AnyValue::Float64(_) | AnyValue::Float32(_) => Value::Null,
            AnyValue::String(v) => Value::Str(v.to_string()),
            AnyValue::StringOwned(v) => Value::Str(v.to_string()),
            other => Value::Str(other.to_string()),
        }
    }
}

/// Cell `i` of a column; out of range reads as null.
pub(crate) fn value_at(column: &Column, i: usize) -> Value {
    if i >= column.len() {
        return Value::Null;
    }
    column.get(i).map_or(Value::Null, Value::from_any)
}

/// Bring a polars column onto one of the four table dtypes.
///
/// Narrow integers widen to int64, float32 to float64, untyped (all-null)
/// columns become float64 and anything else is rendered as strings.
/// Non-finite floats are stored as nulls.
pub(crate) fn conform_column(column: Column) -> ExoResult<Column> {
    let dtype = column.dtype().clone();
    match dtype {
        DataType::Int64 | DataType::Boolean | DataType::String => Ok(column),
        DataType::Float64 => null_non_finite(column),
        DataType::Null => Ok(column.cast(&DataType::Float64)?),
        d if d.is_integer() => Ok(column.cast(&DataType::Int64)?),
        d if d.is_float() => null_non_finite(column.cast(&DataType::Float64)?),
        other => column.cast(&DataType::String).map_err(|_| {
            ExoError::schema_mismatch(format!(
                "column '{}' has unsupported type {}",
                column.name(),
                other
            ))
        }),
    }
}

fn null_non_finite(column: Column) -> ExoResult<Column> {
    let cleaned = {
        let values = column.as_materialized_series().f64()?;
        if values.into_iter().flatten().all(f64::is_finite) {
            None
        } else {
            let cleaned: Float64Chunked = values
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect();
            Some(cleaned.with_name(column.name().clone()).into_series())
        }
    };
    Ok(cleaned.map_or(column, Column::from))
}

/// Convert a column to another dtype.
///
/// Strings are trimmed before parsing, integers widen to floats, integral
/// floats narrow to integers and anything renders to a string. Values that
/// cannot be represented are an error, never a silent null.
pub(crate) fn cast_column(column: &Column, dtype: DType) -> ExoResult<Column> {
    let series = column.as_materialized_series();
    if DType::from_polars(series.dtype()) == Some(dtype) {
        return Ok(column.clone());
    }
    let cast_error = |e: PolarsError| {
        ExoError::validation(format!(
            "cannot convert column '{}' to {}: {}",
            series.name(),
            dtype,
            e
        ))
    };
    let converted = match (series.dtype(), dtype) {
        (DataType::String, DType::Bool) => parse_bools(series)?,
        (DataType::String, DType::Int64 | DType::Float64) => {
            let trimmed: StringChunked = series.str()?.into_iter().map(|v| v.map(str::trim)).collect();
            trimmed
                .with_name(series.name().clone())
                .into_series()
                .strict_cast(&dtype.to_polars())
                .map_err(cast_error)?
        }
        (DataType::Float64, DType::Int64) => {
            if let Some(bad) = series
                .f64()?
                .into_iter()
                .flatten()
                .find(|v| v.fract() != 0.0 || v.abs() >= 9.0e15)
            {
                return Err(ExoError::validation(format!(
                    "cannot convert '{}' in column '{}' to int64",
                    bad,
                    series.name()
                )));
            }
            series.strict_cast(&DataType::Int64).map_err(cast_error)?
        }
        _ => series.strict_cast(&dtype.to_polars()).map_err(cast_error)?,
    };
    conform_column(Column::from(converted))
}

fn parse_bools(series: &Series) -> ExoResult<Series> {
    let mut values = Vec::with_capacity(series.len());
    for value in series.str()?.into_iter() {
        let parsed = match value.map(|s| s.trim().to_lowercase()) {
            None => None,
            Some(s) => match s.as_str() {
                "true" | "t" | "1" => Some(true),
                "false" | "f" | "0" => Some(false),
                _ => {
                    return Err(ExoError::validation(format!(
                        "cannot convert '{}' in column '{}' to bool",
                        s,
                        series.name()
                    )))
                }
            },
        };
        values.push(parsed);
    }
    Ok(Series::new(series.name().clone(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_from_archive_tags() {
        assert_eq!("<f8".parse::<DType>().unwrap(), DType::Float64);
        assert_eq!("double".parse::<DType>().unwrap(), DType::Float64);
        assert_eq!("long".parse::<DType>().unwrap(), DType::Int64);
        assert_eq!("<U32".parse::<DType>().unwrap(), DType::Utf8);
        assert_eq!("boolean".parse::<DType>().unwrap(), DType::Bool);
        assert!("complex".parse::<DType>().is_err());
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        let col = Column::new(
            "x".into(),
            vec![Some(1.0), Some(f64::NAN), Some(f64::INFINITY), None],
        );
        let col = conform_column(col).unwrap();
        assert_eq!(col.null_count(), 3);
        assert_eq!(value_at(&col, 0), Value::Float(1.0));
        assert_eq!(value_at(&col, 9), Value::Null);
    }

    #[test]
    fn test_narrow_types_widen() {
        let ints = conform_column(Column::new("n".into(), &[1i32, 2, 3])).unwrap();
        assert_eq!(ints.dtype(), &DataType::Int64);
        let floats = conform_column(Column::new("f".into(), &[1.5f32])).unwrap();
        assert_eq!(floats.dtype(), &DataType::Float64);
    }

    #[test]
    fn test_cast_string_to_int_and_back() {
        let col = Column::new("tic_id".into(), vec![Some(" 12"), None]);
        let ints = cast_column(&col, DType::Int64).unwrap();
        assert_eq!(ints.dtype(), &DataType::Int64);
        assert_eq!(value_at(&ints, 0), Value::Int(12));
        assert!(value_at(&ints, 1).is_null());
        let strings = cast_column(&ints, DType::Utf8).unwrap();
        assert_eq!(value_at(&strings, 0), Value::Str("12".into()));
    }

    #[test]
    fn test_cast_string_to_bool() {
        let col = Column::new("flag".into(), vec![Some("True"), Some("0"), None]);
        let bools = cast_column(&col, DType::Bool).unwrap();
        assert_eq!(value_at(&bools, 0), Value::Bool(true));
        assert_eq!(value_at(&bools, 1), Value::Bool(false));
        assert!(value_at(&bools, 2).is_null());
    }

    #[test]
    fn test_cast_rejects_unparseable_values() {
        let text = Column::new("x".into(), vec![Some("abc")]);
        assert!(matches!(
            cast_column(&text, DType::Float64),
            Err(ExoError::Validation { .. })
        ));
        let floats = Column::new("x".into(), vec![Some(1.5)]);
        assert!(cast_column(&floats, DType::Int64).is_err());
        let integral = Column::new("x".into(), vec![Some(3.0)]);
        assert_eq!(
            value_at(&cast_column(&integral, DType::Int64).unwrap(), 0),
            Value::Int(3)
        );
    }

    #[test]
    fn test_value_matches_across_numeric_types() {
        assert!(Value::Int(2).matches(&Value::Float(2.0)));
        assert!(!Value::Null.matches(&Value::Null));
        assert_eq!(Value::from(None::<i64>).to_string(), "--");
    }
}
