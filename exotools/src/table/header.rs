//! Per-column metadata that travels with a table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::DType;

/// Description, unit and declared dtype of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub dtype: Option<DType>,
}

impl ColumnInfo {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            unit: None,
            dtype: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    /// Placeholder for columns the registry knows nothing about.
    pub fn undescribed(dtype: DType) -> Self {
        Self::new("---").with_dtype(dtype)
    }
}

/// Column name to metadata.
pub type TableHeader = BTreeMap<String, ColumnInfo>;

/// Rename header entries with the mapping returned by `rename`.
pub fn rename_entries(header: &TableHeader, rename: impl Fn(&str) -> String) -> TableHeader {
    header
        .iter()
        .map(|(name, info)| (rename(name), info.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_info_defaults_on_deserialize() {
        let info: ColumnInfo = serde_json::from_str(r#"{"description": "Radius"}"#).unwrap();
        assert_eq!(info.description, "Radius");
        assert!(info.unit.is_none());
        assert!(info.dtype.is_none());
    }

    #[test]
    fn test_rename_entries() {
        let mut header = TableHeader::new();
        header.insert("tid".into(), ColumnInfo::new("TIC"));
        let renamed = rename_entries(&header, |n| if n == "tid" { "tic_id".into() } else { n.into() });
        assert!(renamed.contains_key("tic_id"));
        assert!(!renamed.contains_key("tid"));
    }
}
