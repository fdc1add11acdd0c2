//! Star-system view over planetary tables.
//!
//! A [`StarSystemCatalog`] holds one row per planet, optionally joined with
//! a stellar table, indexed by host name. [`StarSystem`]s are built on
//! demand from the rows of one host.

mod body;

pub use body::{Measurement, Planet, Quantity, Star, MANDATORY_PLANET_COLUMNS};

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;

use crate::crossmatch::{join, JoinKey, JoinOptions};
use crate::error::{ErrorContext, ExoError, ExoResult};
use crate::ids::TicId;
use crate::table::CatalogTable;
use crate::uncertainty::ErrorColumns;

use body::{parameter_columns, quantities_from_row};

pub const HOST_COLUMN: &str = "hostname";
pub const PLANET_NAME_COLUMN: &str = "pl_name";
pub const VALID_FLAG_COLUMN: &str = "pl_valid_flag";

/// One host star and its planets.
#[derive(Debug, Clone, PartialEq)]
pub struct StarSystem {
    pub star: Star,
    pub planets: Vec<Planet>,
}

impl StarSystem {
    pub fn star_name(&self) -> &str {
        &self.star.name
    }

    pub fn tic_id(&self) -> Option<TicId> {
        self.star.tic_id
    }

    pub fn planet_count(&self) -> usize {
        self.planets.len()
    }

    pub fn planet_names(&self) -> Vec<&str> {
        self.planets.iter().map(|p| p.name.as_str()).collect()
    }

    /// Look up a planet by full name (`"Kepler-90 h"`) or letter (`"h"`).
    pub fn planet(&self, name_or_letter: &str) -> Option<&Planet> {
        let wanted = name_or_letter.trim();
        let full = format!("{} {}", self.star.name, wanted);
        self.planets
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(wanted) || p.name.eq_ignore_ascii_case(&full))
    }

    pub fn has_valid_planets(&self) -> bool {
        self.planets.iter().all(Planet::has_mandatory_parameters)
    }
}

impl fmt::Display for StarSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tic = self
            .tic_id()
            .map_or_else(|| "unknown".to_string(), |id| id.to_string());
        writeln!(
            f,
            "StarSystem {} (TIC ID: {}) with {} planets",
            self.star.name,
            tic,
            self.planets.len()
        )?;
        write!(f, "\t* Star {}", self.star)?;
        for planet in &self.planets {
            write!(f, "\n\t- {}", planet)?;
        }
        Ok(())
    }
}

/// Planet rows indexed by host star.
#[derive(Debug, Clone)]
pub struct StarSystemCatalog {
    table: CatalogTable,
    /// Lowercased host name to rows, in source order.
    hosts: HashMap<String, Vec<usize>>,
    /// Host names as first seen.
    host_order: Vec<String>,
    star_parameters: Vec<ErrorColumns>,
    planet_parameters: Vec<ErrorColumns>,
}

fn host_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl StarSystemCatalog {
    /// Index a table that already holds one row per planet with `st_*`
    /// stellar columns.
    pub fn from_table(table: CatalogTable) -> ExoResult<Self> {
        Self::build(table, &HashSet::new())
    }

    /// Join stellar rows onto planet rows and index the result.
    ///
    /// Each planet row takes the first matching stellar row. Every joined
    /// stellar column becomes a star quantity.
    pub fn from_tables(planets: &CatalogTable, stars: &CatalogTable, key: &JoinKey) -> ExoResult<Self> {
        let options = JoinOptions::left().first_wins().with_suffix("_star");
        let joined = join(planets, stars, key, &options)
            .map_err(|e| e.with_operation("star_system_catalog"))?;
        let left_names: HashSet<&str> = planets.column_names().into_iter().collect();
        let star_columns: HashSet<String> = joined
            .table
            .column_names()
            .into_iter()
            .filter(|name| !left_names.contains(name))
            .map(str::to_string)
            .collect();
        Self::build(joined.into_table(), &star_columns)
    }

    fn build(table: CatalogTable, star_columns: &HashSet<String>) -> ExoResult<Self> {
        table
            .require_column(HOST_COLUMN)
            .map_err(|e| e.with_operation("star_system_catalog"))?;
        table
            .require_column(PLANET_NAME_COLUMN)
            .map_err(|e| e.with_operation("star_system_catalog"))?;

        let mut hosts: HashMap<String, Vec<usize>> = HashMap::new();
        let mut host_order = Vec::new();
        for row in table.rows() {
            let Some(name) = row.str(HOST_COLUMN) else {
                continue;
            };
            let entry = hosts.entry(host_key(name)).or_default();
            if entry.is_empty() {
                host_order.push(name.trim().to_string());
            }
            entry.push(row.index());
        }

        let star_parameters =
            parameter_columns(&table, |n| n.starts_with("st_") || star_columns.contains(n));
        let planet_parameters = parameter_columns(&table, |n| n.starts_with("pl_"));
        debug!(
            "Indexed {} planets around {} hosts ({} stellar, {} planetary parameters)",
            table.len(),
            host_order.len(),
            star_parameters.len(),
            planet_parameters.len()
        );
        Ok(Self {
            table,
            hosts,
            host_order,
            star_parameters,
            planet_parameters,
        })
    }

    pub fn table(&self) -> &CatalogTable {
        &self.table
    }

    /// Number of planet rows.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn host_names(&self) -> Vec<&str> {
        self.host_order.iter().map(String::as_str).collect()
    }

    /// Build the system of `host`, matched case-insensitively.
    pub fn star_system(&self, host: &str) -> ExoResult<StarSystem> {
        let rows = self.hosts.get(&host_key(host)).ok_or_else(|| {
            ExoError::not_found_with_context(
                format!("no planets found for host '{}'", host),
                ErrorContext::new("star_system")
                    .with_entity("star_system")
                    .with_entity_id(host),
            )
        })?;
        self.system_from_rows(rows)
    }

    /// Build the system whose host has `tic_id`.
    pub fn star_system_by_tic_id(&self, tic_id: TicId) -> ExoResult<StarSystem> {
        let host = self
            .table
            .rows()
            .find(|row| row.i64("tic_id") == Some(tic_id.value()))
            .and_then(|row| row.str(HOST_COLUMN))
            .ok_or_else(|| {
                ExoError::not_found_with_context(
                    format!("no planets found for TIC {}", tic_id),
                    ErrorContext::new("star_system")
                        .with_entity("tic_id")
                        .with_entity_id(tic_id),
                )
            })?;
        self.star_system(host)
    }

    /// Restrict to planets whose `pl_valid_flag` is set.
    pub fn valid_planets(&self) -> ExoResult<Self> {
        self.table
            .require_column(VALID_FLAG_COLUMN)
            .map_err(|e| e.with_operation("valid_planets"))?;
        let table = self.table.filter(|row| row.bool(VALID_FLAG_COLUMN) == Some(true))?;
        let mut catalog = Self::build(table, &HashSet::new())?;
        catalog.star_parameters = self.star_parameters.clone();
        Ok(catalog)
    }

    fn system_from_rows(&self, rows: &[usize]) -> ExoResult<StarSystem> {
        let first = self.table.row(rows[0]);
        let name = first
            .str(HOST_COLUMN)
            .map(|n| n.trim().to_string())
            .unwrap_or_default();
        let star = Star {
            name,
            tic_id: first.i64("tic_id").map(TicId),
            quantities: quantities_from_row(&first, &self.star_parameters)?,
        };
        let mut planets = Vec::with_capacity(rows.len());
        for &index in rows {
            let row = self.table.row(index);
            planets.push(Planet {
                name: row.str(PLANET_NAME_COLUMN).unwrap_or_default().to_string(),
                quantities: quantities_from_row(&row, &self.planet_parameters)?,
                valid_flag: row.bool(VALID_FLAG_COLUMN),
            });
        }
        Ok(StarSystem { star, planets })
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::{Column, NamedFrom};

    use super::*;
    use crate::table::{ColumnInfo, TableHeader};

    fn planets() -> CatalogTable {
        let mut header = TableHeader::new();
        header.insert("st_rad".into(), ColumnInfo::new("Stellar Radius").with_unit("solRad"));
        CatalogTable::new(vec![
            Column::new("hostname".into(), vec![Some("TOI-700"), Some("Kepler-10"), Some("toi-700")]),
            Column::new("pl_name".into(), vec![Some("TOI-700 b"), Some("Kepler-10 b"), Some("TOI-700 d")]),
            Column::new("tic_id".into(), vec![Some(150428135), Some(377780790), Some(150428135)]),
            Column::new("pl_rade".into(), vec![Some(1.0), Some(1.47), Some(1.19)]),
            Column::new("pl_radeerr1".into(), vec![Some(0.07), None, Some(0.11)]),
            Column::new("pl_radeerr2".into(), vec![Some(-0.06), None, Some(-0.11)]),
            Column::new("st_rad".into(), vec![Some(0.42), Some(1.07), Some(0.42)]),
            Column::new("pl_valid_flag".into(), vec![Some(true), Some(false), Some(true)]),
        ])
        .unwrap()
        .with_header(header)
        .unwrap()
    }

    #[test]
    fn test_star_system_by_host_name() {
        let catalog = StarSystemCatalog::from_table(planets()).unwrap();
        assert_eq!(catalog.host_names(), vec!["TOI-700", "Kepler-10"]);
        let system = catalog.star_system("toi-700").unwrap();
        assert_eq!(system.star_name(), "TOI-700");
        assert_eq!(system.tic_id(), Some(TicId(150428135)));
        assert_eq!(system.planet_names(), vec!["TOI-700 b", "TOI-700 d"]);
        assert_eq!(system.star.radius().unwrap().unit.as_deref(), Some("solRad"));
        let d = system.planet("d").unwrap();
        let upper = d.radius().unwrap().uncertain().upper_bound().unwrap();
        assert!((upper - 1.30).abs() < 1e-12);
        assert!(system.has_valid_planets());
    }

    #[test]
    fn test_unknown_host_is_not_found() {
        let catalog = StarSystemCatalog::from_table(planets()).unwrap();
        assert!(catalog.star_system("Proxima Cen").unwrap_err().is_not_found());
    }

    #[test]
    fn test_lookup_by_tic_id() {
        let catalog = StarSystemCatalog::from_table(planets()).unwrap();
        let system = catalog.star_system_by_tic_id(TicId(377780790)).unwrap();
        assert_eq!(system.star_name(), "Kepler-10");
        assert!(!system.has_valid_planets());
        assert!(catalog.star_system_by_tic_id(TicId(1)).is_err());
    }

    #[test]
    fn test_valid_planets() {
        let catalog = StarSystemCatalog::from_table(planets()).unwrap();
        let valid = catalog.valid_planets().unwrap();
        assert_eq!(valid.len(), 2);
        assert_eq!(valid.host_names(), vec!["TOI-700"]);
    }

    #[test]
    fn test_joined_stellar_columns_become_star_quantities() {
        let stars = CatalogTable::new(vec![
            Column::new("tic_id".into(), vec![Some(150428135)]),
            Column::new("radius".into(), vec![Some(0.43)]),
            Column::new("radius_lower".into(), vec![Some(0.41)]),
            Column::new("radius_upper".into(), vec![Some(0.45)]),
        ])
        .unwrap();
        let catalog = StarSystemCatalog::from_tables(&planets(), &stars, &JoinKey::tic_id()).unwrap();
        let toi = catalog.star_system("TOI-700").unwrap();
        let radius = toi.star.get("radius").unwrap().uncertain();
        assert_eq!(radius.lower_bound(), Some(0.41));
        assert!(toi.star.get("radius_lower").is_none());
        let kepler = catalog.star_system("Kepler-10").unwrap();
        assert!(kepler.star.get("radius").is_none());
    }

    #[test]
    fn test_display() {
        let catalog = StarSystemCatalog::from_table(planets()).unwrap();
        let text = catalog.star_system("TOI-700").unwrap().to_string();
        assert!(text.starts_with("StarSystem TOI-700 (TIC ID: 150428135) with 2 planets"));
        assert_eq!(text.lines().count(), 4);
    }
}
