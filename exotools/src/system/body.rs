//! Stars, planets and their measured quantities.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ExoResult;
use crate::ids::TicId;
use crate::table::{CatalogTable, DType, Row};
use crate::uncertainty::{ErrorColumns, UncertainValue};

/// Columns a planet needs for transit modelling.
pub const MANDATORY_PLANET_COLUMNS: [&str; 4] = ["pl_rade", "pl_trandur", "pl_tranmid", "pl_orbsmax"];

const AUXILIARY_SUFFIXES: [&str; 8] = [
    "err1", "err2", "symerr", "lim", "_error", "err", "_lower", "_upper",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Uncertain(UncertainValue),
    /// Published without any error columns.
    Plain(f64),
}

/// A named physical value with its unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub name: String,
    pub value: Measurement,
    pub unit: Option<String>,
}

impl Quantity {
    pub fn central(&self) -> f64 {
        match &self.value {
            Measurement::Uncertain(v) => v.central,
            Measurement::Plain(v) => *v,
        }
    }

    /// The uncertain value, exact when the quantity is plain.
    pub fn uncertain(&self) -> UncertainValue {
        match &self.value {
            Measurement::Uncertain(v) => *v,
            Measurement::Plain(v) => UncertainValue::exact(*v),
        }
    }

    fn from_row(row: &Row<'_>, columns: &ErrorColumns) -> ExoResult<Option<Self>> {
        let value = if columns.has_error_info() {
            UncertainValue::from_row(row, columns)?.map(Measurement::Uncertain)
        } else {
            row.f64(&columns.base).map(Measurement::Plain)
        };
        Ok(value.map(|value| Self {
            name: columns.base.clone(),
            value,
            unit: row.table().unit(&columns.base).map(str::to_string),
        }))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Measurement::Uncertain(v) => write!(f, "{}", v)?,
            Measurement::Plain(v) => write!(f, "{}", v)?,
        }
        match &self.unit {
            Some(unit) => write!(f, " {}", unit),
            None => Ok(()),
        }
    }
}

/// True when `name` is an error, limit or bound column of another column.
fn is_auxiliary(table: &CatalogTable, name: &str) -> bool {
    AUXILIARY_SUFFIXES.iter().any(|suffix| {
        name.strip_suffix(suffix)
            .map_or(false, |base| !base.is_empty() && table.has_column(base))
    })
}

/// Error-column sets for the numeric parameters of `table` that `include`
/// accepts, in column order.
pub(crate) fn parameter_columns<F>(table: &CatalogTable, include: F) -> Vec<ErrorColumns>
where
    F: Fn(&str) -> bool,
{
    table
        .column_names()
        .into_iter()
        .filter(|name| matches!(table.dtype(name), Some(DType::Float64 | DType::Int64)))
        .filter(|name| include(name) && !is_auxiliary(table, name))
        .map(|name| ErrorColumns::detect(table, name))
        .collect()
}

pub(crate) fn quantities_from_row(
    row: &Row<'_>,
    parameters: &[ErrorColumns],
) -> ExoResult<BTreeMap<String, Quantity>> {
    let mut quantities = BTreeMap::new();
    for columns in parameters {
        if let Some(quantity) = Quantity::from_row(row, columns)? {
            quantities.insert(quantity.name.clone(), quantity);
        }
    }
    Ok(quantities)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Star {
    pub name: String,
    pub tic_id: Option<TicId>,
    pub quantities: BTreeMap<String, Quantity>,
}

impl Star {
    pub fn get(&self, name: &str) -> Option<&Quantity> {
        self.quantities.get(name)
    }

    pub fn radius(&self) -> Option<&Quantity> {
        self.get("st_rad")
    }

    pub fn mass(&self) -> Option<&Quantity> {
        self.get("st_mass")
    }

    pub fn effective_temperature(&self) -> Option<&Quantity> {
        self.get("st_teff")
    }

    pub fn surface_gravity(&self) -> Option<&Quantity> {
        self.get("st_logg")
    }

    pub fn metallicity(&self) -> Option<&Quantity> {
        self.get("st_met")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Planet {
    pub name: String,
    pub quantities: BTreeMap<String, Quantity>,
    pub(crate) valid_flag: Option<bool>,
}

impl Planet {
    pub fn get(&self, name: &str) -> Option<&Quantity> {
        self.quantities.get(name)
    }

    /// Uses `pl_valid_flag` when the table has it, otherwise checks the
    /// transit parameters directly.
    pub fn has_mandatory_parameters(&self) -> bool {
        self.valid_flag.unwrap_or_else(|| {
            MANDATORY_PLANET_COLUMNS
                .iter()
                .all(|name| self.quantities.contains_key(*name))
        })
    }

    pub fn radius(&self) -> Option<&Quantity> {
        self.get("pl_rade")
    }

    pub fn mass(&self) -> Option<&Quantity> {
        self.get("pl_masse")
    }

    pub fn density(&self) -> Option<&Quantity> {
        self.get("pl_dens")
    }

    pub fn eccentricity(&self) -> Option<&Quantity> {
        self.get("pl_orbeccen")
    }

    pub fn orbital_period(&self) -> Option<&Quantity> {
        self.get("pl_orbper")
    }

    pub fn periastron_argument(&self) -> Option<&Quantity> {
        self.get("pl_orblper")
    }

    pub fn inclination(&self) -> Option<&Quantity> {
        self.get("pl_orbincl")
    }

    pub fn semimajor_axis(&self) -> Option<&Quantity> {
        self.get("pl_orbsmax")
    }

    pub fn transit_midpoint(&self) -> Option<&Quantity> {
        self.get("pl_tranmid")
    }

    pub fn transit_duration(&self) -> Option<&Quantity> {
        self.get("pl_trandur")
    }

    pub fn transit_depth(&self) -> Option<&Quantity> {
        self.get("pl_trandep")
    }

    pub fn impact_parameter(&self) -> Option<&Quantity> {
        self.get("pl_imppar")
    }

    /// Planet to stellar radius ratio.
    pub fn radius_ratio(&self) -> Option<&Quantity> {
        self.get("pl_ratror")
    }

    /// Semi-major axis to stellar radius ratio.
    pub fn semimajor_axis_ratio(&self) -> Option<&Quantity> {
        self.get("pl_ratdor")
    }
}

fn or_dash(q: Option<&Quantity>) -> String {
    q.map_or_else(|| "--".to_string(), Quantity::to_string)
}

impl fmt::Display for Planet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, r: {}, p: {}, dur: {}, mid: {}, depth: {}",
            self.name,
            or_dash(self.radius()),
            or_dash(self.orbital_period()),
            or_dash(self.transit_duration()),
            or_dash(self.transit_midpoint()),
            or_dash(self.transit_depth()),
        )?;
        if !self.has_mandatory_parameters() {
            write!(f, " (MISSING PARAMETERS)")?;
        }
        Ok(())
    }
}

impl fmt::Display for Star {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, r: {}, m: {}",
            self.name,
            or_dash(self.radius()),
            or_dash(self.mass())
        )
    }
}
