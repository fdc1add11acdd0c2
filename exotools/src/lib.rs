//! # exotools
//!
//! Download, cross-match and cache astronomical catalogs for exoplanet
//! work: confirmed planets (per publication and composite) and TESS
//! candidates from the NASA Exoplanet Archive, Gaia DR3 astrophysical
//! parameters, the TESS Input Catalog, TESS observation metadata and
//! lightcurve files.
//!
//! ## Architecture
//!
//! - [`schema`]: static column metadata (description, unit, dtype) per catalog
//! - [`table`]: [`CatalogTable`], a polars `DataFrame` with its column header
//! - [`storage`]: interchangeable persistence backends behind [`StorageBackend`]
//! - [`remote`]: TAP query and file retrieval services
//! - [`datasets`]: download / load accessors for each catalog
//! - [`crossmatch`]: key-based joins between catalogs
//! - [`uncertainty`]: values with asymmetric errors and limit flags
//! - [`system`]: star-system projection over planetary tables
//!
//! Collaborators are injected: accessors take an `Arc<dyn StorageBackend>`,
//! an `Arc<SchemaRegistry>` and the remote service they need. The library
//! logs through the `log` facade and installs no logger.

// ExoError carries an ErrorContext in every variant
#![allow(clippy::result_large_err)]

pub mod config;
pub mod crossmatch;
pub mod datasets;
pub mod error;
pub mod ids;
pub mod remote;
pub mod schema;
pub mod storage;
pub mod system;
pub mod table;
pub mod uncertainty;

pub use config::ExotoolsConfig;
pub use crossmatch::{join, JoinKey, JoinOptions, JoinedTable};
pub use error::{ErrorContext, ExoError, ExoResult};
pub use ids::{GaiaId, TicId};
pub use schema::SchemaRegistry;
pub use storage::{StorageBackend, StorageFactory};
pub use system::{Planet, Star, StarSystem, StarSystemCatalog};
pub use table::{CatalogTable, ColumnInfo, DType, TableHeader, Value};
pub use uncertainty::{Bound, LimitKind, UncertainValue};
