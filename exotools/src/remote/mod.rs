//! Remote archive access.
//!
//! Dataset accessors reach the archives through two traits so that tests can
//! substitute in-memory fakes:
//!
//! - [`CatalogQueryService`] runs an ADQL query and returns a table.
//! - [`FileRetrievalService`] downloads a file by URL.
//!
//! The HTTP implementations live in [`http`] (feature `http`).

mod chunks;
#[cfg(feature = "http")]
pub mod http;

pub use chunks::{adql_string, id_list, query_by_id_chunks, query_pages};
#[cfg(feature = "http")]
pub use http::{ArchiveServices, HttpFileService, HttpTapService};

use std::io::Cursor;

use async_trait::async_trait;
use polars::prelude::{CsvReadOptions, SerReader};

use crate::error::ExoResult;
use crate::table::CatalogTable;

/// A TAP-like service answering ADQL queries.
#[async_trait]
pub trait CatalogQueryService: Send + Sync {
    /// Base URL or other identifier, for logging.
    fn endpoint(&self) -> &str;

    async fn query(&self, adql: &str) -> ExoResult<CatalogTable>;
}

/// Retrieval of binary files by URL.
#[async_trait]
pub trait FileRetrievalService: Send + Sync {
    async fn fetch(&self, url: &str) -> ExoResult<Vec<u8>>;
}

/// Parse a CSV query response. Column dtypes are inferred; empty fields are
/// null.
pub fn parse_csv_response(bytes: &[u8]) -> ExoResult<CatalogTable> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(CatalogTable::empty());
    }
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    CatalogTable::from_frame(df)
}
