//! HTTP clients for TAP services and file downloads.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;

use super::{parse_csv_response, CatalogQueryService, FileRetrievalService};
use crate::config::ExotoolsConfig;
use crate::error::{ErrorContext, ExoError, ExoResult};
use crate::table::CatalogTable;

fn build_client(timeout: Duration) -> ExoResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ExoError::configuration(format!("Failed to build HTTP client: {}", e)))
}

const DEFAULT_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Run `request` until it succeeds, fails with a non-retryable error or
/// `attempts` is exhausted. The delay grows linearly with each attempt.
async fn with_retries<F, Fut, T>(attempts: u32, target: &str, mut request: F) -> ExoResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExoResult<T>>,
{
    let mut attempt = 1;
    loop {
        match request().await {
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!("Attempt {}/{} on {} failed: {}", attempt, attempts, target, e);
                tokio::time::sleep(RETRY_DELAY * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

async fn checked_body(response: reqwest::Response, operation: &str, target: &str) -> ExoResult<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<empty response>".to_string());
        let mut context = ErrorContext::new(operation)
            .with_entity("url")
            .with_entity_id(target)
            .with_details(body.trim().chars().take(500).collect::<String>());
        // 5xx and throttling may succeed later
        if status.is_server_error() || status.as_u16() == 429 {
            context = context.retryable();
        }
        return Err(ExoError::remote_with_context(
            format!("request failed ({})", status),
            context,
        ));
    }
    Ok(response.bytes().await?.to_vec())
}

/// Synchronous TAP endpoint queried with ADQL, answering in CSV.
#[derive(Debug, Clone)]
pub struct HttpTapService {
    base_url: String,
    client: Client,
    attempts: u32,
}

impl HttpTapService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ExoResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_client(timeout)?,
            attempts: DEFAULT_ATTEMPTS,
        })
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    fn sync_url(&self) -> String {
        format!("{}/sync", self.base_url)
    }
}

#[async_trait]
impl CatalogQueryService for HttpTapService {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn query(&self, adql: &str) -> ExoResult<CatalogTable> {
        let url = self.sync_url();
        debug!("TAP query on {}: {}", url, adql);
        let params = [
            ("REQUEST", "doQuery"),
            ("LANG", "ADQL"),
            ("FORMAT", "csv"),
            ("QUERY", adql),
        ];
        let (client, target, params) = (&self.client, url.as_str(), &params);
        let body = with_retries(self.attempts, target, move || async move {
            let response = client.post(target).form(params).send().await?;
            checked_body(response, "tap_query", target).await
        })
        .await?;
        let table = parse_csv_response(&body)?;
        debug!("TAP query returned {} rows", table.len());
        Ok(table)
    }
}

/// Plain HTTP(S) GET downloads.
#[derive(Debug, Clone)]
pub struct HttpFileService {
    client: Client,
    attempts: u32,
}

impl HttpFileService {
    pub fn new(timeout: Duration) -> ExoResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            attempts: DEFAULT_ATTEMPTS,
        })
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }
}

#[async_trait]
impl FileRetrievalService for HttpFileService {
    async fn fetch(&self, url: &str) -> ExoResult<Vec<u8>> {
        let client = &self.client;
        with_retries(self.attempts, url, move || async move {
            let response = client.get(url).send().await?;
            checked_body(response, "fetch", url).await
        })
        .await
    }
}

/// HTTP clients for every archive in the configuration, sharing its
/// timeout.
#[derive(Debug, Clone)]
pub struct ArchiveServices {
    /// NASA Exoplanet Archive (`ps`, `toi`).
    pub exoplanet_archive: Arc<HttpTapService>,
    pub gaia: Arc<HttpTapService>,
    pub tic: Arc<HttpTapService>,
    /// MAST CAOM observation metadata.
    pub caom: Arc<HttpTapService>,
    pub files: Arc<HttpFileService>,
}

impl ArchiveServices {
    pub fn from_config(config: &ExotoolsConfig) -> ExoResult<Self> {
        let timeout = config.download.timeout();
        let services = &config.services;
        let tap = |url: &str| HttpTapService::new(url, timeout).map(Arc::new);
        Ok(Self {
            exoplanet_archive: tap(&services.exoplanet_archive_url)?,
            gaia: tap(&services.gaia_url)?,
            tic: tap(&services.tic_url)?,
            caom: tap(&services.caom_url)?,
            files: Arc::new(HttpFileService::new(timeout)?),
        })
    }
}
