//! Bulk download of lightcurve files and the on-disk lightcurve index.
//!
//! Files live at `<root>/lightcurves/<tic_id>/<obs_id>.fits`. A download
//! runs at most `workers` transfers at once; each file succeeds or fails on
//! its own and failures are collected in the [`DownloadReport`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use polars::prelude::{Column, NamedFrom};

use super::catalog::{CatalogView, LightcurveCatalog, ObservationCatalog};
use crate::config::DownloadSettings;
use crate::error::{ExoError, ExoResult};
use crate::remote::FileRetrievalService;
use crate::schema::{SchemaRegistry, LIGHTCURVES};
use crate::storage::atomic::write_atomic;
use crate::storage::checksum::calculate_checksum;
use crate::table::CatalogTable;

const FOLDER: &str = "lightcurves";
const EXTENSION: &str = "fits";

/// One file that could not be downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadFailure {
    pub obs_id: String,
    pub url: Option<String>,
    pub error: String,
}

/// Outcome of a batch download.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadReport {
    pub downloaded: Vec<PathBuf>,
    /// Already present and not overridden.
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<DownloadFailure>,
}

impl DownloadReport {
    pub fn total(&self) -> usize {
        self.downloaded.len() + self.skipped.len() + self.failures.len()
    }

    pub fn succeeded(&self) -> usize {
        self.downloaded.len() + self.skipped.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fail with [`ExoError::PartialDownload`] if any file failed.
    pub fn into_result(self) -> ExoResult<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(ExoError::partial_download(self.failures.len(), self.total()))
        }
    }
}

#[derive(Debug)]
struct Job {
    obs_id: String,
    url: Option<String>,
    path: Option<PathBuf>,
}

enum Outcome {
    Downloaded(PathBuf),
    Skipped(PathBuf),
    Failed(DownloadFailure),
}

pub struct LightcurveDataset {
    folder: PathBuf,
    registry: Arc<SchemaRegistry>,
    service: Arc<dyn FileRetrievalService>,
    workers: usize,
    override_existing: bool,
}

impl LightcurveDataset {
    pub fn new(
        root: impl AsRef<Path>,
        registry: Arc<SchemaRegistry>,
        service: Arc<dyn FileRetrievalService>,
    ) -> Self {
        let settings = DownloadSettings::default();
        Self {
            folder: root.as_ref().join(FOLDER),
            registry,
            service,
            workers: settings.workers,
            override_existing: settings.override_existing,
        }
    }

    pub fn with_settings(mut self, settings: &DownloadSettings) -> Self {
        self.workers = settings.workers.max(1);
        self.override_existing = settings.override_existing;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path_for(&self, tic_id: i64, obs_id: &str) -> PathBuf {
        self.folder
            .join(tic_id.to_string())
            .join(format!("{}.{}", obs_id, EXTENSION))
    }

    /// One job per target file. Repeated rows for the same file are
    /// dropped so no two workers write the same path.
    fn jobs(&self, observations: &ObservationCatalog) -> Vec<Job> {
        let mut seen = HashSet::new();
        let jobs: Vec<Job> = observations
            .table()
            .rows()
            .map(|row| {
                let obs_id = row.str("obs_id").unwrap_or_default().to_string();
                let path = match row.i64("tic_id") {
                    Some(tic_id) if !obs_id.is_empty() => Some(self.path_for(tic_id, &obs_id)),
                    _ => None,
                };
                Job {
                    obs_id,
                    url: row.str("dataURL").map(str::to_string),
                    path,
                }
            })
            .filter(|job| job.path.as_ref().map_or(true, |path| seen.insert(path.clone())))
            .collect();
        let duplicates = observations.len() - jobs.len();
        if duplicates > 0 {
            debug!("Skipping {} duplicate lightcurve rows", duplicates);
        }
        jobs
    }

    async fn run(&self, job: Job) -> Outcome {
        let failed = |error: String| {
            Outcome::Failed(DownloadFailure {
                obs_id: job.obs_id.clone(),
                url: job.url.clone(),
                error,
            })
        };
        let (Some(url), Some(path)) = (job.url.as_deref(), job.path.clone()) else {
            return failed("missing obs_id, tic_id or dataURL".to_string());
        };
        if path.exists() && !self.override_existing {
            return Outcome::Skipped(path);
        }
        match self.service.fetch(url).await {
            Ok(bytes) => match write_atomic(&path, &bytes) {
                Ok(()) => {
                    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
                    Outcome::Downloaded(path)
                }
                Err(e) => failed(e.to_string()),
            },
            Err(e) => failed(e.to_string()),
        }
    }

    /// Download every lightcurve listed in `observations`.
    ///
    /// Always returns a report; call [`DownloadReport::into_result`] to treat
    /// any failure as an error.
    pub async fn download(&self, observations: &ObservationCatalog) -> DownloadReport {
        let jobs = self.jobs(observations);
        info!(
            "Downloading {} lightcurves into {} with {} workers",
            jobs.len(),
            self.folder.display(),
            self.workers
        );
        let outcomes: Vec<Outcome> = stream::iter(jobs)
            .map(|job| self.run(job))
            .buffer_unordered(self.workers.max(1))
            .collect()
            .await;

        let mut report = DownloadReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Downloaded(path) => report.downloaded.push(path),
                Outcome::Skipped(path) => report.skipped.push(path),
                Outcome::Failed(failure) => {
                    warn!("Failed to download {}: {}", failure.obs_id, failure.error);
                    report.failures.push(failure);
                }
            }
        }
        report.downloaded.sort();
        report.skipped.sort();
        report.failures.sort_by(|a, b| a.obs_id.cmp(&b.obs_id));
        info!(
            "Lightcurve download finished: {} downloaded, {} skipped, {} failed",
            report.downloaded.len(),
            report.skipped.len(),
            report.failures.len()
        );
        report
    }

    /// Index the files on disk. A missing folder yields an empty catalog.
    pub fn load(&self) -> ExoResult<LightcurveCatalog> {
        let mut obs_ids = Vec::new();
        let mut tic_ids = Vec::new();
        let mut paths = Vec::new();
        let mut sizes = Vec::new();
        let mut checksums = Vec::new();

        let mut entries = Vec::new();
        if self.folder.is_dir() {
            for tic_dir in fs::read_dir(&self.folder)? {
                let tic_dir = tic_dir?.path();
                let Some(tic_id) = tic_dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.parse::<i64>().ok())
                else {
                    continue;
                };
                if !tic_dir.is_dir() {
                    continue;
                }
                for file in fs::read_dir(&tic_dir)? {
                    let file = file?.path();
                    if file.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                        entries.push((tic_id, file));
                    }
                }
            }
        }
        entries.sort();

        for (tic_id, path) in entries {
            let Some(obs_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = fs::read(&path)?;
            obs_ids.push(Some(obs_id.to_string()));
            tic_ids.push(Some(tic_id));
            paths.push(Some(path.display().to_string()));
            sizes.push(i64::try_from(content.len()).ok());
            checksums.push(Some(calculate_checksum(&content)));
        }
        debug!("Indexed {} lightcurve files", obs_ids.len());

        let table = CatalogTable::new(vec![
            Column::new("obs_id".into(), obs_ids),
            Column::new("tic_id".into(), tic_ids),
            Column::new("path".into(), paths),
            Column::new("size_bytes".into(), sizes),
            Column::new("sha256".into(), checksums),
        ])?;
        let table = self.registry.catalog(LIGHTCURVES)?.normalize(table)?;
        Ok(LightcurveCatalog::from_table(table))
    }
}
