//! Bulk lightcurve downloads against an in-memory file service.

mod support;

use std::sync::Arc;

use exotools::datasets::{CatalogView, LightcurveDataset, ObservationCatalog};
use exotools::error::ExoError;
use exotools::schema::SchemaRegistry;
use exotools::storage::checksum::calculate_checksum;
use exotools::table::CatalogTable;
use polars::prelude::{Column, NamedFrom};
use support::FakeFileService;
use tempfile::TempDir;

fn observations() -> ObservationCatalog {
    let mut obs_ids = Vec::new();
    let mut tic_ids = Vec::new();
    let mut urls = Vec::new();
    for i in 0..10i64 {
        let obs_id = format!("tess2018206045859-s{:04}-{:016}-0120-s", i + 1, 100 + i % 3);
        let status = if i == 3 || i == 7 { "broken" } else { "ok" };
        urls.push(Some(format!("https://mast.test/{}/{}_lc.fits", status, obs_id)));
        obs_ids.push(Some(obs_id));
        tic_ids.push(Some(100 + i % 3));
    }
    ObservationCatalog::from_table(
        CatalogTable::new(vec![
            Column::new("obs_id".into(), obs_ids),
            Column::new("tic_id".into(), tic_ids),
            Column::new("dataURL".into(), urls),
        ])
        .unwrap(),
    )
}

fn dataset(root: &TempDir, service: Arc<FakeFileService>) -> LightcurveDataset {
    let registry = Arc::new(SchemaRegistry::bundled().unwrap());
    LightcurveDataset::new(root.path(), registry, service).with_workers(4)
}

#[tokio::test]
async fn test_batch_with_failures_reports_each_item() {
    let root = TempDir::new().unwrap();
    let service = Arc::new(FakeFileService::default());
    let dataset = dataset(&root, service.clone());

    let report = dataset.download(&observations()).await;
    assert_eq!(report.total(), 10);
    assert_eq!(report.downloaded.len(), 8);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| f.url.as_deref().unwrap().contains("broken")));
    for path in &report.downloaded {
        assert!(path.exists());
        assert!(path.starts_with(dataset.folder()));
    }

    match report.into_result() {
        Err(ExoError::PartialDownload { failed, total, .. }) => assert_eq!((failed, total), (2, 10)),
        other => panic!("expected partial download, got {:?}", other),
    }
}

#[tokio::test]
async fn test_existing_files_are_skipped_unless_overridden() {
    let root = TempDir::new().unwrap();
    let service = Arc::new(FakeFileService::default());
    let dataset = dataset(&root, service.clone());

    dataset.download(&observations()).await;
    assert_eq!(service.fetched().len(), 10);

    let again = dataset.download(&observations()).await;
    assert_eq!(again.skipped.len(), 8);
    assert!(again.downloaded.is_empty());
    // Only the failed files are requested again
    assert_eq!(service.fetched().len(), 12);

    let forced = dataset
        .with_override_existing(true)
        .download(&observations())
        .await;
    assert_eq!(forced.downloaded.len(), 8);
    assert_eq!(service.fetched().len(), 22);
}

#[tokio::test]
async fn test_load_indexes_downloaded_files() {
    let root = TempDir::new().unwrap();
    let service = Arc::new(FakeFileService::default());
    let dataset = dataset(&root, service);

    assert!(dataset.load().unwrap().is_empty());
    dataset.download(&observations()).await;

    let catalog = dataset.load().unwrap();
    assert_eq!(catalog.len(), 8);
    assert_eq!(catalog.unique_tic_ids().unwrap(), vec![100, 101, 102]);
    assert!(catalog.table().column_info("sha256").is_some());

    let first = catalog.table().row(0);
    let obs_id = first.str("obs_id").unwrap();
    let url = observations()
        .table()
        .rows()
        .find(|r| r.str("obs_id") == Some(obs_id))
        .and_then(|r| r.str("dataURL").map(str::to_string))
        .unwrap();
    assert_eq!(first.i64("size_bytes"), Some(url.len() as i64));
    assert_eq!(first.str("sha256"), Some(calculate_checksum(url.as_bytes()).as_str()));
    assert!(!catalog.paths_for_tic(100).is_empty());
}

#[tokio::test]
async fn test_rows_without_url_fail_individually() {
    let root = TempDir::new().unwrap();
    let dataset = dataset(&root, Arc::new(FakeFileService::default()));
    let catalog = ObservationCatalog::from_table(
        CatalogTable::new(vec![
            Column::new("obs_id".into(), vec![Some("a"), Some("b")]),
            Column::new("tic_id".into(), vec![Some(1), Some(1)]),
            Column::new("dataURL".into(), vec![Some("https://mast.test/ok/a_lc.fits"), None]),
        ])
        .unwrap(),
    );
    let report = dataset.download(&catalog).await;
    assert_eq!(report.downloaded.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].obs_id, "b");
}

#[tokio::test]
async fn test_duplicate_rows_are_fetched_once() {
    let root = TempDir::new().unwrap();
    let service = Arc::new(FakeFileService::default());
    let dataset = dataset(&root, service.clone());
    let url = "https://mast.test/ok/a_lc.fits";
    let catalog = ObservationCatalog::from_table(
        CatalogTable::new(vec![
            Column::new("obs_id".into(), vec![Some("a"), Some("a"), Some("a"), Some("b")]),
            Column::new("tic_id".into(), vec![Some(1), Some(1), Some(1), Some(1)]),
            Column::new(
                "dataURL".into(),
                vec![Some(url), Some(url), Some(url), Some("https://mast.test/ok/b_lc.fits")],
            ),
        ])
        .unwrap(),
    );

    let report = dataset.download(&catalog).await;
    assert_eq!(report.total(), 2);
    assert_eq!(report.downloaded.len(), 2);
    assert!(report.is_complete());
    let fetched = service.fetched();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched.iter().filter(|u| u.as_str() == url).count(), 1);
}
