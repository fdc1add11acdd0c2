//! Configuration and storage selection from files and the environment.

mod support;

use std::fs;

use exotools::config::{ExotoolsConfig, STORAGE_ROOT_ENV, STORAGE_TYPE_ENV};
use exotools::storage::{StorageFactory, StorageType};
use exotools::table::CatalogTable;
use polars::prelude::{Column, NamedFrom};
use tempfile::TempDir;

#[test]
fn test_storage_type_from_env_default() {
    support::with_scoped_env(&[(STORAGE_TYPE_ENV, None)], || {
        assert_eq!(StorageType::from_env(), StorageType::Parquet);
    });
}

#[test]
fn test_storage_type_from_env_set() {
    support::with_scoped_env(&[(STORAGE_TYPE_ENV, Some("CSV"))], || {
        assert_eq!(StorageType::from_env(), StorageType::Csv);
    });
}

#[test]
fn test_config_from_env_overrides_storage() {
    let root = TempDir::new().unwrap();
    let root_str = root.path().to_str().unwrap();
    support::with_scoped_env(
        &[(STORAGE_TYPE_ENV, Some("hierarchical")), (STORAGE_ROOT_ENV, Some(root_str))],
        || {
            let config = ExotoolsConfig::from_env().unwrap();
            assert_eq!(config.storage_type().unwrap(), StorageType::Hierarchical);
            assert_eq!(config.storage.root, root.path());
        },
    );
}

#[test]
fn test_invalid_env_type_is_a_configuration_error() {
    support::with_scoped_env(&[(STORAGE_TYPE_ENV, Some("sqlite"))], || {
        assert!(ExotoolsConfig::from_env().is_err());
        assert!(StorageFactory::from_env().is_err());
    });
}

#[test]
fn test_factory_from_env_round_trips() {
    let root = TempDir::new().unwrap();
    let root_str = root.path().to_str().unwrap();
    support::with_scoped_env(
        &[(STORAGE_TYPE_ENV, Some("csv")), (STORAGE_ROOT_ENV, Some(root_str))],
        || {
            let storage = StorageFactory::from_env().unwrap();
            let table = CatalogTable::new(vec![Column::new("tic_id".into(), vec![Some(1), None])]).unwrap();
            storage.save("tic_catalog", &table).unwrap();
            assert_eq!(storage.load("tic_catalog").unwrap(), table);
            assert_eq!(storage.root_path(), Some(root.path()));
        },
    );
}

#[test]
fn test_factory_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("exotools.toml");
    let data_root = dir.path().join("data");
    fs::write(
        &path,
        format!(
            "[storage]\ntype = \"parquet\"\nroot = {:?}\n\n[download]\nworkers = 2\n",
            data_root.to_str().unwrap()
        ),
    )
    .unwrap();

    let config = ExotoolsConfig::from_file(&path).unwrap();
    assert_eq!(config.download.workers, 2);
    let storage = StorageFactory::from_config_file(&path).unwrap();
    assert_eq!(storage.root_path(), Some(data_root.as_path()));
}
