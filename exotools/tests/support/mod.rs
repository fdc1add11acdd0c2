//! Shared helpers for integration tests: in-memory remote services and
//! scoped environment variables.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use exotools::error::{ExoError, ExoResult};
use exotools::remote::{CatalogQueryService, FileRetrievalService};
use exotools::table::CatalogTable;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the variables on unwind and serializes access to the process
/// environment across parallel tests.
///
/// `Some(v)` sets a variable, `None` removes it.
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

/// TAP service answering every query with the table of the first rule whose
/// pattern occurs in the query, or an empty table.
#[derive(Default)]
pub struct FakeTapService {
    rules: Vec<(String, CatalogTable)>,
    queries: Mutex<Vec<String>>,
}

impl FakeTapService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, pattern: &str, table: CatalogTable) -> Self {
        self.rules.push((pattern.to_string(), table));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogQueryService for FakeTapService {
    fn endpoint(&self) -> &str {
        "fake://tap"
    }

    async fn query(&self, adql: &str) -> ExoResult<CatalogTable> {
        self.queries.lock().unwrap().push(adql.to_string());
        Ok(self
            .rules
            .iter()
            .find(|(pattern, _)| adql.contains(pattern.as_str()))
            .map(|(_, table)| table.clone())
            .unwrap_or_else(CatalogTable::empty))
    }
}

/// File service returning the URL as content, failing for URLs that
/// contain `"broken"`.
#[derive(Default)]
pub struct FakeFileService {
    fetched: Mutex<Vec<String>>,
}

impl FakeFileService {
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileRetrievalService for FakeFileService {
    async fn fetch(&self, url: &str) -> ExoResult<Vec<u8>> {
        self.fetched.lock().unwrap().push(url.to_string());
        if url.contains("broken") {
            return Err(ExoError::remote(format!("HTTP 404 for {}", url)));
        }
        Ok(url.as_bytes().to_vec())
    }
}
