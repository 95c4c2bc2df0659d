//! Package store persisted as a single JSON document.
//!
//! Every mutation re-reads the document, applies the change and writes the
//! result to a temporary file in the same directory before renaming it over
//! the original, so readers never observe a half-written store.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task;

use super::{
    PackageRecord, PackageStore, RecordMap, StoreError, apply_checker_enabled,
    apply_package_enabled, apply_settings, apply_upsert,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    packages: RecordMap,
}

/// A [`PackageStore`] backed by a JSON file on disk.
///
/// A missing file reads as an empty store and is created on first write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store persisted at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<RecordMap, StoreError> {
        let path = self.path.clone();
        task::spawn_blocking(move || read_document(&path).map(|document| document.packages))
            .await
            .map_err(|error| StoreError::Task(error.to_string()))?
    }

    async fn mutate<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut RecordMap) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut document = read_document(&path)?;
            let outcome = change(&mut document.packages)?;
            write_document(&path, &document)?;
            Ok(outcome)
        })
        .await
        .map_err(|error| StoreError::Task(error.to_string()))?
    }
}

fn read_document(path: &Path) -> Result<StoreDocument, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(StoreDocument::default());
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if text.trim().is_empty() {
        return Ok(StoreDocument::default());
    }
    serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn write_document(path: &Path, document: &StoreDocument) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(directory).map_err(io_error)?;

    let bytes = serde_json::to_vec_pretty(document).map_err(StoreError::Serialize)?;
    let mut temp = NamedTempFile::new_in(directory).map_err(io_error)?;
    temp.write_all(&bytes).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|error| io_error(error.error))?;
    Ok(())
}

#[async_trait]
impl PackageStore for JsonFileStore {
    async fn upsert_package(&self, record: PackageRecord) -> Result<PackageRecord, StoreError> {
        self.mutate(move |records| Ok(apply_upsert(records, record)))
            .await
    }

    async fn package(&self, name: &str) -> Result<Option<PackageRecord>, StoreError> {
        Ok(self.read().await?.remove(name))
    }

    async fn set_package_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError> {
        let name = name.to_owned();
        self.mutate(move |records| apply_package_enabled(records, &name, enabled))
            .await
    }

    async fn set_checker_enabled(
        &self,
        package: &str,
        checker: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        let package = package.to_owned();
        let checker = checker.to_owned();
        self.mutate(move |records| apply_checker_enabled(records, &package, &checker, enabled))
            .await
    }

    async fn set_settings(
        &self,
        name: &str,
        settings: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let name = name.to_owned();
        self.mutate(move |records| apply_settings(records, &name, settings))
            .await
    }
}
