//! Package store kept entirely in memory.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{
    PackageRecord, PackageStore, RecordMap, StoreError, apply_checker_enabled,
    apply_package_enabled, apply_settings, apply_upsert,
};

/// A [`PackageStore`] that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct InMemoryPackageStore {
    records: RwLock<RecordMap>,
}

impl InMemoryPackageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PackageStore for InMemoryPackageStore {
    async fn upsert_package(&self, record: PackageRecord) -> Result<PackageRecord, StoreError> {
        Ok(apply_upsert(&mut *self.records.write().await, record))
    }

    async fn package(&self, name: &str) -> Result<Option<PackageRecord>, StoreError> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn set_package_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError> {
        apply_package_enabled(&mut *self.records.write().await, name, enabled)
    }

    async fn set_checker_enabled(
        &self,
        package: &str,
        checker: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        apply_checker_enabled(&mut *self.records.write().await, package, checker, enabled)
    }

    async fn set_settings(
        &self,
        name: &str,
        settings: Map<String, Value>,
    ) -> Result<(), StoreError> {
        apply_settings(&mut *self.records.write().await, name, settings)
    }
}
