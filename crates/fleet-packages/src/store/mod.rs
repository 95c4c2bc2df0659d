//! Persistent package metadata.
//!
//! The registry records every package it loads so administrators can toggle
//! packages and checkers and edit settings. The records themselves live in
//! an external store; this module defines the [`PackageStore`] interface the
//! registry talks to, plus two implementations: [`InMemoryPackageStore`] for
//! tests and embedding, and [`JsonFileStore`] used by the daemon.
//!
//! Upserts overwrite manifest-derived metadata but never touch the
//! administrator-owned parts of a record: `settings`, the package `enabled`
//! flag and per-checker `enabled` flags survive every reload.

mod file;
mod memory;


use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

use crate::manifest::{DataNeed, LicenseKind, PackageManifest};

pub use self::file::JsonFileStore;
pub use self::memory::InMemoryPackageStore;

/// Errors raised by a [`PackageStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("package store I/O error at '{}': {source}", path.display())]
    Io {
        /// Path of the backing file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file does not hold a valid store document.
    #[error("package store at '{}' is corrupt: {source}", path.display())]
    Corrupt {
        /// Path of the backing file.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The store document could not be serialised.
    #[error("failed to serialise package store: {0}")]
    Serialize(#[source] serde_json::Error),

    /// No record exists for the package.
    #[error("no stored record for package '{name}'")]
    UnknownPackage {
        /// Package name.
        name: String,
    },

    /// The package record has no such checker.
    #[error("package '{package}' has no stored checker '{checker}'")]
    UnknownChecker {
        /// Package name.
        package: String,
        /// Checker name.
        checker: String,
    },

    /// A blocking store task was cancelled or panicked.
    #[error("package store task failed: {0}")]
    Task(String),
}

/// Stored state of one checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckerRecord {
    /// Checker name.
    pub name: String,
    /// Recommendation category tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether administrators left the checker enabled.
    pub enabled: bool,
    /// Context fields the checker consumes.
    #[serde(default)]
    pub data_needs: Vec<DataNeed>,
}

/// Stored state of one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    /// Package name.
    pub name: String,
    /// Package version last loaded.
    pub version: String,
    /// Human-readable name.
    pub display_name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Package author.
    pub author: String,
    /// Licensing model.
    pub license: LicenseKind,
    /// Whether the package ships with the host.
    pub built_in: bool,
    /// Whether administrators left the package enabled.
    pub enabled: bool,
    /// SHA-256 of the raw manifest text, lower-case hex.
    pub manifest_hash: String,
    /// Administrator-configured settings.
    #[serde(default)]
    pub settings: Map<String, Value>,
    /// Per-checker state.
    #[serde(default)]
    pub checkers: Vec<CheckerRecord>,
    /// First time the package was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub installed_at: OffsetDateTime,
    /// Last time the record changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl PackageRecord {
    /// Builds a fresh record for a package seen for the first time.
    ///
    /// Settings are seeded from the manifest's declared defaults and every
    /// checker starts enabled.
    #[must_use]
    pub fn from_manifest(
        manifest: &PackageManifest,
        built_in: bool,
        manifest_hash: impl Into<String>,
        now: OffsetDateTime,
    ) -> Self {
        let checkers = manifest
            .checkers()
            .iter()
            .map(|checker| CheckerRecord {
                name: checker.name().to_owned(),
                kind: checker.kind().to_owned(),
                enabled: true,
                data_needs: checker.data_needs().to_vec(),
            })
            .collect();
        Self {
            name: manifest.name().to_owned(),
            version: manifest.version().to_owned(),
            display_name: manifest.display_name().to_owned(),
            description: manifest.description().map(str::to_owned),
            author: manifest.author().to_owned(),
            license: manifest.license(),
            built_in,
            enabled: true,
            manifest_hash: manifest_hash.into(),
            settings: manifest.default_settings(),
            checkers,
            installed_at: now,
            updated_at: now,
        }
    }

    /// Returns this record with the administrator-owned state of `existing`.
    ///
    /// Settings, the package flag, checker flags (matched by name) and the
    /// install time carry over; checkers no longer declared are dropped and
    /// new ones start enabled.
    #[must_use]
    pub fn merged_with(mut self, existing: &Self) -> Self {
        self.settings = existing.settings.clone();
        self.enabled = existing.enabled;
        self.installed_at = existing.installed_at;
        for checker in &mut self.checkers {
            if let Some(previous) = existing.checkers.iter().find(|c| c.name == checker.name) {
                checker.enabled = previous.enabled;
            }
        }
        self
    }

    /// Returns whether `checker` is enabled. Checkers without a record
    /// count as enabled.
    #[must_use]
    pub fn checker_enabled(&self, checker: &str) -> bool {
        self.checkers
            .iter()
            .find(|record| record.name == checker)
            .is_none_or(|record| record.enabled)
    }
}

/// Persistent storage for package metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Inserts or refreshes a package record and returns what was stored.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing storage fails.
    async fn upsert_package(&self, record: PackageRecord) -> Result<PackageRecord, StoreError>;

    /// Returns the record for `name`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing storage fails.
    async fn package(&self, name: &str) -> Result<Option<PackageRecord>, StoreError>;

    /// Enables or disables a whole package.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownPackage`] when no record exists.
    async fn set_package_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError>;

    /// Enables or disables one checker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownPackage`] or
    /// [`StoreError::UnknownChecker`] when no matching record exists.
    async fn set_checker_enabled(
        &self,
        package: &str,
        checker: &str,
        enabled: bool,
    ) -> Result<(), StoreError>;

    /// Replaces the settings of a package.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownPackage`] when no record exists.
    async fn set_settings(&self, name: &str, settings: Map<String, Value>)
    -> Result<(), StoreError>;
}

/// Map of package name to record shared by both implementations.
pub(crate) type RecordMap = BTreeMap<String, PackageRecord>;

pub(crate) fn apply_upsert(records: &mut RecordMap, record: PackageRecord) -> PackageRecord {
    let stored = match records.get(&record.name) {
        Some(existing) => record.merged_with(existing),
        None => record,
    };
    records.insert(stored.name.clone(), stored.clone());
    stored
}

fn record_mut<'a>(records: &'a mut RecordMap, name: &str) -> Result<&'a mut PackageRecord, StoreError> {
    records.get_mut(name).ok_or_else(|| StoreError::UnknownPackage {
        name: name.to_owned(),
    })
}

pub(crate) fn apply_package_enabled(
    records: &mut RecordMap,
    name: &str,
    enabled: bool,
) -> Result<(), StoreError> {
    let record = record_mut(records, name)?;
    record.enabled = enabled;
    record.updated_at = OffsetDateTime::now_utc();
    Ok(())
}

pub(crate) fn apply_checker_enabled(
    records: &mut RecordMap,
    package: &str,
    checker: &str,
    enabled: bool,
) -> Result<(), StoreError> {
    let record = record_mut(records, package)?;
    let entry = record
        .checkers
        .iter_mut()
        .find(|c| c.name == checker)
        .ok_or_else(|| StoreError::UnknownChecker {
            package: package.to_owned(),
            checker: checker.to_owned(),
        })?;
    entry.enabled = enabled;
    record.updated_at = OffsetDateTime::now_utc();
    Ok(())
}

pub(crate) fn apply_settings(
    records: &mut RecordMap,
    name: &str,
    settings: Map<String, Value>,
) -> Result<(), StoreError> {
    let record = record_mut(records, name)?;
    record.settings = settings;
    record.updated_at = OffsetDateTime::now_utc();
    Ok(())
}
