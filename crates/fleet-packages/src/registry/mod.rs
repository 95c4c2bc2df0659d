//! Package registry: discovery, loading and checker routing.
//!
//! The [`PackageRegistry`] owns every loaded package under one combined
//! namespace, so a name can be held by a single package regardless of
//! whether it is built in or external. Built-in packages run their checkers
//! in-process through the [`BuiltinCatalog`]; external packages are served
//! by a [`WorkerSupervisor`].
//!
//! The namespace sits behind a `std` lock that is only held to read or swap
//! entries, never across an `.await`. Routing clones the checker handle or
//! supervisor out of the map before calling it.

mod discovery;


use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::capability::{LicenseGate, describe_capabilities, requires_license};
use crate::checker::{BuiltinCatalog, Checker};
use crate::context::{PackageCheckerContext, PackageCheckerResult};
use crate::error::PackageError;
use crate::manifest::PackageManifest;
use crate::protocol::{INSTALL_TIMEOUT, REMOVE_TIMEOUT};
use crate::store::{PackageRecord, PackageStore};
use crate::worker::{
    WorkerEnd, WorkerLauncher, WorkerSettings, WorkerState, WorkerStats, WorkerSupervisor,
};

use self::discovery::{Candidate, package_dirs, read_candidate};

/// Tracing target for registry operations.
pub(crate) const REGISTRY_TARGET: &str = "fleet_packages::registry";

/// Where a package is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageOrigin {
    /// Shipped with the host; checkers run in-process.
    BuiltIn,
    /// Installed separately; checkers run in a worker subprocess.
    External,
}

impl PackageOrigin {
    /// Returns `true` for [`PackageOrigin::BuiltIn`].
    #[must_use]
    pub const fn is_built_in(self) -> bool {
        matches!(self, Self::BuiltIn)
    }

    /// Returns the origin as a log-friendly string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuiltIn => "built-in",
            Self::External => "external",
        }
    }
}

/// Construction-time settings for a [`PackageRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Directory holding one subdirectory per built-in package.
    pub builtin_root: PathBuf,
    /// Directory holding one subdirectory per external package.
    pub external_root: PathBuf,
    /// Host platform version compared against `minPlatformVersion`.
    pub platform_version: String,
    /// Settings applied to every worker the registry spawns.
    pub worker: WorkerSettings,
}

impl RegistryOptions {
    /// Creates options for the given roots with default worker settings and
    /// this crate's version as the platform version.
    #[must_use]
    pub fn new(builtin_root: impl Into<PathBuf>, external_root: impl Into<PathBuf>) -> Self {
        Self {
            builtin_root: builtin_root.into(),
            external_root: external_root.into(),
            platform_version: String::from(env!("CARGO_PKG_VERSION")),
            worker: WorkerSettings::default(),
        }
    }

    /// Overrides the host platform version.
    #[must_use]
    pub fn with_platform_version(mut self, version: impl Into<String>) -> Self {
        self.platform_version = version.into();
        self
    }

    /// Overrides the worker settings.
    #[must_use]
    pub fn with_worker_settings(mut self, settings: WorkerSettings) -> Self {
        self.worker = settings;
        self
    }

    fn root(&self, origin: PackageOrigin) -> &Path {
        match origin {
            PackageOrigin::BuiltIn => &self.builtin_root,
            PackageOrigin::External => &self.external_root,
        }
    }
}

/// Read-only view of one loaded package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageStatus {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Human-readable name.
    pub display_name: String,
    /// Whether the package ships with the host.
    pub built_in: bool,
    /// Whether the package can currently execute checkers.
    pub loaded: bool,
    /// Whether an administrator left the package enabled.
    pub enabled: bool,
    /// Number of checkers the package can run.
    pub checker_count: usize,
    /// When the package was loaded.
    pub loaded_at: OffsetDateTime,
    /// Worker statistics for external packages.
    pub worker: Option<WorkerStats>,
}

/// A package directory that failed to load during a scan.
#[derive(Debug)]
pub struct SkippedPackage {
    /// Directory that was skipped.
    pub path: PathBuf,
    /// Why it was skipped.
    pub error: PackageError,
}

/// Outcome of [`PackageRegistry::load_all`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names of the packages loaded, in load order.
    pub loaded: Vec<String>,
    /// Directories that were skipped.
    pub skipped: Vec<SkippedPackage>,
}

impl LoadReport {
    /// Returns `true` when nothing was skipped.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

enum Runtime {
    InProcess {
        manifest: PackageManifest,
        checkers: BTreeMap<String, Arc<dyn Checker>>,
    },
    External(WorkerSupervisor),
}

struct LoadedPackage {
    path: PathBuf,
    loaded_at: OffsetDateTime,
    runtime: Runtime,
}

impl LoadedPackage {
    fn manifest(&self) -> &PackageManifest {
        match &self.runtime {
            Runtime::InProcess { manifest, .. } => manifest,
            Runtime::External(supervisor) => supervisor.manifest(),
        }
    }

    const fn supervisor(&self) -> Option<&WorkerSupervisor> {
        match &self.runtime {
            Runtime::InProcess { .. } => None,
            Runtime::External(supervisor) => Some(supervisor),
        }
    }

    fn checker_names(&self) -> Vec<String> {
        match &self.runtime {
            Runtime::InProcess { checkers, .. } => checkers.keys().cloned().collect(),
            Runtime::External(supervisor) => supervisor
                .manifest()
                .checkers()
                .iter()
                .map(|checker| checker.name().to_owned())
                .collect(),
        }
    }

    /// A worker that has given up restarting no longer counts as loaded.
    fn is_listed(&self) -> bool {
        self.supervisor()
            .is_none_or(|supervisor| supervisor.state() != WorkerState::Stopped)
    }

    fn status(&self) -> PackageStatus {
        let manifest = self.manifest();
        let supervisor = self.supervisor();
        PackageStatus {
            name: manifest.name().to_owned(),
            version: manifest.version().to_owned(),
            display_name: manifest.display_name().to_owned(),
            built_in: supervisor.is_none(),
            loaded: supervisor.is_none_or(WorkerSupervisor::is_running),
            enabled: true,
            checker_count: self.checker_names().len(),
            loaded_at: self.loaded_at,
            worker: supervisor.map(WorkerSupervisor::stats),
        }
    }
}

#[derive(Default)]
struct Namespace {
    packages: BTreeMap<String, LoadedPackage>,
    /// Names reserved by a load or unload in progress.
    claimed: BTreeSet<String>,
}

impl Namespace {
    fn is_taken(&self, name: &str) -> bool {
        self.packages.contains_key(name) || self.claimed.contains(name)
    }
}

/// Reservation of a package name; released on drop.
struct Claim<'a> {
    namespace: &'a RwLock<Namespace>,
    name: String,
}

impl Claim<'_> {
    fn commit(self, package: LoadedPackage) {
        write_lock(self.namespace)
            .packages
            .insert(self.name.clone(), package);
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        write_lock(self.namespace).claimed.remove(&self.name);
    }
}

enum Route {
    InProcess(Arc<dyn Checker>),
    External(WorkerSupervisor),
}

/// Loads packages and routes checker execution to them.
///
/// Construct one per process and share it by reference; nothing here is
/// global.
pub struct PackageRegistry {
    options: RegistryOptions,
    catalog: BuiltinCatalog,
    store: Arc<dyn PackageStore>,
    license: Arc<dyn LicenseGate>,
    launcher: Arc<dyn WorkerLauncher>,
    namespace: Arc<RwLock<Namespace>>,
}

impl PackageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        options: RegistryOptions,
        catalog: BuiltinCatalog,
        store: Arc<dyn PackageStore>,
        license: Arc<dyn LicenseGate>,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Self {
        Self {
            options,
            catalog,
            store,
            license,
            launcher,
            namespace: Arc::new(RwLock::new(Namespace::default())),
        }
    }

    /// Returns the options the registry was built with.
    #[must_use]
    pub const fn options(&self) -> &RegistryOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Scans the built-in root, then the external root, loading every
    /// package directory found. A package that fails to load is logged and
    /// recorded in the report; it never stops the scan.
    pub async fn load_all(&self) -> LoadReport {
        let mut report = LoadReport::default();
        for origin in [PackageOrigin::BuiltIn, PackageOrigin::External] {
            let root = self.options.root(origin);
            let dirs = match package_dirs(root).await {
                Ok(dirs) => dirs,
                Err(error) => {
                    warn!(
                        target: REGISTRY_TARGET,
                        root = %root.display(),
                        %error,
                        "cannot scan package root"
                    );
                    continue;
                }
            };
            for dir in dirs {
                match self.load_dir(&dir, origin).await {
                    Ok(name) => report.loaded.push(name),
                    Err(error) => {
                        warn!(
                            target: REGISTRY_TARGET,
                            path = %dir.display(),
                            origin = origin.as_str(),
                            %error,
                            "skipping package"
                        );
                        report.skipped.push(SkippedPackage { path: dir, error });
                    }
                }
            }
        }
        info!(
            target: REGISTRY_TARGET,
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "package scan complete"
        );
        report
    }

    /// Loads the package in `dir` and returns its name.
    ///
    /// # Errors
    ///
    /// Returns the manifest, collision, platform or worker error that
    /// prevented loading, or [`PackageError::OperationTimeout`] when the
    /// install does not finish within [`INSTALL_TIMEOUT`].
    pub async fn load_package(
        &self,
        dir: &Path,
        origin: PackageOrigin,
    ) -> Result<String, PackageError> {
        timeout(INSTALL_TIMEOUT, self.load_dir(dir, origin))
            .await
            .map_err(|_| PackageError::OperationTimeout {
                operation: "install",
                name: dir.display().to_string(),
                timeout: INSTALL_TIMEOUT,
            })?
    }

    async fn load_dir(&self, dir: &Path, origin: PackageOrigin) -> Result<String, PackageError> {
        let Candidate {
            dir: path,
            manifest,
            manifest_hash,
        } = read_candidate(dir).await?;
        let name = manifest.name().to_owned();
        if let Some(required) = manifest.requires_newer_platform(&self.options.platform_version) {
            return Err(PackageError::IncompatiblePlatform {
                name,
                required: required.to_owned(),
                host: self.options.platform_version.clone(),
            });
        }
        self.review_capabilities(&manifest);

        let claim = self.claim(&name)?;
        let record = PackageRecord::from_manifest(
            &manifest,
            origin.is_built_in(),
            manifest_hash,
            OffsetDateTime::now_utc(),
        );
        let loaded_at = record.updated_at;
        let (runtime, worker) = match origin {
            PackageOrigin::BuiltIn => (
                Runtime::InProcess {
                    checkers: self.resolve_builtin(&manifest),
                    manifest,
                },
                None,
            ),
            PackageOrigin::External => {
                let supervisor = WorkerSupervisor::spawn(
                    manifest,
                    path.clone(),
                    self.options.worker.clone(),
                    Arc::clone(&self.launcher),
                )
                .await?;
                (Runtime::External(supervisor.clone()), Some(supervisor))
            }
        };
        self.persist(record).await;
        claim.commit(LoadedPackage {
            path,
            loaded_at,
            runtime,
        });
        if let Some(supervisor) = worker {
            self.forget_when_failed(supervisor);
        }
        info!(
            target: REGISTRY_TARGET,
            package = %name,
            origin = origin.as_str(),
            "package loaded"
        );
        Ok(name)
    }

    /// Removes the package once its worker has crashed for the last time,
    /// unless another load replaced it in the meantime.
    fn forget_when_failed(&self, supervisor: WorkerSupervisor) {
        let namespace = Arc::clone(&self.namespace);
        tokio::spawn(async move {
            if supervisor.ended().await != WorkerEnd::Failed {
                return;
            }
            let mut guard = write_lock(&namespace);
            let current = guard
                .packages
                .get(supervisor.name())
                .and_then(LoadedPackage::supervisor)
                .is_some_and(|loaded| loaded.same_worker(&supervisor));
            if current {
                guard.packages.remove(supervisor.name());
            }
            drop(guard);
            if current {
                warn!(
                    target: REGISTRY_TARGET,
                    package = supervisor.name(),
                    "worker will not be restarted, package removed"
                );
            }
        });
    }

    fn claim(&self, name: &str) -> Result<Claim<'_>, PackageError> {
        let mut namespace = self.namespace_mut();
        if namespace.is_taken(name) {
            return Err(PackageError::AlreadyLoaded {
                name: name.to_owned(),
            });
        }
        namespace.claimed.insert(name.to_owned());
        Ok(Claim {
            namespace: &self.namespace,
            name: name.to_owned(),
        })
    }

    fn review_capabilities(&self, manifest: &PackageManifest) {
        let review = describe_capabilities(manifest.capabilities());
        for line in review.lines() {
            debug!(target: REGISTRY_TARGET, package = manifest.name(), capability = %line, "capability requested");
        }
        for warning in review.warnings() {
            warn!(target: REGISTRY_TARGET, package = manifest.name(), %warning, "capability review");
        }
    }

    fn resolve_builtin(&self, manifest: &PackageManifest) -> BTreeMap<String, Arc<dyn Checker>> {
        manifest
            .checkers()
            .iter()
            .filter_map(|definition| {
                let Some(checker) = self.catalog.resolve(manifest.name(), definition.file()) else {
                    warn!(
                        target: REGISTRY_TARGET,
                        package = manifest.name(),
                        checker = definition.name(),
                        file = definition.file(),
                        "no built-in implementation registered, skipping checker"
                    );
                    return None;
                };
                Some((definition.name().to_owned(), checker))
            })
            .collect()
    }

    async fn persist(&self, record: PackageRecord) {
        let name = record.name.clone();
        if let Err(error) = self.store.upsert_package(record).await {
            warn!(
                target: REGISTRY_TARGET,
                package = %name,
                %error,
                "failed to persist package metadata"
            );
        }
    }

    /// Removes a loaded package, shutting its worker down first.
    ///
    /// The name stays reserved until the worker has exited.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::PackageNotFound`] for an unknown name or
    /// [`PackageError::OperationTimeout`] when removal exceeds
    /// [`REMOVE_TIMEOUT`].
    pub async fn unload_package(&self, name: &str) -> Result<(), PackageError> {
        let (removed, claim) = {
            let mut namespace = self.namespace_mut();
            let removed = namespace
                .packages
                .remove(name)
                .ok_or_else(|| PackageError::PackageNotFound {
                    name: name.to_owned(),
                })?;
            namespace.claimed.insert(name.to_owned());
            (
                removed,
                Claim {
                    namespace: &self.namespace,
                    name: name.to_owned(),
                },
            )
        };
        if let Runtime::External(supervisor) = removed.runtime {
            timeout(REMOVE_TIMEOUT, supervisor.shutdown())
                .await
                .map_err(|_| PackageError::OperationTimeout {
                    operation: "removal",
                    name: name.to_owned(),
                    timeout: REMOVE_TIMEOUT,
                })?;
        }
        drop(claim);
        info!(
            target: REGISTRY_TARGET,
            package = name,
            path = %removed.path.display(),
            "package unloaded"
        );
        Ok(())
    }

    /// Shuts every worker down, forgets every package and scans again.
    ///
    /// Shutdown completes before any name is registered again.
    pub async fn reload(&self) -> LoadReport {
        info!(target: REGISTRY_TARGET, "reloading packages");
        self.shutdown().await;
        self.namespace_mut().packages.clear();
        self.load_all().await
    }

    /// Shuts all external workers down concurrently and removes them.
    ///
    /// Each worker finishes independently; one slow or failing worker does
    /// not hold back the others.
    pub async fn shutdown(&self) {
        let external = {
            let mut namespace = self.namespace_mut();
            let (external, in_process): (BTreeMap<_, _>, BTreeMap<_, _>) =
                std::mem::take(&mut namespace.packages)
                    .into_iter()
                    .partition(|(_, package)| package.supervisor().is_some());
            namespace.packages = in_process;
            external
        };

        let mut tasks = JoinSet::new();
        for (name, package) in external {
            if let Runtime::External(supervisor) = package.runtime {
                tasks.spawn(async move {
                    supervisor.shutdown().await;
                    name
                });
            }
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(name) => debug!(target: REGISTRY_TARGET, package = %name, "worker shut down"),
                Err(error) => warn!(target: REGISTRY_TARGET, %error, "worker shutdown task failed"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Runs one checker of one package.
    ///
    /// Commercial external packages without a valid license, disabled
    /// packages and disabled checkers yield no results rather than an error.
    /// Persisted package settings are read on every call and laid over the
    /// context's settings.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::PackageNotFound`] or
    /// [`PackageError::CheckerNotFound`] for unknown names, and the
    /// checker, worker or store error raised while running it.
    pub async fn execute_checker(
        &self,
        package: &str,
        checker: &str,
        context: &PackageCheckerContext,
    ) -> Result<Vec<PackageCheckerResult>, PackageError> {
        let route = self.route(package, checker)?;
        if let Route::External(supervisor) = &route {
            if requires_license(supervisor.manifest(), false) {
                let verdict = self.license.validate(package).await;
                if !verdict.is_valid() {
                    info!(
                        target: REGISTRY_TARGET,
                        package,
                        checker,
                        reason = verdict.reason().unwrap_or("unspecified"),
                        "license check failed, skipping checker"
                    );
                    return Ok(Vec::new());
                }
            }
        }

        let record = self.store.package(package).await?;
        if record
            .as_ref()
            .is_some_and(|record| !record.enabled || !record.checker_enabled(checker))
        {
            debug!(target: REGISTRY_TARGET, package, checker, "checker disabled");
            return Ok(Vec::new());
        }
        let effective = record.map_or_else(
            || context.clone(),
            |record| context.with_settings(&record.settings),
        );

        match route {
            Route::InProcess(implementation) => {
                implementation
                    .analyze(&effective)
                    .await
                    .map_err(|source| PackageError::Checker {
                        package: package.to_owned(),
                        checker: checker.to_owned(),
                        source,
                    })
            }
            Route::External(supervisor) => Ok(supervisor.analyze(&effective, Some(checker)).await?),
        }
    }

    /// Runs every checker of every package and concatenates the results.
    ///
    /// Failures are logged and leave the failing checker's results out.
    pub async fn run_all_checkers(&self, context: &PackageCheckerContext) -> Vec<PackageCheckerResult> {
        let plan: Vec<(String, Vec<String>)> = self
            .namespace()
            .packages
            .iter()
            .map(|(name, package)| (name.clone(), package.checker_names()))
            .collect();

        let mut results = Vec::new();
        for (package, checkers) in plan {
            for checker in checkers {
                match self.execute_checker(&package, &checker, context).await {
                    Ok(found) => results.extend(found),
                    Err(error) => warn!(
                        target: REGISTRY_TARGET,
                        package = %package,
                        checker = %checker,
                        %error,
                        "checker failed"
                    ),
                }
            }
        }
        results
    }

    fn route(&self, package: &str, checker: &str) -> Result<Route, PackageError> {
        let namespace = self.namespace();
        let loaded = namespace
            .packages
            .get(package)
            .ok_or_else(|| PackageError::PackageNotFound {
                name: package.to_owned(),
            })?;
        let not_found = || PackageError::CheckerNotFound {
            package: package.to_owned(),
            checker: checker.to_owned(),
        };
        match &loaded.runtime {
            Runtime::InProcess { checkers, .. } => checkers
                .get(checker)
                .cloned()
                .map(Route::InProcess)
                .ok_or_else(not_found),
            Runtime::External(supervisor) => {
                if supervisor.manifest().checker(checker).is_none() {
                    return Err(not_found());
                }
                Ok(Route::External(supervisor.clone()))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Persists new settings for a package and pushes them to its worker.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::PackageNotFound`] for an unknown package, the
    /// store error when persisting fails, or the worker error when a running
    /// worker rejects the new settings.
    pub async fn update_settings(
        &self,
        package: &str,
        settings: Map<String, Value>,
    ) -> Result<(), PackageError> {
        let supervisor = self.loaded(package, |loaded| loaded.supervisor().cloned())?;
        self.store.set_settings(package, settings.clone()).await?;
        if let Some(worker) = supervisor.filter(WorkerSupervisor::is_running) {
            worker.configure(&settings).await?;
        }
        info!(target: REGISTRY_TARGET, package, "settings updated");
        Ok(())
    }

    /// Enables or disables every checker of a package.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::PackageNotFound`] for an unknown package or
    /// the store error when persisting fails.
    pub async fn set_package_enabled(&self, package: &str, enabled: bool) -> Result<(), PackageError> {
        self.loaded(package, |_| ())?;
        self.store.set_package_enabled(package, enabled).await?;
        Ok(())
    }

    /// Enables or disables one checker.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::PackageNotFound`] or
    /// [`PackageError::CheckerNotFound`] for unknown names, or the store
    /// error when persisting fails.
    pub async fn set_checker_enabled(
        &self,
        package: &str,
        checker: &str,
        enabled: bool,
    ) -> Result<(), PackageError> {
        let declared = self.loaded(package, |loaded| loaded.manifest().checker(checker).is_some())?;
        if !declared {
            return Err(PackageError::CheckerNotFound {
                package: package.to_owned(),
                checker: checker.to_owned(),
            });
        }
        self.store
            .set_checker_enabled(package, checker, enabled)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Returns a status row per package, omitting external packages whose
    /// worker has stopped for good.
    pub async fn package_statuses(&self) -> Vec<PackageStatus> {
        let mut statuses: Vec<PackageStatus> = self
            .namespace()
            .packages
            .values()
            .filter(|package| package.is_listed())
            .map(LoadedPackage::status)
            .collect();
        for status in &mut statuses {
            match self.store.package(&status.name).await {
                Ok(Some(record)) => status.enabled = record.enabled,
                Ok(None) => {}
                Err(error) => {
                    debug!(target: REGISTRY_TARGET, package = %status.name, %error, "status without stored flags");
                }
            }
        }
        statuses
    }

    /// Returns the names of every loaded package, sorted.
    #[must_use]
    pub fn package_names(&self) -> Vec<String> {
        self.namespace().packages.keys().cloned().collect()
    }

    /// Returns `true` when a package of that name is loaded.
    #[must_use]
    pub fn contains(&self, package: &str) -> bool {
        self.namespace().packages.contains_key(package)
    }

    fn loaded<T>(
        &self,
        package: &str,
        inspect: impl FnOnce(&LoadedPackage) -> T,
    ) -> Result<T, PackageError> {
        self.namespace()
            .packages
            .get(package)
            .map(inspect)
            .ok_or_else(|| PackageError::PackageNotFound {
                name: package.to_owned(),
            })
    }

    fn namespace(&self) -> RwLockReadGuard<'_, Namespace> {
        self.namespace.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn namespace_mut(&self) -> RwLockWriteGuard<'_, Namespace> {
        write_lock(&self.namespace)
    }
}

impl fmt::Debug for PackageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageRegistry")
            .field("options", &self.options)
            .field("catalog", &self.catalog)
            .field("packages", &self.package_names())
            .finish_non_exhaustive()
    }
}

fn write_lock(namespace: &RwLock<Namespace>) -> RwLockWriteGuard<'_, Namespace> {
    namespace.write().unwrap_or_else(PoisonError::into_inner)
}
