//! Package manager: owns the package collections and install tasks.
//!
//! # Overview
//!
//! The manager holds the remote index snapshot (`remote_packages`), the
//! installed-package manifests (`local_packages`) and the list of live
//! install tasks. It decides which asset to install for a package given
//! version/SDK locks, creates and tracks install tasks, persists local
//! manifests to `<data-dir>/<id>.json` and reloads them across restarts.
//!
//! Transport, extraction and checksum collaborators are injected at
//! construction so the whole installation flow can run against mocks.
//!
//! # Example
//!
//! ```ignore
//! use pacm::config::{InstallOptions, ManagerOptions};
//! use pacm::manager::PackageManager;
//!
//! let manager = PackageManager::new(ManagerOptions::default());
//! manager.initialize()?;
//! manager.query_remote_packages()?;
//!
//! if let Some(task) = manager.install_package("surveillancemode", &InstallOptions::default())? {
//!     task.start()?;
//!     task.wait();
//! }
//! ```

mod select;

pub use select::select_installable_asset;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::archive::{supported_archive, ArchiveExtractor, DefaultExtractor};
use crate::config::{InstallOptions, ManagerOptions};
use crate::error::{PacmError, PacmResult};
use crate::fetch::{AssetDownloader, HttpAssetDownloader};
use crate::index::{HttpIndexClient, IndexClient};
use crate::monitor::InstallMonitor;
use crate::package::{
    Asset, InstallState, LocalPackage, PackagePair, PackageState, SharedLocalPackage,
    SharedRemotePackage,
};
use crate::signal::Signal;
use crate::task::{finalize_install, InstallTask};

/// Observable events of the package manager.
#[derive(Debug, Default)]
pub struct ManagerSignals {
    /// The remote index was fetched and parsed; carries the package count.
    pub remote_index_refreshed: Signal<usize>,
    /// A package was uninstalled.
    pub package_uninstalled: Signal<SharedLocalPackage>,
    /// An install task was created, before it is started.
    pub task_created: Signal<Arc<InstallTask>>,
    /// An install task completed, successfully or not.
    pub task_complete: Signal<Arc<InstallTask>>,
}

struct ManagerState {
    local_packages: HashMap<String, SharedLocalPackage>,
    remote_packages: HashMap<String, SharedRemotePackage>,
    tasks: Vec<Arc<InstallTask>>,
}

struct ManagerShared {
    options: ManagerOptions,
    index_client: Arc<dyn IndexClient>,
    downloader: Arc<dyn AssetDownloader>,
    extractor: Arc<dyn ArchiveExtractor>,
    state: Mutex<ManagerState>,
    signals: ManagerSignals,
}

/// Manages installing, updating and uninstalling packages.
pub struct PackageManager {
    shared: Arc<ManagerShared>,
}

impl PackageManager {
    /// Create a manager with the production HTTP client, downloader and
    /// extractor.
    pub fn new(options: ManagerOptions) -> Self {
        Self::with_collaborators(
            options,
            Arc::new(HttpIndexClient::new()),
            Arc::new(HttpAssetDownloader::new()),
            Arc::new(DefaultExtractor),
        )
    }

    /// Create a manager with injected collaborators.
    pub fn with_collaborators(
        options: ManagerOptions,
        index_client: Arc<dyn IndexClient>,
        downloader: Arc<dyn AssetDownloader>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                options,
                index_client,
                downloader,
                extractor,
                state: Mutex::new(ManagerState {
                    local_packages: HashMap::new(),
                    remote_packages: HashMap::new(),
                    tasks: Vec::new(),
                }),
                signals: ManagerSignals::default(),
            }),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.shared.options
    }

    pub fn signals(&self) -> &ManagerSignals {
        &self.shared.signals
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Create the directory tree and load all local package manifests.
    pub fn initialize(&self) -> PacmResult<()> {
        self.create_directories()?;
        self.load_local_packages()
    }

    /// True once any packages, local or remote, are known.
    pub fn initialized(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        !state.local_packages.is_empty() || !state.remote_packages.is_empty()
    }

    /// Cancel all tasks and clear both package collections.
    pub fn uninitialize(&self) {
        self.cancel_all_tasks();
        let mut state = self.shared.state.lock().unwrap();
        state.local_packages.clear();
        state.remote_packages.clear();
    }

    /// Create the temp, data and install directories if missing.
    pub fn create_directories(&self) -> PacmResult<()> {
        fs::create_dir_all(&self.shared.options.temp_dir)?;
        fs::create_dir_all(&self.shared.options.data_dir)?;
        fs::create_dir_all(&self.shared.options.install_dir)?;
        Ok(())
    }

    /// Query the server for the list of available packages and replace the
    /// remote collection with the response.
    ///
    /// # Errors
    ///
    /// Refused with [`PacmError::Busy`] while install tasks are active;
    /// transport and parse failures surface as [`PacmError::Index`].
    pub fn query_remote_packages(&self) -> PacmResult<()> {
        self.ensure_no_tasks("query remote packages")?;

        let url = self.shared.options.index_url();
        let auth = self.shared.options.http_auth();
        debug!(url = %url, "querying remote package index");

        let packages = self.shared.index_client.fetch_index(&url, &auth)?;
        let count = packages.len();

        {
            let mut state = self.shared.state.lock().unwrap();
            state.remote_packages.clear();
            for package in packages {
                state
                    .remote_packages
                    .insert(package.id().to_string(), Arc::new(package));
            }
        }

        info!(count, "remote package index refreshed");
        self.shared.signals.remote_index_refreshed.emit(&count);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Local manifest persistence
    // ------------------------------------------------------------------

    /// Reload every local package manifest from the data directory,
    /// clearing the in-memory collection first.
    ///
    /// # Errors
    ///
    /// Refused with [`PacmError::Busy`] while install tasks are active.
    pub fn load_local_packages(&self) -> PacmResult<()> {
        self.ensure_no_tasks("load local packages")?;
        self.shared.state.lock().unwrap().local_packages.clear();
        self.load_local_packages_from(&self.shared.options.data_dir)
    }

    /// Load local package manifests from a directory without clearing the
    /// collection. Unreadable or invalid files are logged and skipped.
    pub fn load_local_packages_from(&self, dir: &Path) -> PacmResult<()> {
        debug!(dir = %dir.display(), "loading local package manifests");
        if !dir.exists() {
            return Ok(());
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match Self::load_package_file(&path) {
                Ok(package) => {
                    debug!(package = %package.name(), "local package loaded");
                    self.shared
                        .state
                        .lock()
                        .unwrap()
                        .local_packages
                        .insert(package.id().to_string(), Arc::new(Mutex::new(package)));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot load local package");
                }
            }
        }
        Ok(())
    }

    fn load_package_file(path: &Path) -> PacmResult<LocalPackage> {
        let body = fs::read_to_string(path)?;
        let package: LocalPackage = serde_json::from_str(&body)?;
        if !package.valid() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: local package manifest is invalid",
                path.display()
            )));
        }
        Ok(package)
    }

    /// Persist every local package manifest.
    ///
    /// Returns false when any save failed; with `whiny` the first failure
    /// is returned instead.
    pub fn save_local_packages(&self, whiny: bool) -> PacmResult<bool> {
        let packages = self.local_packages();
        let mut res = true;
        for package in packages {
            if let Err(e) = self.save_local_package(&package) {
                error!(error = %e, "failed to save local package");
                res = false;
                if whiny {
                    return Err(e);
                }
            }
        }
        Ok(res)
    }

    /// Persist one local package manifest to `<data-dir>/<id>.json`.
    pub fn save_local_package(&self, package: &SharedLocalPackage) -> PacmResult<()> {
        ManagerShared::save_package(&self.shared.options.data_dir, package)
    }

    // ------------------------------------------------------------------
    // Installation
    // ------------------------------------------------------------------

    /// Create an install task for a package.
    ///
    /// The returned task has not been started. `Ok(None)` means the
    /// installed package is already up-to-date for the requested options.
    ///
    /// # Errors
    ///
    /// Fails when the remote package is missing or invalid, when options
    /// conflict with persisted locks, or when a task for the package is
    /// already running.
    pub fn install_package(
        &self,
        id: &str,
        options: &InstallOptions,
    ) -> PacmResult<Option<Arc<InstallTask>>> {
        debug!(package = %id, "install package");

        let pair = self.get_or_create_package_pair(id)?;
        let (Some(local), Some(remote)) = (&pair.local, &pair.remote) else {
            return Err(PacmError::InvalidPackage(format!(
                "{}: package pair is incomplete",
                id
            )));
        };

        let asset = {
            let local = local.lock().unwrap();
            match select_installable_asset(&local, remote, options) {
                Ok(asset) => asset,
                Err(e) if e.is_up_to_date() => {
                    info!(package = %id, "{}", e);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        };

        // Pin the selection so the task installs exactly this asset.
        let mut options = options.clone();
        options.version = Some(asset.version.clone());

        self.create_install_task(&pair, options).map(Some)
    }

    /// Create install tasks for several packages.
    ///
    /// With a monitor the tasks are added to it and must be started by the
    /// caller; without one each task is auto-started. Returns true when at
    /// least one task was created. Per-package failures are logged, or
    /// returned immediately when `whiny` is set.
    pub fn install_packages(
        &self,
        ids: &[String],
        options: &InstallOptions,
        monitor: Option<&InstallMonitor>,
        whiny: bool,
    ) -> PacmResult<bool> {
        let mut any = false;
        for id in ids {
            match self.install_package(id, options) {
                Ok(Some(task)) => {
                    match monitor {
                        Some(monitor) => monitor.add_task(&task)?,
                        None => task.start()?,
                    }
                    any = true;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(package = %id, error = %e, "installation failed");
                    if whiny {
                        return Err(e);
                    }
                }
            }
        }
        Ok(any)
    }

    /// Update a single installed package.
    ///
    /// Same as [`install_package`](Self::install_package), but fails when
    /// the package is not installed.
    pub fn update_package(
        &self,
        id: &str,
        options: &InstallOptions,
    ) -> PacmResult<Option<Arc<InstallTask>>> {
        if self.get_local_package(id).is_none() {
            return Err(PacmError::NotFound(format!(
                "cannot update {}: package is not installed",
                id
            )));
        }
        self.install_package(id, options)
    }

    /// Update several installed packages; ids that are not installed are
    /// skipped (or fail the batch when `whiny` is set).
    pub fn update_packages(
        &self,
        ids: &[String],
        options: &InstallOptions,
        monitor: Option<&InstallMonitor>,
        whiny: bool,
    ) -> PacmResult<bool> {
        let mut to_update = Vec::with_capacity(ids.len());
        for id in ids {
            if self.get_local_package(id).is_some() {
                to_update.push(id.clone());
            } else {
                let err = PacmError::NotFound(format!(
                    "cannot update {}: package is not installed",
                    id
                ));
                error!("{}", err);
                if whiny {
                    return Err(err);
                }
            }
        }
        self.install_packages(&to_update, options, monitor, whiny)
    }

    /// Update every installed package to its latest installable asset.
    pub fn update_all_packages(&self, whiny: bool) -> PacmResult<bool> {
        let ids: Vec<String> = {
            let state = self.shared.state.lock().unwrap();
            state.local_packages.keys().cloned().collect()
        };
        self.install_packages(&ids, &InstallOptions::default(), None, whiny)
    }

    /// Create an install task for a package pair.
    ///
    /// At most one task may exist per package id; the manager keeps the
    /// task in its list until completion and persists the local package
    /// when the task finishes.
    pub fn create_install_task(
        &self,
        pair: &PackagePair,
        options: InstallOptions,
    ) -> PacmResult<Arc<InstallTask>> {
        let (Some(local), Some(remote)) = (&pair.local, &pair.remote) else {
            return Err(PacmError::InvalidPackage(
                "an install task needs both a local and a remote package".to_string(),
            ));
        };
        let id = remote.id().to_string();
        info!(package = %id, "creating install task");

        let task = {
            let mut state = self.shared.state.lock().unwrap();
            if state.tasks.iter().any(|t| t.package_id() == id) {
                return Err(PacmError::Busy(format!("{} is already installing", id)));
            }

            let task = InstallTask::new(
                Arc::clone(local),
                Arc::clone(remote),
                options,
                self.shared.options.clone(),
                Arc::clone(&self.shared.downloader),
                Arc::clone(&self.shared.extractor),
            );

            let weak_shared = Arc::downgrade(&self.shared);
            let weak_task = Arc::downgrade(&task);
            task.signals().complete.connect_forever(move |_| {
                if let (Some(shared), Some(task)) = (weak_shared.upgrade(), weak_task.upgrade()) {
                    ManagerShared::on_task_complete(&shared, &task);
                }
            });

            state.tasks.push(Arc::clone(&task));
            task
        };

        self.shared.signals.task_created.emit(&task);
        Ok(task)
    }

    // ------------------------------------------------------------------
    // Uninstallation
    // ------------------------------------------------------------------

    /// Uninstall a package: delete its manifest files (best effort), the
    /// persisted manifest JSON, and the in-memory entry.
    ///
    /// # Errors
    ///
    /// Fails only when the package id is unknown; per-file deletion errors
    /// are logged and the uninstall still succeeds.
    pub fn uninstall_package(&self, id: &str) -> PacmResult<()> {
        info!(package = %id, "uninstalling package");

        let package = self
            .get_local_package(id)
            .ok_or_else(|| PacmError::NotFound(format!("{}: package is not installed", id)))?;

        {
            let mut local = package.lock().unwrap();

            for file_name in local.manifest().to_vec() {
                if let Ok(path) = local.installed_file_path(&file_name, false) {
                    debug!(path = %path.display(), "deleting installed file");
                    if path.exists() {
                        if let Err(e) = fs::remove_file(&path) {
                            error!(path = %path.display(), error = %e, "error deleting file");
                        }
                    }
                }
            }
            local.clear_manifest();

            let manifest_path = self
                .shared
                .options
                .data_dir
                .join(format!("{}.json", local.id()));
            debug!(path = %manifest_path.display(), "deleting package manifest");
            if manifest_path.exists() {
                if let Err(e) = fs::remove_file(&manifest_path) {
                    error!(path = %manifest_path.display(), error = %e, "error deleting manifest");
                }
            }

            local.set_state(PackageState::Uninstalled);
        }

        self.shared.signals.package_uninstalled.emit(&package);
        self.shared
            .state
            .lock()
            .unwrap()
            .local_packages
            .remove(id);
        Ok(())
    }

    /// Uninstall several packages. Returns false when any failed; with
    /// `whiny` the first failure is returned instead.
    pub fn uninstall_packages(&self, ids: &[String], whiny: bool) -> PacmResult<bool> {
        let mut res = true;
        for id in ids {
            if let Err(e) = self.uninstall_package(id) {
                error!(package = %id, error = %e, "uninstall failed");
                res = false;
                if whiny {
                    return Err(e);
                }
            }
        }
        Ok(res)
    }

    // ------------------------------------------------------------------
    // Deferred finalization
    // ------------------------------------------------------------------

    /// True when any package has an install waiting to be finalized, left
    /// over from a run where target files were in use.
    pub fn has_unfinalized_packages(&self) -> bool {
        self.local_packages().iter().any(|package| {
            let local = package.lock().unwrap();
            local.state() == PackageState::Installing
                && local.install_state() == InstallState::Finalizing
        })
    }

    /// Finalize pending installations synchronously and re-persist every
    /// processed package.
    pub fn finalize_installations(&self, whiny: bool) -> PacmResult<bool> {
        debug!("finalizing pending installations");

        let mut res = true;
        for package in self.local_packages() {
            let outcome = {
                let mut local = package.lock().unwrap();
                if local.state() == PackageState::Installing
                    && local.install_state() == InstallState::Finalizing
                {
                    info!(package = %local.name(), "finalizing deferred install");
                    finalize_install(&mut local, &self.shared.options.temp_dir)
                } else {
                    continue;
                }
            };

            if let Err(e) = &outcome {
                error!(error = %e, "finalize error");
                res = false;
            }
            if let Err(e) = self.save_local_package(&package) {
                error!(error = %e, "failed to save finalized package");
                res = false;
            }
            if whiny {
                outcome?;
            }
        }
        Ok(res)
    }

    // ------------------------------------------------------------------
    // Task helpers
    // ------------------------------------------------------------------

    /// The live install task for a package id, if any.
    pub fn get_install_task(&self, id: &str) -> Option<Arc<InstallTask>> {
        let state = self.shared.state.lock().unwrap();
        state.tasks.iter().find(|t| t.package_id() == id).cloned()
    }

    /// Snapshot of all live tasks.
    pub fn tasks(&self) -> Vec<Arc<InstallTask>> {
        self.shared.state.lock().unwrap().tasks.clone()
    }

    /// Cancel every live task and clear the task list.
    pub fn cancel_all_tasks(&self) {
        let tasks = {
            let mut state = self.shared.state.lock().unwrap();
            std::mem::take(&mut state.tasks)
        };
        for task in tasks {
            task.cancel();
        }
    }

    /// Block until every live task has completed.
    ///
    /// Tasks handed to a monitor must have been started, or this will not
    /// return.
    pub fn wait_for_tasks(&self) {
        loop {
            let task = self.shared.state.lock().unwrap().tasks.first().cloned();
            match task {
                Some(task) => task.wait(),
                None => break,
            }
        }
    }

    // ------------------------------------------------------------------
    // Package helpers
    // ------------------------------------------------------------------

    pub fn get_local_package(&self, id: &str) -> Option<SharedLocalPackage> {
        self.shared
            .state
            .lock()
            .unwrap()
            .local_packages
            .get(id)
            .cloned()
    }

    pub fn get_remote_package(&self, id: &str) -> Option<SharedRemotePackage> {
        self.shared
            .state
            .lock()
            .unwrap()
            .remote_packages
            .get(id)
            .cloned()
    }

    /// Snapshot of all local packages.
    pub fn local_packages(&self) -> Vec<SharedLocalPackage> {
        self.shared
            .state
            .lock()
            .unwrap()
            .local_packages
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of all remote packages.
    pub fn remote_packages(&self) -> Vec<SharedRemotePackage> {
        self.shared
            .state
            .lock()
            .unwrap()
            .remote_packages
            .values()
            .cloned()
            .collect()
    }

    /// All package pairs, including one-sided ones.
    pub fn get_package_pairs(&self) -> Vec<PackagePair> {
        let state = self.shared.state.lock().unwrap();

        let mut pairs: Vec<PackagePair> = state
            .local_packages
            .values()
            .map(|local| PackagePair::new(Some(Arc::clone(local)), None))
            .collect();

        for (id, remote) in &state.remote_packages {
            if let Some(pair) = pairs.iter_mut().find(|p| &p.id() == id) {
                pair.remote = Some(Arc::clone(remote));
            } else {
                pairs.push(PackagePair::new(None, Some(Arc::clone(remote))));
            }
        }
        pairs
    }

    /// Pairs with an installable update available. Every returned pair has
    /// both sides present.
    pub fn get_updatable_package_pairs(&self) -> Vec<PackagePair> {
        self.get_package_pairs()
            .into_iter()
            .filter(|pair| self.has_available_updates(pair))
            .collect()
    }

    /// The pair for a package id; either side may be absent.
    ///
    /// # Errors
    ///
    /// With `whiny`, fails when a present side is invalid.
    pub fn get_package_pair(&self, id: &str, whiny: bool) -> PacmResult<PackagePair> {
        let local = self.get_local_package(id);
        let remote = self.get_remote_package(id);

        if whiny {
            if let Some(local) = &local {
                if !local.lock().unwrap().valid() {
                    return Err(PacmError::InvalidPackage(format!(
                        "{}: the local package is invalid",
                        id
                    )));
                }
            }
            if let Some(remote) = &remote {
                if !remote.valid() {
                    return Err(PacmError::InvalidPackage(format!(
                        "{}: the remote package is invalid",
                        id
                    )));
                }
            }
        }

        Ok(PackagePair::new(local, remote))
    }

    /// The pair for a package id, creating the local record from the
    /// remote package when the package has never been installed.
    ///
    /// # Errors
    ///
    /// Fails when the remote package is unknown or has no usable assets.
    pub fn get_or_create_package_pair(&self, id: &str) -> PacmResult<PackagePair> {
        let mut state = self.shared.state.lock().unwrap();

        let remote = state.remote_packages.get(id).cloned().ok_or_else(|| {
            PacmError::NotFound(format!("{}: the remote package does not exist", id))
        })?;

        if remote.assets.is_empty() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: the remote package has no file assets",
                id
            )));
        }
        if !remote.latest_asset()?.valid() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: the remote package has invalid file assets",
                id
            )));
        }
        if !remote.valid() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: the remote package is invalid",
                id
            )));
        }

        let local = state
            .local_packages
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(LocalPackage::from_remote(&remote))))
            .clone();

        if !local.lock().unwrap().valid() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: the local package is invalid",
                id
            )));
        }

        Ok(PackagePair::new(Some(local), Some(remote)))
    }

    /// The version of an installed package.
    ///
    /// # Errors
    ///
    /// Fails when the package is unknown, invalid or not fully installed.
    pub fn installed_package_version(&self, id: &str) -> PacmResult<String> {
        let local = self
            .get_local_package(id)
            .ok_or_else(|| PacmError::NotFound(format!("{}: package is not installed", id)))?;
        let local = local.lock().unwrap();

        if !local.valid() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: the local package is invalid",
                id
            )));
        }
        if !local.is_installed() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: the package is not fully installed",
                id
            )));
        }
        Ok(local.version().to_string())
    }

    /// The best asset to install for a pair, honoring version and SDK
    /// locks. See [`select_installable_asset`] for the rules.
    pub fn get_latest_installable_asset(
        &self,
        pair: &PackagePair,
        options: &InstallOptions,
    ) -> PacmResult<Asset> {
        let (Some(local), Some(remote)) = (&pair.local, &pair.remote) else {
            return Err(PacmError::InvalidPackage(
                "must have a local and remote package to determine installable assets".to_string(),
            ));
        };
        let local = local.lock().unwrap();
        select_installable_asset(&local, remote, options)
    }

    /// True when the pair has an installable update.
    pub fn has_available_updates(&self, pair: &PackagePair) -> bool {
        self.get_latest_installable_asset(pair, &InstallOptions::default())
            .is_ok()
    }

    // ------------------------------------------------------------------
    // Cache helpers
    // ------------------------------------------------------------------

    /// Remove everything under the temp directory.
    pub fn clear_cache(&self) -> PacmResult<()> {
        let dir = &self.shared.options.temp_dir;
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
        Ok(())
    }

    /// Remove a package's cached archives and staging directory from the
    /// temp dir. Returns false when anything could not be removed.
    pub fn clear_package_cache(&self, package: &SharedLocalPackage) -> bool {
        let (id, archives) = {
            let local = package.lock().unwrap();
            let archives: Vec<String> = local
                .asset()
                .iter()
                .chain(local.pending_asset().iter())
                .map(|a| a.file_name.clone())
                .collect();
            (local.id().to_string(), archives)
        };

        let mut res = true;
        for file_name in archives {
            if !self.clear_cache_file(&file_name, false).unwrap_or(false) {
                res = false;
            }
        }

        let staging = self.shared.options.temp_dir.join(&id);
        if staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                error!(path = %staging.display(), error = %e, "failed to remove staging dir");
                res = false;
            }
        }
        res
    }

    /// Remove one file from the temp directory.
    pub fn clear_cache_file(&self, file_name: &str, whiny: bool) -> PacmResult<bool> {
        let path = self.cache_file_path(file_name);
        if !path.exists() {
            return Ok(true);
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to clear cache file");
                if whiny {
                    Err(e.into())
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// True when the asset's archive is present in the temp directory.
    pub fn has_cached_file(&self, asset: &Asset) -> bool {
        self.cache_file_path(&asset.file_name).exists()
    }

    /// True when the file name is a supported package archive.
    pub fn is_supported_file_type(&self, file_name: &str) -> bool {
        supported_archive(file_name)
    }

    /// Path a downloaded archive would occupy in the temp directory.
    pub fn cache_file_path(&self, file_name: &str) -> PathBuf {
        self.shared.options.temp_dir.join(file_name)
    }

    // ------------------------------------------------------------------

    fn ensure_no_tasks(&self, operation: &str) -> PacmResult<()> {
        let state = self.shared.state.lock().unwrap();
        if state.tasks.is_empty() {
            Ok(())
        } else {
            Err(PacmError::Busy(format!(
                "cannot {} while install tasks are active",
                operation
            )))
        }
    }
}

impl std::fmt::Debug for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().unwrap();
        f.debug_struct("PackageManager")
            .field("local_packages", &state.local_packages.len())
            .field("remote_packages", &state.remote_packages.len())
            .field("tasks", &state.tasks.len())
            .finish()
    }
}

impl ManagerShared {
    fn save_package(data_dir: &Path, package: &SharedLocalPackage) -> PacmResult<()> {
        let local = package.lock().unwrap();
        let path = data_dir.join(format!("{}.json", local.id()));
        debug!(package = %local.id(), path = %path.display(), "saving local package");

        let body = serde_json::to_string_pretty(&*local)?;
        fs::write(&path, body)?;
        Ok(())
    }

    /// Runs on the worker thread when an install task completes: persist
    /// the local package, announce completion and drop the task.
    fn on_task_complete(shared: &Arc<Self>, task: &Arc<InstallTask>) {
        debug!(package = %task.package_id(), state = %task.state(), "install task finished");

        if let Err(e) = Self::save_package(&shared.options.data_dir, &task.local()) {
            error!(package = %task.package_id(), error = %e, "failed to persist local package");
        }

        {
            let mut state = shared.state.lock().unwrap();
            state.tasks.retain(|t| !Arc::ptr_eq(t, task));
        }
        shared.signals.task_complete.emit(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageInfo;
    use crate::package::RemotePackage;

    fn manager_with_root(root: &Path) -> PackageManager {
        PackageManager::new(ManagerOptions::rooted(root))
    }

    #[test]
    fn test_load_local_packages_skips_invalid_files() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager_with_root(root.path());
        manager.create_directories().unwrap();

        let data_dir = &manager.options().data_dir;
        fs::write(
            data_dir.join("good.json"),
            r#"{ "id": "good", "name": "Good", "type": "plugin" }"#,
        )
        .unwrap();
        fs::write(data_dir.join("bad.json"), "{ not json").unwrap();
        fs::write(
            data_dir.join("invalid.json"),
            r#"{ "id": "", "name": "", "type": "" }"#,
        )
        .unwrap();
        fs::write(data_dir.join("notes.txt"), "ignored").unwrap();

        manager.load_local_packages().unwrap();
        assert_eq!(manager.local_packages().len(), 1);
        assert!(manager.get_local_package("good").is_some());
        assert!(manager.initialized());
    }

    #[test]
    fn test_uninstall_unknown_package_fails() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager_with_root(root.path());
        assert!(matches!(
            manager.uninstall_package("ghost"),
            Err(PacmError::NotFound(_))
        ));
    }

    #[test]
    fn test_install_unknown_remote_fails() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager_with_root(root.path());
        let result = manager.install_package("ghost", &InstallOptions::default());
        assert!(matches!(result, Err(PacmError::NotFound(_))));
    }

    #[test]
    fn test_pair_for_remote_without_assets_is_invalid() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager_with_root(root.path());

        let remote = RemotePackage {
            info: PackageInfo {
                id: "empty".to_string(),
                name: "Empty".to_string(),
                kind: "plugin".to_string(),
                ..PackageInfo::default()
            },
            ..RemotePackage::default()
        };
        manager
            .shared
            .state
            .lock()
            .unwrap()
            .remote_packages
            .insert("empty".to_string(), Arc::new(remote));

        let result = manager.get_or_create_package_pair("empty");
        assert!(matches!(result, Err(PacmError::InvalidPackage(_))));
        // No half-created local record is left behind.
        assert!(manager.get_local_package("empty").is_none());
    }

    #[test]
    fn test_cache_helpers() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager_with_root(root.path());
        manager.create_directories().unwrap();

        fs::write(manager.cache_file_path("pkg.zip"), b"zzz").unwrap();
        assert!(manager.clear_cache_file("pkg.zip", true).unwrap());
        assert!(!manager.cache_file_path("pkg.zip").exists());

        // Clearing a missing file succeeds quietly.
        assert!(manager.clear_cache_file("pkg.zip", true).unwrap());

        assert!(manager.is_supported_file_type("pkg.tar.gz"));
        assert!(!manager.is_supported_file_type("pkg.exe"));

        fs::write(manager.cache_file_path("stale.zip"), b"zzz").unwrap();
        manager.clear_cache().unwrap();
        assert!(manager.options().temp_dir.exists());
        assert!(!manager.cache_file_path("stale.zip").exists());
    }
}
