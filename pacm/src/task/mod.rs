//! Package install task.
//!
//! One task installs one package: it downloads the selected asset archive,
//! verifies its checksum, extracts it into a staging directory and finally
//! moves the staged files into the install directory, recording every file
//! into the package's local manifest.
//!
//! # State machine
//!
//! ```text
//! None → Downloading → Extracting → Finalizing → Installed
//!   └────────┴────────────┴─────────────┴──→ Cancelled | Failed
//! ```
//!
//! Progress is 0-100 and monotonic: the download maps to 0-50, extraction
//! ends at 90 and finalization completes at 100. `Complete` fires exactly
//! once, after the terminal state is reached, for success, failure and
//! cancellation alike.
//!
//! A finalize move that fails because the target file is held open by
//! another process does not fail the install: the package is left in
//! `Installing`/`Finalizing` and picked up by
//! `PackageManager::finalize_installations` on the next startup.

mod finalize;

pub(crate) use finalize::finalize_install;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::archive::ArchiveExtractor;
use crate::config::{InstallOptions, ManagerOptions};
use crate::error::{PacmError, PacmResult};
use crate::fetch::{hash_file, AssetDownloader, CancelFlag};
use crate::manager::select_installable_asset;
use crate::package::{
    Asset, InstallState, PackageState, SharedLocalPackage, SharedRemotePackage,
};
use crate::signal::Signal;

/// A state transition, old to new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub new: InstallState,
    pub old: InstallState,
}

/// Observable events of an install task.
#[derive(Debug, Default)]
pub struct TaskSignals {
    /// Overall progress, 0-100, non-decreasing.
    pub progress: Signal<u8>,
    /// Every state transition, in transition order.
    pub state_change: Signal<StateChange>,
    /// Fired exactly once when the task reaches a terminal state.
    pub complete: Signal<()>,
}

/// Installs a single package asset.
pub struct InstallTask {
    local: SharedLocalPackage,
    remote: SharedRemotePackage,
    options: InstallOptions,
    manager_options: ManagerOptions,
    downloader: Arc<dyn AssetDownloader>,
    extractor: Arc<dyn ArchiveExtractor>,

    state: Mutex<InstallState>,
    /// The asset being installed, resolved when the task runs.
    asset: Mutex<Option<Asset>>,
    progress: AtomicU8,
    cancel: CancelFlag,
    started: AtomicBool,
    done: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    signals: TaskSignals,
}

impl InstallTask {
    /// Create a task for the given package pair. The task does not run
    /// until [`start`](Self::start) is called.
    pub fn new(
        local: SharedLocalPackage,
        remote: SharedRemotePackage,
        options: InstallOptions,
        manager_options: ManagerOptions,
        downloader: Arc<dyn AssetDownloader>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            remote,
            options,
            manager_options,
            downloader,
            extractor,
            state: Mutex::new(InstallState::None),
            asset: Mutex::new(None),
            progress: AtomicU8::new(0),
            cancel: CancelFlag::new(),
            started: AtomicBool::new(false),
            done: AtomicBool::new(false),
            worker: Mutex::new(None),
            signals: TaskSignals::default(),
        })
    }

    /// The package id this task installs.
    pub fn package_id(&self) -> String {
        self.remote.id().to_string()
    }

    pub fn local(&self) -> SharedLocalPackage {
        Arc::clone(&self.local)
    }

    pub fn remote(&self) -> SharedRemotePackage {
        Arc::clone(&self.remote)
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    pub fn signals(&self) -> &TaskSignals {
        &self.signals
    }

    /// The asset being installed, once resolved.
    pub fn remote_asset(&self) -> Option<Asset> {
        self.asset.lock().unwrap().clone()
    }

    pub fn state(&self) -> InstallState {
        *self.state.lock().unwrap()
    }

    /// Current progress, 0-100.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    /// Both sides of the pair are present and valid.
    pub fn valid(&self) -> bool {
        self.local.lock().unwrap().valid() && self.remote.valid()
    }

    pub fn cancelled(&self) -> bool {
        self.state() == InstallState::Cancelled
    }

    pub fn failed(&self) -> bool {
        self.state() == InstallState::Failed
    }

    pub fn success(&self) -> bool {
        self.state() == InstallState::Installed
    }

    /// The task has reached a terminal state and emitted `Complete`.
    pub fn complete(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Start the installation on a worker thread.
    ///
    /// # Errors
    ///
    /// Fails if the task was already started or cancelled.
    pub fn start(self: &Arc<Self>) -> PacmResult<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PacmError::Busy(format!(
                "{}: install task already started",
                self.package_id()
            )));
        }

        let task = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("pacm-install-{}", self.package_id()))
            .spawn(move || task.run())?;
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Cancel the installation.
    ///
    /// Idempotent and callable from any thread. A running task reaches
    /// `Cancelled` at its next checkpoint; a task that never started
    /// completes as `Cancelled` immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();

        // Never started: complete as cancelled right here.
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.transition(InstallState::Cancelled);
            self.set_complete();
        }
    }

    /// Block until the task has completed.
    pub fn wait(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        while !self.complete() {
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn run(self: &Arc<Self>) {
        info!(package = %self.package_id(), "installing package");

        match self.run_steps() {
            Ok(()) => {
                info!(package = %self.package_id(), "package installed");
            }
            Err(PacmError::Cancelled) => {
                info!(package = %self.package_id(), "installation cancelled");
                self.transition(InstallState::Cancelled);
            }
            Err(PacmError::FinalizeBusy(path)) => {
                warn!(
                    package = %self.package_id(),
                    path = %path.display(),
                    "finalize target in use; deferring until next startup"
                );
                // The package stays Installing/Finalizing on purpose.
            }
            Err(err) => {
                error!(package = %self.package_id(), error = %err, "installation failed");
                {
                    let mut local = self.local.lock().unwrap();
                    local.add_error(err.to_string());
                    local.set_state(PackageState::Failed);
                }
                self.transition(InstallState::Failed);

                if self.manager_options.clear_failed_cache {
                    self.clear_cached_archive();
                }
            }
        }

        self.set_complete();
    }

    fn run_steps(self: &Arc<Self>) -> PacmResult<()> {
        let asset = self.resolve_asset()?;
        self.checkpoint()?;

        let archive = self.do_download(&asset)?;
        self.checkpoint()?;

        self.do_extract(&asset, &archive)?;
        self.checkpoint()?;

        self.do_finalize()
    }

    /// Resolve the asset to install.
    ///
    /// When the manager pre-selected a version it is pinned in the options;
    /// otherwise the full selection algorithm runs against current state.
    fn resolve_asset(&self) -> PacmResult<Asset> {
        let asset = match self.options.version.as_deref() {
            Some(version) => self.remote.asset_version(version)?.clone(),
            None => {
                let local = self.local.lock().unwrap();
                select_installable_asset(&local, &self.remote, &self.options)?
            }
        };
        if !asset.valid() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: selected asset is invalid",
                self.package_id()
            )));
        }
        *self.asset.lock().unwrap() = Some(asset.clone());
        Ok(asset)
    }

    /// Download the asset archive into the temp directory and verify its
    /// checksum. A cached archive that still matches its checksum is
    /// reused without re-downloading.
    fn do_download(self: &Arc<Self>, asset: &Asset) -> PacmResult<PathBuf> {
        self.transition(InstallState::Downloading);

        let archive = self.manager_options.temp_dir.join(&asset.file_name);
        fs::create_dir_all(&self.manager_options.temp_dir)?;

        let algorithm = self.manager_options.checksum_algorithm;
        if archive.exists() && !asset.checksum.is_empty() {
            if let Ok(computed) = hash_file(algorithm, &archive) {
                if computed.eq_ignore_ascii_case(&asset.checksum) {
                    debug!(package = %self.package_id(), "using cached archive");
                    self.set_progress(50);
                    return Ok(archive);
                }
            }
        }

        let url = asset.url(0).ok_or_else(|| {
            PacmError::InvalidPackage(format!("{}: asset has no mirrors", self.package_id()))
        })?;

        let task = Arc::clone(self);
        self.downloader.download(
            url,
            &archive,
            &self.cancel,
            Box::new(move |downloaded, total| {
                if total > 0 {
                    let pct = ((downloaded.min(total) * 50) / total) as u8;
                    task.set_progress(pct);
                }
            }),
        )?;

        if !asset.checksum.is_empty() {
            let computed = hash_file(algorithm, &archive)?;
            if !computed.eq_ignore_ascii_case(&asset.checksum) {
                return Err(PacmError::ChecksumMismatch {
                    file_name: asset.file_name.clone(),
                    expected: asset.checksum.clone(),
                    actual: computed,
                });
            }
        }

        self.set_progress(50);
        Ok(archive)
    }

    /// Expand the archive into the staging directory and record every
    /// extracted file in the local manifest.
    fn do_extract(&self, asset: &Asset, archive: &Path) -> PacmResult<()> {
        self.transition(InstallState::Extracting);

        let staging = self
            .manager_options
            .temp_dir
            .join(self.local.lock().unwrap().id());
        if staging.exists() {
            let _ = fs::remove_dir_all(&staging);
        }

        let files = self.extractor.extract(archive, &staging)?;

        let mut local = self.local.lock().unwrap();
        if !local.is_installed() {
            // Entries from a failed earlier attempt would poison
            // verification; an update keeps its history instead.
            local.clear_manifest();
        }
        for file in &files {
            local.add_manifest_file(file.to_string_lossy().into_owned());
        }
        local.set_pending_asset(Some(asset.clone()));
        drop(local);

        self.set_progress(90);
        Ok(())
    }

    /// Move staged files into the install directory and seal the manifest.
    fn do_finalize(&self) -> PacmResult<()> {
        self.transition(InstallState::Finalizing);

        let install_dir = self
            .options
            .install_dir
            .clone()
            .unwrap_or_else(|| self.manager_options.install_dir.clone());
        fs::create_dir_all(&install_dir)?;
        let install_dir = std::path::absolute(&install_dir)?;

        {
            let mut local = self.local.lock().unwrap();
            local.set_install_dir(install_dir.to_string_lossy().into_owned());
            finalize_install(&mut local, &self.manager_options.temp_dir)?;
        }

        self.set_progress(100);
        self.transition(InstallState::Installed);
        Ok(())
    }

    fn checkpoint(&self) -> PacmResult<()> {
        if self.cancel.is_cancelled() {
            Err(PacmError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Remove the downloaded archive after a failure so a retry starts
    /// from a fresh download.
    fn clear_cached_archive(&self) {
        if let Some(asset) = self.remote_asset() {
            let archive = self.manager_options.temp_dir.join(&asset.file_name);
            if archive.exists() {
                if let Err(e) = fs::remove_file(&archive) {
                    warn!(path = %archive.display(), error = %e, "failed to remove cached archive");
                }
            }
        }
    }

    /// Single transition entry point; mirrors the new state into the local
    /// package and emits `StateChange`.
    fn transition(&self, new: InstallState) {
        let old = {
            let mut state = self.state.lock().unwrap();
            let old = *state;
            if old == new {
                return;
            }
            debug_assert!(
                transition_is_legal(old, new),
                "illegal install state transition {} -> {}",
                old,
                new
            );
            *state = new;
            old
        };

        debug!(package = %self.package_id(), from = %old, to = %new, "state change");
        self.local.lock().unwrap().set_install_state(new);
        self.signals.state_change.emit(&StateChange { new, old });
    }

    /// Raise progress to `value`, never lowering it.
    fn set_progress(&self, value: u8) {
        let value = value.min(100);
        let previous = self.progress.fetch_max(value, Ordering::SeqCst);
        if value > previous {
            self.signals.progress.emit(&value);
        }
    }

    /// The single funnel for reaching a terminal state; emits `Complete`
    /// exactly once. The task is unusable afterwards.
    fn set_complete(&self) {
        if self
            .done
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!(package = %self.package_id(), state = %self.state(), "install task complete");
            self.signals.complete.emit(&());
        }
    }
}

impl std::fmt::Debug for InstallTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallTask")
            .field("package", &self.package_id())
            .field("state", &self.state())
            .field("progress", &self.progress())
            .finish()
    }
}

/// Legal transitions of the install state machine. Staying in place is
/// allowed; leaving a terminal state is not.
fn transition_is_legal(old: InstallState, new: InstallState) -> bool {
    use InstallState::*;

    if old == new {
        return true;
    }
    if old.is_terminal() {
        return false;
    }
    matches!(
        (old, new),
        (None, Downloading)
            | (Downloading, Extracting)
            | (Extracting, Finalizing)
            | (Finalizing, Installed)
            | (_, Cancelled)
            | (_, Failed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveExtractor, ExtractResult};
    use crate::fetch::{FetchResult, ProgressCallback};
    use crate::package::{LocalPackage, Mirror, PackageInfo, RemotePackage};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    struct PanicDownloader;

    impl AssetDownloader for PanicDownloader {
        fn download(
            &self,
            _url: &str,
            _dest: &Path,
            _cancel: &CancelFlag,
            _on_progress: ProgressCallback,
        ) -> FetchResult<u64> {
            panic!("download must not run");
        }
    }

    struct PanicExtractor;

    impl ArchiveExtractor for PanicExtractor {
        fn extract(&self, _archive: &Path, _dest: &Path) -> ExtractResult<Vec<PathBuf>> {
            panic!("extract must not run");
        }
    }

    fn test_task() -> Arc<InstallTask> {
        let remote = Arc::new(RemotePackage {
            info: PackageInfo {
                id: "pkg".to_string(),
                name: "Package".to_string(),
                kind: "plugin".to_string(),
                ..PackageInfo::default()
            },
            assets: vec![Asset {
                file_name: "pkg-1.0.0.zip".to_string(),
                version: "1.0.0".to_string(),
                mirrors: vec![Mirror::new("http://m/pkg-1.0.0.zip")],
                ..Asset::default()
            }],
            ..RemotePackage::default()
        });
        let local = Arc::new(Mutex::new(LocalPackage::from_remote(&remote)));

        InstallTask::new(
            local,
            remote,
            InstallOptions::default(),
            ManagerOptions::default(),
            Arc::new(PanicDownloader),
            Arc::new(PanicExtractor),
        )
    }

    #[test]
    fn test_transition_legality() {
        use InstallState::*;
        assert!(transition_is_legal(None, Downloading));
        assert!(transition_is_legal(Downloading, Extracting));
        assert!(transition_is_legal(Extracting, Finalizing));
        assert!(transition_is_legal(Finalizing, Installed));
        assert!(transition_is_legal(None, Cancelled));
        assert!(transition_is_legal(Downloading, Failed));
        assert!(!transition_is_legal(Installed, Downloading));
        assert!(!transition_is_legal(Cancelled, Downloading));
        assert!(!transition_is_legal(Downloading, Finalizing));
    }

    #[test]
    fn test_cancel_before_start_completes_immediately() {
        let task = test_task();
        let completions = Arc::new(AtomicUsize::new(0));
        let completions_clone = Arc::clone(&completions);
        let _sub = task.signals().complete.connect(move |_| {
            completions_clone.fetch_add(1, Ordering::SeqCst);
        });

        task.cancel();
        task.cancel();

        assert!(task.cancelled());
        assert!(task.complete());
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(
            task.local().lock().unwrap().install_state(),
            InstallState::Cancelled
        );

        // A completed task refuses to start.
        assert!(task.start().is_err());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let task = test_task();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = task.signals().progress.connect(move |p| {
            seen_clone.lock().unwrap().push(*p);
        });

        task.set_progress(10);
        task.set_progress(5);
        task.set_progress(50);
        task.set_progress(50);
        task.set_progress(200);

        assert_eq!(*seen.lock().unwrap(), vec![10, 50, 100]);
        assert_eq!(task.progress(), 100);
    }

    #[test]
    fn test_valid_requires_valid_pair() {
        let task = test_task();
        assert!(task.valid());
    }
}
