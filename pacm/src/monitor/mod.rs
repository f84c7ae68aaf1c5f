//! Install monitor: aggregates a group of install tasks.
//!
//! The monitor observes a fixed set of tasks begun together, proxies their
//! per-task events, computes aggregate progress and fires a single
//! `Complete` with all monitored packages once every task has finished.
//! It holds shared references only; the manager remains the owner of the
//! tasks.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::{PacmError, PacmResult};
use crate::package::SharedLocalPackage;
use crate::signal::{Signal, Subscription};
use crate::task::{InstallTask, StateChange};

/// Observable events of an install monitor.
#[derive(Debug, Default)]
pub struct MonitorSignals {
    /// Proxied state changes from monitored tasks.
    pub state_change: Signal<(String, StateChange)>,
    /// A monitored package finished installing (any outcome).
    pub install_complete: Signal<SharedLocalPackage>,
    /// Aggregate progress, 0-100, non-decreasing.
    pub progress: Signal<u8>,
    /// All monitored tasks have completed.
    pub complete: Signal<Vec<SharedLocalPackage>>,
}

struct MonitorState {
    tasks: Vec<Arc<InstallTask>>,
    packages: Vec<SharedLocalPackage>,
    subscriptions: Vec<(usize, Vec<Subscription>)>,
    progress: u8,
    complete_emitted: bool,
}

/// Aggregates a set of install tasks into one observable unit of work.
pub struct InstallMonitor {
    shared: Arc<MonitorShared>,
}

struct MonitorShared {
    state: Mutex<MonitorState>,
    /// Serializes completion handling so aggregate progress is emitted in
    /// non-decreasing order even when tasks finish concurrently.
    dispatch: Mutex<()>,
    signals: MonitorSignals,
}

impl Default for InstallMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallMonitor {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MonitorShared {
                state: Mutex::new(MonitorState {
                    tasks: Vec::new(),
                    packages: Vec::new(),
                    subscriptions: Vec::new(),
                    progress: 0,
                    complete_emitted: false,
                }),
                dispatch: Mutex::new(()),
                signals: MonitorSignals::default(),
            }),
        }
    }

    pub fn signals(&self) -> &MonitorSignals {
        &self.shared.signals
    }

    /// Add a task to monitor.
    ///
    /// # Errors
    ///
    /// Fails when the task's package pair is invalid.
    pub fn add_task(&self, task: &Arc<InstallTask>) -> PacmResult<()> {
        if !task.valid() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: cannot monitor an invalid install task",
                task.package_id()
            )));
        }

        let key = Arc::as_ptr(task) as usize;
        let package_id = task.package_id();

        let shared = Arc::downgrade(&self.shared);
        let id_for_state = package_id.clone();
        let state_sub = task.signals().state_change.connect(move |change| {
            if let Some(shared) = shared.upgrade() {
                shared
                    .signals
                    .state_change
                    .emit(&(id_for_state.clone(), *change));
            }
        });

        let shared = Arc::downgrade(&self.shared);
        let weak_task = Arc::downgrade(task);
        let complete_sub = task.signals().complete.connect(move |_| {
            if let (Some(shared), Some(task)) = (shared.upgrade(), weak_task.upgrade()) {
                MonitorShared::on_task_complete(&shared, &task);
            }
        });

        let mut state = self.shared.state.lock().unwrap();
        state.tasks.push(Arc::clone(task));
        state.packages.push(task.local());
        state
            .subscriptions
            .push((key, vec![state_sub, complete_sub]));
        debug!(package = %package_id, "task added to install monitor");
        Ok(())
    }

    /// Start every monitored task.
    pub fn start_all(&self) -> PacmResult<()> {
        let tasks = self.tasks();
        for task in tasks {
            task.start()?;
        }
        Ok(())
    }

    /// Cancel every monitored task.
    pub fn cancel_all(&self) {
        for task in self.tasks() {
            task.cancel();
        }
    }

    /// Tasks still running or not yet started.
    pub fn tasks(&self) -> Vec<Arc<InstallTask>> {
        self.shared.state.lock().unwrap().tasks.clone()
    }

    /// All monitored packages, including those whose tasks have finished.
    pub fn packages(&self) -> Vec<SharedLocalPackage> {
        self.shared.state.lock().unwrap().packages.clone()
    }

    /// Aggregate progress, 0-100.
    pub fn progress(&self) -> u8 {
        self.shared.state.lock().unwrap().progress
    }

    /// True once every monitored task has completed.
    pub fn is_complete(&self) -> bool {
        self.shared.state.lock().unwrap().tasks.is_empty()
    }
}

impl MonitorShared {
    fn on_task_complete(shared: &Arc<Self>, task: &Arc<InstallTask>) {
        let key = Arc::as_ptr(task) as usize;
        let _dispatch = shared.dispatch.lock().unwrap();

        let (progress, remaining, finished_packages) = {
            let mut state = shared.state.lock().unwrap();

            // Detach our subscriptions and drop the task reference.
            state.subscriptions.retain(|(k, _)| *k != key);
            state.tasks.retain(|t| !Arc::ptr_eq(t, task));

            let total = state.packages.len();
            let progress = if total == 0 {
                100
            } else {
                ((total - state.tasks.len()) * 100 / total) as u8
            };
            state.progress = progress;

            let finished = if state.tasks.is_empty() && !state.complete_emitted {
                state.complete_emitted = true;
                Some(state.packages.clone())
            } else {
                None
            };

            (progress, state.tasks.len(), finished)
        };

        info!(
            package = %task.package_id(),
            remaining,
            "monitored install complete"
        );

        shared.signals.install_complete.emit(&task.local());
        shared.signals.progress.emit(&progress);
        if let Some(packages) = finished_packages {
            shared.signals.complete.emit(&packages);
        }
    }
}

impl std::fmt::Debug for InstallMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().unwrap();
        f.debug_struct("InstallMonitor")
            .field("tasks", &state.tasks.len())
            .field("packages", &state.packages.len())
            .field("progress", &state.progress)
            .finish()
    }
}
