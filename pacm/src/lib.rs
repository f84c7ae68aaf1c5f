//! Pacm - a package manager for binary plugins and components.
//!
//! Pacm installs, updates and uninstalls packages published in a remote
//! JSON index, keeping a persistent manifest of every file it places on
//! disk so later updates and uninstalls are precise.
//!
//! # High-level API
//!
//! The [`manager::PackageManager`] owns the package collections and drives
//! installation:
//!
//! ```ignore
//! use pacm::config::{InstallOptions, ManagerOptions};
//! use pacm::manager::PackageManager;
//!
//! let manager = PackageManager::new(ManagerOptions::default());
//! manager.initialize()?;
//! manager.query_remote_packages()?;
//! manager.install_packages(&ids, &InstallOptions::default(), None, false)?;
//! manager.wait_for_tasks();
//! ```
//!
//! Installation runs as an [`task::InstallTask`] state machine
//! (download, extract, finalize) per package; a [`monitor::InstallMonitor`]
//! aggregates a batch of tasks into one observable unit of work.

pub mod archive;
pub mod config;
pub mod error;
pub mod fetch;
pub mod index;
pub mod logging;
pub mod manager;
pub mod monitor;
pub mod package;
pub mod signal;
pub mod task;

pub use error::{PacmError, PacmResult};

/// Version of the pacm library and CLI, injected from the workspace
/// manifest at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
