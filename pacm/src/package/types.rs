//! Core types shared by remote and local package records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Descriptive fields common to every package, remote or local.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Unique, stable package identifier.
    #[serde(default)]
    pub id: String,

    /// Human-readable package name.
    #[serde(default)]
    pub name: String,

    /// Package type, e.g. `plugin`.
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub description: String,
}

impl PackageInfo {
    /// A package is valid when id, name and type are all non-empty.
    pub fn valid(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty() && !self.kind.is_empty()
    }
}

/// Overall lifecycle state of a local package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageState {
    /// Installation has started but not yet completed or been finalized.
    #[default]
    Installing,
    /// The package is fully installed on disk.
    Installed,
    /// The last installation attempt failed.
    Failed,
    /// The package has been uninstalled.
    Uninstalled,
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PackageState::Installing => "Installing",
            PackageState::Installed => "Installed",
            PackageState::Failed => "Failed",
            PackageState::Uninstalled => "Uninstalled",
        };
        write!(f, "{}", s)
    }
}

/// Fine-grained state of the installation procedure.
///
/// Progresses `None → Downloading → Extracting → Finalizing → Installed`,
/// with `Cancelled` and `Failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallState {
    /// No installation attempted yet.
    #[default]
    None,
    /// The archive is being downloaded.
    Downloading,
    /// The archive is being expanded into the staging directory.
    Extracting,
    /// Staged files are being moved into the install directory.
    Finalizing,
    /// All files are in place.
    Installed,
    /// The task was cancelled before completion.
    Cancelled,
    /// The task failed.
    Failed,
}

impl InstallState {
    /// Returns true for states the task can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstallState::Installed | InstallState::Cancelled | InstallState::Failed
        )
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallState::None => "None",
            InstallState::Downloading => "Downloading",
            InstallState::Extracting => "Extracting",
            InstallState::Finalizing => "Finalizing",
            InstallState::Installed => "Installed",
            InstallState::Cancelled => "Cancelled",
            InstallState::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}
