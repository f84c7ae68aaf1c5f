//! Local package records persisted to the data directory.
//!
//! A `LocalPackage` is the on-disk manifest of one installed (or installing)
//! package: its lifecycle state, the directory it was installed to, the list
//! of files placed there, and any errors from past install attempts. One
//! JSON file per package lives at `<data-dir>/<id>.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::{PacmError, PacmResult};

use super::asset::Asset;
use super::remote::RemotePackage;
use super::types::{InstallState, PackageInfo, PackageState};

fn default_version() -> String {
    "0.0.0".to_string()
}

/// An installed or installing package on the local filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalPackage {
    #[serde(flatten)]
    info: PackageInfo,

    #[serde(default)]
    state: PackageState,

    #[serde(rename = "install-state", default)]
    install_state: InstallState,

    /// Absolute installation directory, or empty before finalization.
    #[serde(rename = "install-dir", default)]
    install_dir: String,

    /// The installed asset; set only after a successful finalize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    asset: Option<Asset>,

    /// The asset selected for an in-flight install, recorded before
    /// finalization so an interrupted install can complete after restart.
    #[serde(
        rename = "pending-asset",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pending_asset: Option<Asset>,

    #[serde(default = "default_version")]
    version: String,

    #[serde(rename = "version-lock", default, skip_serializing_if = "Option::is_none")]
    version_lock: Option<String>,

    #[serde(
        rename = "sdk-version-lock",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    sdk_version_lock: Option<String>,

    /// Paths of installed files, relative to `install-dir`.
    #[serde(default)]
    manifest: Vec<String>,

    /// Error messages from failed install attempts, oldest first.
    #[serde(default)]
    errors: Vec<String>,

    /// Unrecognized fields, preserved across a load/save cycle.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for LocalPackage {
    fn default() -> Self {
        Self {
            info: PackageInfo::default(),
            state: PackageState::default(),
            install_state: InstallState::default(),
            install_dir: String::new(),
            asset: None,
            pending_asset: None,
            version: default_version(),
            version_lock: None,
            sdk_version_lock: None,
            manifest: Vec::new(),
            errors: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl LocalPackage {
    /// Create the local record for a remote package that has never been
    /// installed. Assets are not carried over; only the selected asset is
    /// recorded, and only once installed.
    pub fn from_remote(remote: &RemotePackage) -> Self {
        Self {
            info: remote.info.clone(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &PackageInfo {
        &self.info
    }

    pub fn valid(&self) -> bool {
        self.info.valid()
    }

    pub fn state(&self) -> PackageState {
        self.state
    }

    pub fn set_state(&mut self, state: PackageState) {
        self.state = state;
    }

    pub fn install_state(&self) -> InstallState {
        self.install_state
    }

    pub fn set_install_state(&mut self, state: InstallState) {
        self.install_state = state;
    }

    pub fn install_dir(&self) -> &str {
        &self.install_dir
    }

    pub fn set_install_dir(&mut self, dir: impl Into<String>) {
        self.install_dir = dir.into();
    }

    /// The installed version, `0.0.0` when never installed.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Record the installed version.
    ///
    /// # Errors
    ///
    /// Fails unless the package state is `Installed`.
    pub fn set_version(&mut self, version: impl Into<String>) -> PacmResult<()> {
        if self.state != PackageState::Installed {
            return Err(PacmError::InvalidPackage(format!(
                "{}: package must be installed before the version is set",
                self.id()
            )));
        }
        self.version = version.into();
        Ok(())
    }

    pub fn asset(&self) -> Option<&Asset> {
        self.asset.as_ref()
    }

    /// Record the asset that was installed, and with it the version.
    ///
    /// # Errors
    ///
    /// Fails unless the package state is `Installed` and the asset is valid.
    pub fn set_installed_asset(&mut self, asset: Asset) -> PacmResult<()> {
        if self.state != PackageState::Installed {
            return Err(PacmError::InvalidPackage(format!(
                "{}: package must be installed before the asset is set",
                self.id()
            )));
        }
        if !asset.valid() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: installed asset is invalid",
                self.id()
            )));
        }
        let version = asset.version.clone();
        self.asset = Some(asset);
        self.set_version(version)
    }

    pub fn pending_asset(&self) -> Option<&Asset> {
        self.pending_asset.as_ref()
    }

    pub fn set_pending_asset(&mut self, asset: Option<Asset>) {
        self.pending_asset = asset;
    }

    pub fn take_pending_asset(&mut self) -> Option<Asset> {
        self.pending_asset.take()
    }

    pub fn version_lock(&self) -> Option<&str> {
        self.version_lock.as_deref()
    }

    /// Lock the package at a version; `None` removes the lock.
    pub fn set_version_lock(&mut self, version: Option<String>) {
        self.version_lock = version.filter(|v| !v.is_empty());
    }

    pub fn sdk_version_lock(&self) -> Option<&str> {
        self.sdk_version_lock.as_deref()
    }

    /// Lock the package to the newest asset for an SDK version; `None`
    /// removes the lock.
    pub fn set_sdk_version_lock(&mut self, version: Option<String>) {
        self.sdk_version_lock = version.filter(|v| !v.is_empty());
    }

    pub fn is_installed(&self) -> bool {
        self.state == PackageState::Installed
    }

    pub fn is_failed(&self) -> bool {
        self.state == PackageState::Failed
    }

    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    /// Append a file path (relative to the install dir) to the manifest.
    pub fn add_manifest_file(&mut self, path: impl Into<String>) {
        self.manifest.push(path.into());
    }

    /// Drop duplicate manifest entries, preserving first occurrence order.
    pub fn dedup_manifest(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.manifest.retain(|p| seen.insert(p.clone()));
    }

    pub fn clear_manifest(&mut self) {
        self.manifest.clear();
    }

    /// Absolute path of an installed file.
    ///
    /// # Errors
    ///
    /// When `whiny` is set and the install directory is unknown.
    pub fn installed_file_path(&self, file_name: &str, whiny: bool) -> PacmResult<PathBuf> {
        if whiny && self.install_dir.is_empty() {
            return Err(PacmError::InvalidPackage(format!(
                "{}: package install directory is not set",
                self.id()
            )));
        }
        Ok(Path::new(&self.install_dir).join(file_name))
    }

    /// Check that every manifest file still exists under the install dir.
    ///
    /// An empty manifest verifies only when `allow_empty` is set, so a
    /// package with no recorded files is never treated as a healthy install.
    pub fn verify_install_manifest(&self, allow_empty: bool) -> bool {
        debug!(package = %self.name(), "verifying install manifest");

        for file_name in &self.manifest {
            let path = match self.installed_file_path(file_name, false) {
                Ok(path) => path,
                Err(_) => return false,
            };
            if !path.exists() {
                error!(package = %self.name(), path = %path.display(), "missing installed file");
                return false;
            }
        }

        if self.manifest.is_empty() {
            allow_empty
        } else {
            true
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::asset::Mirror;
    use crate::package::types::PackageInfo;

    fn installed_asset() -> Asset {
        Asset {
            file_name: "pkg-1.1.0.zip".to_string(),
            version: "1.1.0".to_string(),
            mirrors: vec![Mirror::new("http://m/pkg-1.1.0.zip")],
            ..Asset::default()
        }
    }

    fn local() -> LocalPackage {
        LocalPackage {
            info: PackageInfo {
                id: "pkg".to_string(),
                name: "Package".to_string(),
                kind: "plugin".to_string(),
                ..PackageInfo::default()
            },
            ..LocalPackage::default()
        }
    }

    #[test]
    fn test_defaults() {
        let package = local();
        assert_eq!(package.state(), PackageState::Installing);
        assert_eq!(package.install_state(), InstallState::None);
        assert_eq!(package.version(), "0.0.0");
        assert!(package.asset().is_none());
        assert!(!package.is_installed());
    }

    #[test]
    fn test_set_version_requires_installed_state() {
        let mut package = local();
        assert!(package.set_version("1.0.0").is_err());

        package.set_state(PackageState::Installed);
        package.set_version("1.0.0").unwrap();
        assert_eq!(package.version(), "1.0.0");
    }

    #[test]
    fn test_set_installed_asset_sets_version() {
        let mut package = local();
        assert!(package.set_installed_asset(installed_asset()).is_err());

        package.set_state(PackageState::Installed);
        package.set_installed_asset(installed_asset()).unwrap();
        assert_eq!(package.version(), "1.1.0");
        assert_eq!(package.asset().unwrap().version, "1.1.0");
    }

    #[test]
    fn test_invalid_asset_is_rejected() {
        let mut package = local();
        package.set_state(PackageState::Installed);
        let mut bad = installed_asset();
        bad.mirrors.clear();
        assert!(package.set_installed_asset(bad).is_err());
    }

    #[test]
    fn test_empty_lock_clears() {
        let mut package = local();
        package.set_version_lock(Some("1.0.0".to_string()));
        assert_eq!(package.version_lock(), Some("1.0.0"));
        package.set_version_lock(Some(String::new()));
        assert_eq!(package.version_lock(), None);
    }

    #[test]
    fn test_verify_manifest_empty() {
        let package = local();
        assert!(!package.verify_install_manifest(false));
        assert!(package.verify_install_manifest(true));
    }

    #[test]
    fn test_verify_manifest_checks_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plugin.so"), b"x").unwrap();

        let mut package = local();
        package.set_install_dir(dir.path().to_string_lossy().into_owned());
        package.add_manifest_file("plugin.so");
        assert!(package.verify_install_manifest(false));

        package.add_manifest_file("missing.so");
        assert!(!package.verify_install_manifest(false));
    }

    #[test]
    fn test_errors_are_ordered() {
        let mut package = local();
        assert!(package.last_error().is_none());
        package.add_error("first");
        package.add_error("second");
        assert_eq!(package.last_error(), Some("second"));
        package.clear_errors();
        assert!(package.errors().is_empty());
    }

    #[test]
    fn test_round_trip_preserves_unknown_fields() {
        let raw = r#"{
            "id": "pkg",
            "name": "Package",
            "type": "plugin",
            "state": "Installed",
            "install-state": "Installed",
            "install-dir": "/opt/plugins",
            "version": "1.1.0",
            "manifest": ["plugin.so"],
            "errors": [],
            "custom-field": 42
        }"#;
        let package: LocalPackage = serde_json::from_str(raw).unwrap();
        assert!(package.is_installed());
        assert_eq!(package.install_dir(), "/opt/plugins");

        let out = serde_json::to_value(&package).unwrap();
        assert_eq!(out["custom-field"], 42);
        assert_eq!(out["install-state"], "Installed");
    }

    #[test]
    fn test_from_remote_drops_assets() {
        let remote: RemotePackage = serde_json::from_str(
            r#"{
                "id": "pkg", "name": "Package", "type": "plugin",
                "assets": [{ "file-name": "pkg.zip", "version": "1.0.0",
                             "mirrors": [{ "url": "http://m/pkg.zip" }] }]
            }"#,
        )
        .unwrap();

        let package = LocalPackage::from_remote(&remote);
        assert!(package.valid());
        assert_eq!(package.id(), "pkg");
        let json = serde_json::to_value(&package).unwrap();
        assert!(json.get("assets").is_none());
    }
}
