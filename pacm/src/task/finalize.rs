//! Finalization: moving staged files into the install directory.
//!
//! Shared between the running install task and
//! `PackageManager::finalize_installations`, which retries installs that
//! were interrupted by a busy target file in a previous process.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PacmError, PacmResult};
use crate::package::{InstallState, LocalPackage, PackageState};

/// Move every staged manifest file into the package's install directory
/// and seal the install.
///
/// The staging directory is `<temp-dir>/<id>/`. Files already moved by an
/// earlier attempt are skipped, so a deferred finalize is idempotent. On
/// success the package is marked `Installed`, the pending asset becomes the
/// installed asset and the staging directory is removed.
///
/// # Errors
///
/// - [`PacmError::FinalizeBusy`] when a target file is held by another
///   process; the package stays `Installing`/`Finalizing` for a later
///   retry.
/// - [`PacmError::FinalizeFailed`] for non-recoverable filesystem errors.
pub(crate) fn finalize_install(local: &mut LocalPackage, temp_dir: &Path) -> PacmResult<()> {
    let install_dir = PathBuf::from(local.install_dir());
    if local.install_dir().is_empty() {
        return Err(PacmError::FinalizeFailed {
            path: temp_dir.to_path_buf(),
            reason: format!("{}: no install directory recorded", local.id()),
        });
    }

    local.set_install_state(InstallState::Finalizing);

    let staging = temp_dir.join(local.id());
    for file_name in local.manifest().to_vec() {
        let source = staging.join(&file_name);
        if !source.exists() {
            // Already moved by a previous attempt, or carried over from an
            // earlier version of the package.
            continue;
        }

        let target = install_dir.join(&file_name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        debug!(from = %source.display(), to = %target.display(), "moving staged file");
        move_file(&source, &target)?;
    }

    local.dedup_manifest();
    local.set_state(PackageState::Installed);
    local.set_install_state(InstallState::Installed);
    if let Some(asset) = local.take_pending_asset() {
        local.set_installed_asset(asset)?;
    }

    let _ = fs::remove_dir_all(&staging);
    Ok(())
}

/// Move one file, preferring rename and falling back to copy-and-unlink
/// when the rename cannot be used (cross-device, or the target needs to be
/// replaced on a platform where rename will not).
fn move_file(source: &Path, target: &Path) -> PacmResult<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if is_busy_error(&e) => Err(PacmError::FinalizeBusy(target.to_path_buf())),
        Err(_) => match fs::copy(source, target) {
            Ok(_) => {
                fs::remove_file(source)?;
                Ok(())
            }
            Err(e) if is_busy_error(&e) => Err(PacmError::FinalizeBusy(target.to_path_buf())),
            Err(e) => Err(PacmError::FinalizeFailed {
                path: target.to_path_buf(),
                reason: e.to_string(),
            }),
        },
    }
}

/// Classify an I/O error as "target file in use".
///
/// Windows reports a file opened by another process as a sharing or lock
/// violation (and often as a permission error); Unix uses EBUSY/ETXTBSY.
fn is_busy_error(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    match e.raw_os_error() {
        Some(code) if cfg!(unix) => code == 16 || code == 26, // EBUSY, ETXTBSY
        Some(code) if cfg!(windows) => code == 32 || code == 33, // sharing, lock violation
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{Asset, Mirror, PackageInfo, RemotePackage};

    fn staged_package(temp_dir: &Path, install_dir: &Path) -> LocalPackage {
        let remote = RemotePackage {
            info: PackageInfo {
                id: "pkg".to_string(),
                name: "Package".to_string(),
                kind: "plugin".to_string(),
                ..PackageInfo::default()
            },
            ..RemotePackage::default()
        };
        let mut local = LocalPackage::from_remote(&remote);

        let staging = temp_dir.join("pkg");
        fs::create_dir_all(staging.join("sub")).unwrap();
        fs::write(staging.join("plugin.so"), b"binary").unwrap();
        fs::write(staging.join("sub/data.txt"), b"data").unwrap();

        local.add_manifest_file("plugin.so");
        local.add_manifest_file("sub/data.txt");
        local.set_install_dir(install_dir.to_string_lossy().into_owned());
        local.set_install_state(InstallState::Finalizing);
        local.set_pending_asset(Some(Asset {
            file_name: "pkg-1.0.0.zip".to_string(),
            version: "1.0.0".to_string(),
            mirrors: vec![Mirror::new("http://m/pkg-1.0.0.zip")],
            ..Asset::default()
        }));
        local
    }

    #[test]
    fn test_finalize_moves_files_and_seals() {
        let root = tempfile::tempdir().unwrap();
        let temp_dir = root.path().join("tmp");
        let install_dir = root.path().join("install");
        fs::create_dir_all(&install_dir).unwrap();

        let mut local = staged_package(&temp_dir, &install_dir);
        finalize_install(&mut local, &temp_dir).unwrap();

        assert!(install_dir.join("plugin.so").exists());
        assert!(install_dir.join("sub/data.txt").exists());
        assert!(!temp_dir.join("pkg").exists());

        assert!(local.is_installed());
        assert_eq!(local.install_state(), InstallState::Installed);
        assert_eq!(local.version(), "1.0.0");
        assert!(local.pending_asset().is_none());
        assert!(local.verify_install_manifest(false));
    }

    #[test]
    fn test_finalize_is_idempotent_for_moved_files() {
        let root = tempfile::tempdir().unwrap();
        let temp_dir = root.path().join("tmp");
        let install_dir = root.path().join("install");
        fs::create_dir_all(&install_dir).unwrap();

        let mut local = staged_package(&temp_dir, &install_dir);

        // First file already placed by an earlier attempt.
        fs::write(install_dir.join("plugin.so"), b"binary").unwrap();
        fs::remove_file(temp_dir.join("pkg/plugin.so")).unwrap();

        finalize_install(&mut local, &temp_dir).unwrap();
        assert!(local.is_installed());
        assert!(local.verify_install_manifest(false));
    }

    #[test]
    fn test_finalize_requires_install_dir() {
        let root = tempfile::tempdir().unwrap();
        let temp_dir = root.path().join("tmp");
        let mut local = staged_package(&temp_dir, Path::new(""));
        local.set_install_dir("");

        let result = finalize_install(&mut local, &temp_dir);
        assert!(matches!(result, Err(PacmError::FinalizeFailed { .. })));
    }

    #[test]
    fn test_finalize_dedups_manifest() {
        let root = tempfile::tempdir().unwrap();
        let temp_dir = root.path().join("tmp");
        let install_dir = root.path().join("install");
        fs::create_dir_all(&install_dir).unwrap();

        let mut local = staged_package(&temp_dir, &install_dir);
        local.add_manifest_file("plugin.so");
        finalize_install(&mut local, &temp_dir).unwrap();

        assert_eq!(
            local.manifest(),
            &["plugin.so".to_string(), "sub/data.txt".to_string()]
        );
    }
}
