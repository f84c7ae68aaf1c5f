//! Installable asset selection.
//!
//! Given the local and remote views of a package plus the caller's install
//! options, pick the asset to install or explain why there is nothing to
//! do. Locks are strict and ordered: an explicit version wins over an SDK
//! lock, which wins over plain latest.

use tracing::debug;

use crate::config::InstallOptions;
use crate::error::{PacmError, PacmResult};
use crate::package::{version_gt, Asset, LocalPackage, RemotePackage};

/// Select the best asset to install for a package.
///
/// "Up-to-date" is only claimed when the installed files actually verify on
/// disk, so a manually deleted install is re-downloaded rather than skipped.
///
/// # Errors
///
/// - [`PacmError::ConflictingLock`] when an option conflicts with a
///   persisted lock.
/// - [`PacmError::UpToDate`] when the verified install already satisfies
///   the request (informational).
/// - [`PacmError::NotFound`] / [`PacmError::InvalidPackage`] when no asset
///   matches.
pub fn select_installable_asset(
    local: &LocalPackage,
    remote: &RemotePackage,
    options: &InstallOptions,
) -> PacmResult<Asset> {
    let verified = local.is_installed() && local.verify_install_manifest(false);

    debug!(
        package = %local.name(),
        desired_version = options.version.as_deref().unwrap_or(""),
        desired_sdk = options.sdk_version.as_deref().unwrap_or(""),
        local_version = %local.version(),
        version_lock = local.version_lock().unwrap_or(""),
        sdk_version_lock = local.sdk_version_lock().unwrap_or(""),
        verified,
        "selecting installable asset"
    );

    // A specific version, requested or locked.
    let version = options
        .version
        .as_deref()
        .or(local.version_lock())
        .filter(|v| !v.is_empty());
    if let Some(version) = version {
        if let (Some(requested), Some(lock)) = (options.version.as_deref(), local.version_lock()) {
            if requested != lock {
                return Err(PacmError::ConflictingLock(format!(
                    "{}: version {} conflicts with lock at {}",
                    local.id(),
                    requested,
                    lock
                )));
            }
        }

        let asset = remote.asset_version(version)?;
        if verified && !version_gt(&asset.version, local.version()) {
            return Err(PacmError::UpToDate(format!(
                "{}: package is up-to-date at locked version {}",
                local.id(),
                asset.version
            )));
        }
        return Ok(asset.clone());
    }

    // The newest build for an SDK version, requested or locked.
    let sdk_version = options
        .sdk_version
        .as_deref()
        .or(local.sdk_version_lock())
        .filter(|v| !v.is_empty());
    if let Some(sdk_version) = sdk_version {
        if let (Some(requested), Some(lock)) =
            (options.sdk_version.as_deref(), local.sdk_version_lock())
        {
            if requested != lock {
                return Err(PacmError::ConflictingLock(format!(
                    "{}: SDK version {} conflicts with lock at {}",
                    local.id(),
                    requested,
                    lock
                )));
            }
        }

        let asset = remote.latest_sdk_asset(sdk_version)?;
        if verified && !version_gt(&asset.version, local.version()) {
            return Err(PacmError::UpToDate(format!(
                "{}: package is up-to-date at SDK version {}",
                local.id(),
                sdk_version
            )));
        }
        return Ok(asset.clone());
    }

    // Otherwise the latest asset, if it is actually newer.
    let asset = remote.latest_asset()?;
    if verified && !version_gt(&asset.version, local.version()) {
        return Err(PacmError::UpToDate(format!(
            "{}: package is up-to-date at version {}",
            local.id(),
            local.version()
        )));
    }
    Ok(asset.clone())
}
