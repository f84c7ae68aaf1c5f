//! Package model: remote index records, local manifests and versioning.
//!
//! # Overview
//!
//! The remote server publishes an index of [`RemotePackage`]s, each exposing
//! one or more downloadable [`Asset`]s. Installed packages are tracked as
//! [`LocalPackage`] manifests persisted under the manager's data directory.
//! A [`PackagePair`] joins the two views of one package id.
//!
//! Version ordering is the dotted-numeric comparison in [`version`], not
//! strict semver: plain numeric components compare numerically and anything
//! else falls back to lexicographic order.

mod asset;
mod local;
mod pair;
mod remote;
mod types;
pub mod version;

pub use asset::{Asset, Mirror};
pub use local::LocalPackage;
pub use pair::PackagePair;
pub use remote::RemotePackage;
pub use types::{InstallState, PackageInfo, PackageState};
pub use version::{compare_versions, version_gt};

use std::sync::{Arc, Mutex};

/// Shared handle to a local package, mutated by its install task and the
/// manager and persisted by the manager.
pub type SharedLocalPackage = Arc<Mutex<LocalPackage>>;

/// Shared handle to an immutable remote package record.
pub type SharedRemotePackage = Arc<RemotePackage>;
