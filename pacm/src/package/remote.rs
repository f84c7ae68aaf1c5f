//! Remote package records from the server index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PacmError, PacmResult};

use super::asset::Asset;
use super::types::PackageInfo;
use super::version::version_gt;

/// A package available on the remote server, with its downloadable assets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemotePackage {
    /// Descriptive package fields.
    #[serde(flatten)]
    pub info: PackageInfo,

    /// Downloadable archive assets, newest not necessarily first.
    #[serde(default)]
    pub assets: Vec<Asset>,

    /// Unrecognized fields, preserved across a load/save cycle.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemotePackage {
    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn valid(&self) -> bool {
        self.info.valid()
    }

    /// Returns the asset with the greatest version.
    ///
    /// The index is not required to be ordered, so every asset is compared;
    /// ties keep the earliest occurrence.
    ///
    /// # Errors
    ///
    /// Fails when the package has no assets.
    pub fn latest_asset(&self) -> PacmResult<&Asset> {
        let mut best: Option<&Asset> = None;
        for asset in &self.assets {
            match best {
                Some(current) if !version_gt(&asset.version, &current.version) => {}
                _ => best = Some(asset),
            }
        }
        best.ok_or_else(|| {
            PacmError::InvalidPackage(format!("{}: package has no assets", self.id()))
        })
    }

    /// Returns the asset with the exact version.
    ///
    /// # Errors
    ///
    /// Fails when no asset carries that version.
    pub fn asset_version(&self, version: &str) -> PacmResult<&Asset> {
        self.assets
            .iter()
            .find(|a| a.version == version)
            .ok_or_else(|| {
                PacmError::NotFound(format!(
                    "{}: no package asset with version {}",
                    self.id(),
                    version
                ))
            })
    }

    /// Returns the greatest-version asset built against the given SDK
    /// version.
    ///
    /// # Errors
    ///
    /// Fails when no asset matches the SDK version.
    pub fn latest_sdk_asset(&self, sdk_version: &str) -> PacmResult<&Asset> {
        let mut best: Option<&Asset> = None;
        for asset in self.assets.iter().filter(|a| a.sdk_version == sdk_version) {
            match best {
                Some(current) if !version_gt(&asset.version, &current.version) => {}
                _ => best = Some(asset),
            }
        }
        best.ok_or_else(|| {
            PacmError::NotFound(format!(
                "{}: no package asset with SDK version {}",
                self.id(),
                sdk_version
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::asset::Mirror;

    fn remote(assets: Vec<Asset>) -> RemotePackage {
        RemotePackage {
            info: PackageInfo {
                id: "pkg".to_string(),
                name: "Package".to_string(),
                kind: "plugin".to_string(),
                ..PackageInfo::default()
            },
            assets,
            extra: Map::new(),
        }
    }

    fn asset(version: &str, sdk_version: &str) -> Asset {
        Asset {
            file_name: format!("pkg-{}.zip", version),
            version: version.to_string(),
            sdk_version: sdk_version.to_string(),
            mirrors: vec![Mirror::new(format!("http://m/pkg-{}.zip", version))],
            ..Asset::default()
        }
    }

    #[test]
    fn test_latest_asset_ignores_index_order() {
        let pkg = remote(vec![
            asset("1.0.0", "0.9"),
            asset("1.2.0", "1.0"),
            asset("1.1.0", "1.0"),
        ]);
        assert_eq!(pkg.latest_asset().unwrap().version, "1.2.0");
    }

    #[test]
    fn test_latest_asset_tie_keeps_first_occurrence() {
        let mut first = asset("1.0.0", "0.9");
        first.checksum = "first".to_string();
        let mut second = asset("1.0.0", "0.9");
        second.checksum = "second".to_string();

        let pkg = remote(vec![first, second]);
        assert_eq!(pkg.latest_asset().unwrap().checksum, "first");
    }

    #[test]
    fn test_latest_asset_fails_without_assets() {
        let pkg = remote(vec![]);
        assert!(matches!(
            pkg.latest_asset(),
            Err(PacmError::InvalidPackage(_))
        ));
    }

    #[test]
    fn test_asset_version_matches_first_entry_too() {
        // Including index zero; selection must scan the whole list.
        let pkg = remote(vec![asset("1.0.0", "0.9"), asset("1.1.0", "1.0")]);
        assert_eq!(pkg.asset_version("1.0.0").unwrap().version, "1.0.0");
        assert!(matches!(
            pkg.asset_version("9.9.9"),
            Err(PacmError::NotFound(_))
        ));
    }

    #[test]
    fn test_latest_sdk_asset_picks_newest_for_sdk() {
        let pkg = remote(vec![
            asset("1.0.5", "0.9"),
            asset("1.0.2", "0.9"),
            asset("1.1.0", "1.0"),
        ]);
        let picked = pkg.latest_sdk_asset("0.9").unwrap();
        assert_eq!(picked.version, "1.0.5");
        assert!(matches!(
            pkg.latest_sdk_asset("7.7"),
            Err(PacmError::NotFound(_))
        ));
    }
}
