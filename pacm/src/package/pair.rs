//! Pairing of a local and a remote package for one id.

use super::{SharedLocalPackage, SharedRemotePackage};

/// A view of one package id across the local and remote collections.
///
/// Either side may be absent: a package can be known remotely but never
/// installed, or installed locally while the remote index no longer lists
/// it. The pair holds shared handles into the manager's collections.
#[derive(Debug, Clone, Default)]
pub struct PackagePair {
    pub local: Option<SharedLocalPackage>,
    pub remote: Option<SharedRemotePackage>,
}

impl PackagePair {
    pub fn new(local: Option<SharedLocalPackage>, remote: Option<SharedRemotePackage>) -> Self {
        Self { local, remote }
    }

    /// The package id, preferring the local record.
    pub fn id(&self) -> String {
        if let Some(local) = &self.local {
            return local.lock().unwrap().id().to_string();
        }
        if let Some(remote) = &self.remote {
            return remote.id().to_string();
        }
        String::new()
    }

    /// The package name, preferring the local record.
    pub fn name(&self) -> String {
        if let Some(local) = &self.local {
            return local.lock().unwrap().name().to_string();
        }
        if let Some(remote) = &self.remote {
            return remote.name().to_string();
        }
        String::new()
    }

    /// A pair is valid when at least one side is present and every present
    /// side is itself valid.
    pub fn valid(&self) -> bool {
        if self.local.is_none() && self.remote.is_none() {
            return false;
        }
        if let Some(local) = &self.local {
            if !local.lock().unwrap().valid() {
                return false;
            }
        }
        if let Some(remote) = &self.remote {
            if !remote.valid() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{LocalPackage, PackageInfo, RemotePackage};
    use std::sync::{Arc, Mutex};

    fn shared_remote(id: &str) -> SharedRemotePackage {
        Arc::new(RemotePackage {
            info: PackageInfo {
                id: id.to_string(),
                name: "Package".to_string(),
                kind: "plugin".to_string(),
                ..PackageInfo::default()
            },
            ..RemotePackage::default()
        })
    }

    #[test]
    fn test_empty_pair_is_invalid() {
        assert!(!PackagePair::default().valid());
    }

    #[test]
    fn test_remote_only_pair() {
        let pair = PackagePair::new(None, Some(shared_remote("pkg")));
        assert!(pair.valid());
        assert_eq!(pair.id(), "pkg");
    }

    #[test]
    fn test_local_side_preferred_and_checked() {
        let remote = shared_remote("pkg");
        let local = Arc::new(Mutex::new(LocalPackage::from_remote(&remote)));
        let pair = PackagePair::new(Some(local.clone()), Some(remote));
        assert!(pair.valid());
        assert_eq!(pair.id(), "pkg");

        // An invalid local side invalidates the pair even with a valid remote.
        let pair = PackagePair::new(Some(Arc::new(Mutex::new(LocalPackage::default()))), None);
        assert!(!pair.valid());
    }
}
