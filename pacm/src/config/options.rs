//! Settings structs for the package manager.
//!
//! These are pure data types; directory creation and validation happen in
//! the manager.

use std::path::{Path, PathBuf};

use crate::fetch::ChecksumAlgorithm;
use crate::index::HttpAuth;

use super::defaults;

/// Package manager construction options.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// HTTP server endpoint, e.g. `https://packages.example.com`.
    pub endpoint: String,

    /// URI of the package index JSON on the endpoint.
    pub index_uri: String,

    /// Username for HTTP basic auth. Empty disables basic auth.
    pub http_username: String,

    /// Password for HTTP basic auth.
    pub http_password: String,

    /// OAuth bearer token; takes precedence over basic auth when set.
    pub http_oauth_token: String,

    /// Directory where archives are downloaded and staged.
    pub temp_dir: PathBuf,

    /// Directory where per-package manifest JSON files are kept.
    pub data_dir: PathBuf,

    /// Directory where package files are installed.
    pub install_dir: PathBuf,

    /// Platform tag passed to the remote server (`win32`, `mac`, `linux`).
    pub platform: String,

    /// Algorithm used to verify downloaded archives.
    pub checksum_algorithm: ChecksumAlgorithm,

    /// Remove the downloaded archive from the temp dir when an install
    /// fails, so a retry downloads a fresh copy.
    pub clear_failed_cache: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::rooted(".")
    }
}

impl ManagerOptions {
    /// Options with all directories placed under the given root.
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            endpoint: defaults::DEFAULT_API_ENDPOINT.to_string(),
            index_uri: defaults::DEFAULT_API_INDEX_URI.to_string(),
            http_username: String::new(),
            http_password: String::new(),
            http_oauth_token: String::new(),
            temp_dir: root.join(defaults::DEFAULT_TEMP_DIR),
            data_dir: root.join(defaults::DEFAULT_DATA_DIR),
            install_dir: root.join(defaults::DEFAULT_INSTALL_DIR),
            platform: defaults::platform().to_string(),
            checksum_algorithm: ChecksumAlgorithm::default(),
            clear_failed_cache: true,
        }
    }

    /// Full URL of the package index.
    pub fn index_url(&self) -> String {
        format!("{}{}", self.endpoint, self.index_uri)
    }

    /// Credentials for index requests, by precedence: bearer token, then
    /// basic auth, then anonymous.
    pub fn http_auth(&self) -> HttpAuth {
        if !self.http_oauth_token.is_empty() {
            HttpAuth::Bearer(self.http_oauth_token.clone())
        } else if !self.http_username.is_empty() {
            HttpAuth::Basic {
                username: self.http_username.clone(),
                password: self.http_password.clone(),
            }
        } else {
            HttpAuth::None
        }
    }
}

/// Options for a single package installation.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Install this exact version instead of the latest.
    pub version: Option<String>,

    /// Install the latest version built for this SDK version.
    pub sdk_version: Option<String>,

    /// Install into this directory instead of the manager default.
    pub install_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directories_are_rooted() {
        let options = ManagerOptions::rooted("/srv/app");
        assert_eq!(options.temp_dir, PathBuf::from("/srv/app/pacm/tmp"));
        assert_eq!(options.data_dir, PathBuf::from("/srv/app/pacm/data"));
        assert_eq!(options.install_dir, PathBuf::from("/srv/app/pacm/install"));
        assert!(options.clear_failed_cache);
    }

    #[test]
    fn test_index_url_concatenates() {
        let mut options = ManagerOptions::default();
        options.endpoint = "https://host".to_string();
        options.index_uri = "/packages.json".to_string();
        assert_eq!(options.index_url(), "https://host/packages.json");
    }

    #[test]
    fn test_auth_precedence() {
        let mut options = ManagerOptions::default();
        assert_eq!(options.http_auth(), HttpAuth::None);

        options.http_username = "user".to_string();
        options.http_password = "secret".to_string();
        assert_eq!(
            options.http_auth(),
            HttpAuth::Basic {
                username: "user".to_string(),
                password: "secret".to_string()
            }
        );

        options.http_oauth_token = "token".to_string();
        assert_eq!(options.http_auth(), HttpAuth::Bearer("token".to_string()));
    }
}
