//! Package asset records.
//!
//! An asset is a single downloadable archive belonging to a package, with
//! one or more mirror URLs and an optional checksum for verification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_version() -> String {
    "0.0.0".to_string()
}

/// A single mirror location for an asset archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    /// Download URL for the archive.
    #[serde(default)]
    pub url: String,

    /// Unrecognized fields, preserved across a load/save cycle.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Mirror {
    /// Create a mirror from a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extra: Map::new(),
        }
    }
}

/// A downloadable archive asset for one package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Archive file name, e.g. `surveillancemode-1.2.3.zip`.
    #[serde(rename = "file-name", default)]
    pub file_name: String,

    /// Version of the package contained in this archive.
    #[serde(default = "default_version")]
    pub version: String,

    /// SDK version the archive was built against.
    #[serde(rename = "sdk-version", default = "default_version")]
    pub sdk_version: String,

    /// Expected checksum of the archive. Empty means no verification.
    #[serde(default)]
    pub checksum: String,

    /// Archive size in bytes, as reported by the server.
    #[serde(rename = "file-size", default)]
    pub file_size: u64,

    /// Mirror locations the archive can be downloaded from.
    #[serde(default)]
    pub mirrors: Vec<Mirror>,

    /// Unrecognized fields, preserved across a load/save cycle.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Asset {
    fn default() -> Self {
        Self {
            file_name: String::new(),
            version: default_version(),
            sdk_version: default_version(),
            checksum: String::new(),
            file_size: 0,
            mirrors: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Asset {
    /// Returns the download URL at the given mirror index, if present.
    pub fn url(&self, index: usize) -> Option<&str> {
        self.mirrors.get(index).map(|m| m.url.as_str())
    }

    /// An asset is valid when it names a file and a version and has at
    /// least one mirror to download from.
    pub fn valid(&self) -> bool {
        !self.file_name.is_empty() && !self.version.is_empty() && !self.mirrors.is_empty()
    }
}

/// Asset identity is the (file name, version, checksum) triple; mirrors and
/// sizes may differ between index refreshes without changing the asset.
impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.file_name == other.file_name
            && self.version == other.version
            && self.checksum == other.checksum
    }
}

impl Eq for Asset {}
