//! Built-in defaults for manager options.

/// Default HTTP server endpoint.
pub const DEFAULT_API_ENDPOINT: &str = "http://localhost:3000";

/// Default URI of the package index JSON.
pub const DEFAULT_API_INDEX_URI: &str = "/packages.json";

/// Default install directory, relative to the manager root.
pub const DEFAULT_INSTALL_DIR: &str = "pacm/install";

/// Default data directory for per-package manifests, relative to the root.
pub const DEFAULT_DATA_DIR: &str = "pacm/data";

/// Default directory for downloads and staging, relative to the root.
pub const DEFAULT_TEMP_DIR: &str = "pacm/tmp";

/// Platform tag reported to the remote server.
///
/// The server filters assets by platform; the client passes this through
/// unmodified and does not re-filter.
pub const fn platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "win32"
    } else if cfg!(target_os = "macos") {
        "mac"
    } else {
        "linux"
    }
}
