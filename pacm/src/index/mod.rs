//! Remote package index client.
//!
//! The index is a JSON array of package objects served over HTTP(S). The
//! [`IndexClient`] trait abstracts the transport so the manager can be
//! tested against a canned index; [`HttpIndexClient`] is the production
//! implementation.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::package::RemotePackage;

/// Default HTTP request timeout for index queries (30 seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Authentication applied to index requests.
///
/// Precedence follows the server contract: an OAuth bearer token wins over
/// basic credentials, which win over anonymous access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HttpAuth {
    /// No authentication.
    #[default]
    None,
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// HTTP basic authentication.
    Basic { username: String, password: String },
}

impl HttpAuth {
    /// Apply these credentials to a request.
    fn apply(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match self {
            HttpAuth::None => request,
            HttpAuth::Bearer(token) => request.bearer_auth(token),
            HttpAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }
}

/// Errors that can occur while querying the remote index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Connection or protocol failure.
    #[error("index request failed for {url}: {reason}")]
    Http { url: String, reason: String },

    /// The request timed out.
    #[error("index request timed out for {url} after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The server answered with a non-success status.
    #[error("index request failed for {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response body is not a JSON package array.
    #[error("invalid index response from {url}: {reason}")]
    Parse { url: String, reason: String },
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Client for fetching the remote package index.
pub trait IndexClient: Send + Sync {
    /// Fetch and parse the package index at `url`.
    ///
    /// Invalid entries in the array are logged and skipped; a malformed
    /// document is an error.
    fn fetch_index(&self, url: &str, auth: &HttpAuth) -> IndexResult<Vec<RemotePackage>>;
}

/// HTTP implementation of [`IndexClient`].
#[derive(Clone)]
pub struct HttpIndexClient {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl std::fmt::Debug for HttpIndexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIndexClient")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for HttpIndexClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpIndexClient {
    /// Create a client with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pacm/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to create HTTP client");
        Self { client, timeout }
    }

    fn fetch_text(&self, url: &str, auth: &HttpAuth) -> IndexResult<String> {
        let request = auth.apply(self.client.get(url));
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                IndexError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                IndexError::Http {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(IndexError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().map_err(|e| IndexError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

impl IndexClient for HttpIndexClient {
    fn fetch_index(&self, url: &str, auth: &HttpAuth) -> IndexResult<Vec<RemotePackage>> {
        let body = self.fetch_text(url, auth)?;
        parse_remote_index(&body).map_err(|reason| IndexError::Parse {
            url: url.to_string(),
            reason,
        })
    }
}

/// Parse a JSON package index, skipping invalid entries.
pub fn parse_remote_index(body: &str) -> Result<Vec<RemotePackage>, String> {
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(body).map_err(|e| e.to_string())?;

    let mut packages = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<RemotePackage>(entry) {
            Ok(package) if package.valid() => packages.push(package),
            Ok(package) => {
                warn!(id = %package.id(), "skipping invalid remote package");
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable remote package entry");
            }
        }
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"[
        {
            "id": "surveillancemode",
            "name": "Surveillance Mode",
            "type": "plugin",
            "author": "Sourcey",
            "description": "Motion detection plugin",
            "assets": [
                {
                    "file-name": "surveillancemode-1.2.3.zip",
                    "version": "1.2.3",
                    "sdk-version": "0.9.1",
                    "checksum": "c9a1074b",
                    "file-size": 1048576,
                    "mirrors": [{ "url": "https://host/surveillancemode-1.2.3.zip" }]
                }
            ]
        },
        { "id": "broken", "name": "", "type": "plugin", "assets": [] }
    ]"#;

    #[test]
    fn test_parse_skips_invalid_entries() {
        let packages = parse_remote_index(INDEX).unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].id(), "surveillancemode");
        assert_eq!(packages[0].assets.len(), 1);
        assert_eq!(packages[0].assets[0].file_size, 1048576);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_remote_index("{}").is_err());
        assert!(parse_remote_index("not json").is_err());
    }

    #[test]
    fn test_client_timeouts() {
        let client = HttpIndexClient::new();
        assert_eq!(client.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let client = HttpIndexClient::with_timeout(Duration::from_secs(5));
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_auth_default_is_anonymous() {
        assert_eq!(HttpAuth::default(), HttpAuth::None);
    }
}
