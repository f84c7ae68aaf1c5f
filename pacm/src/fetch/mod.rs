//! Archive downloading.
//!
//! The [`AssetDownloader`] trait abstracts HTTP fetching of package archives
//! so installation can be tested without network access. The production
//! implementation streams the response body to disk, reporting progress and
//! honoring cancellation between reads.

mod checksum;

pub use checksum::{hash_file, ChecksumAlgorithm};

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Default HTTP connect timeout for archive downloads.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Read/write chunk size when streaming a response body to disk.
const CHUNK_SIZE: usize = 16 * 1024;

/// Shared cancellation flag checked at every suspension point.
///
/// Cancellation is cooperative and idempotent; any thread may request it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call repeatedly from any thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callback invoked with `(bytes_downloaded, bytes_total)`.
///
/// `bytes_total` is zero when the server did not report a content length.
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Errors that can occur while downloading an archive.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection or protocol failure.
    #[error("download failed for {url}: {reason}")]
    Http { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("download failed for {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// Local filesystem failure while writing the archive.
    #[error("download I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The download was cancelled.
    #[error("download cancelled")]
    Cancelled,
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Downloader for package archives.
pub trait AssetDownloader: Send + Sync {
    /// Download `url` to `dest`, streaming to disk.
    ///
    /// `on_progress` is invoked periodically while the body is read and
    /// `cancel` is checked between reads; a cancelled download returns
    /// [`FetchError::Cancelled`] and leaves any partial file in place for
    /// diagnostics.
    ///
    /// Returns the number of bytes written on success.
    fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelFlag,
        on_progress: ProgressCallback,
    ) -> FetchResult<u64>;
}

/// HTTP implementation of [`AssetDownloader`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpAssetDownloader {
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for HttpAssetDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAssetDownloader").finish()
    }
}

impl Default for HttpAssetDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAssetDownloader {
    /// Create a downloader with the default connect timeout.
    ///
    /// No overall request timeout is set; large archives may legitimately
    /// take minutes and cancellation is handled by the caller's flag.
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(None::<Duration>)
            .user_agent(concat!("pacm/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to create HTTP client");
        Self { client }
    }
}

impl AssetDownloader for HttpAssetDownloader {
    fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelFlag,
        on_progress: ProgressCallback,
    ) -> FetchResult<u64> {
        let mut response = self.client.get(url).send().map_err(|e| FetchError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(dest)?;

        let mut downloaded = 0u64;
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let n = response.read(&mut buf).map_err(|e| FetchError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            downloaded += n as u64;
            on_progress(downloaded, total);
        }

        file.flush()?;
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    /// Downloader that writes fixed bytes, for exercising the trait seam.
    struct StaticDownloader {
        body: Vec<u8>,
    }

    impl AssetDownloader for StaticDownloader {
        fn download(
            &self,
            _url: &str,
            dest: &Path,
            cancel: &CancelFlag,
            on_progress: ProgressCallback,
        ) -> FetchResult<u64> {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            fs::write(dest, &self.body)?;
            let total = self.body.len() as u64;
            on_progress(total / 2, total);
            on_progress(total, total);
            Ok(total)
        }
    }

    #[test]
    fn test_mock_downloader_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pkg.zip");
        let downloader = StaticDownloader {
            body: vec![7u8; 100],
        };

        let last = Arc::new(AtomicU64::new(0));
        let last_clone = Arc::clone(&last);
        let written = downloader
            .download(
                "http://test/pkg.zip",
                &dest,
                &CancelFlag::new(),
                Box::new(move |done, _total| last_clone.store(done, Ordering::SeqCst)),
            )
            .unwrap();

        assert_eq!(written, 100);
        assert_eq!(last.load(Ordering::SeqCst), 100);
        assert_eq!(fs::read(&dest).unwrap().len(), 100);
    }

    #[test]
    fn test_cancelled_flag_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = StaticDownloader { body: vec![1, 2, 3] };
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = downloader.download(
            "http://test/pkg.zip",
            &dir.path().join("pkg.zip"),
            &cancel,
            Box::new(|_, _| {}),
        );
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }

    #[test]
    fn test_cancel_flag_is_shared_and_idempotent() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
