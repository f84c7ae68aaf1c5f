//! Error types for the package manager core.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::archive::ExtractError;
use crate::fetch::FetchError;
use crate::index::IndexError;

/// Errors surfaced by the package manager, install tasks and package model.
#[derive(Debug, Error)]
pub enum PacmError {
    /// Unknown package id or missing manifest.
    #[error("not found: {0}")]
    NotFound(String),

    /// Required fields absent or wrong shape, local or remote.
    #[error("invalid package: {0}")]
    InvalidPackage(String),

    /// Install options conflict with a persisted lock.
    #[error("{0}")]
    ConflictingLock(String),

    /// Nothing to do; the installed version already satisfies the request.
    /// Informational: `install_package` converts this to a `None` task.
    #[error("{0}")]
    UpToDate(String),

    /// HTTP failure while querying the remote index.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// HTTP non-2xx, connection error or read error during download.
    #[error("{0}")]
    DownloadFailed(String),

    /// Computed archive hash differs from the asset checksum.
    #[error("checksum mismatch for {file_name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file_name: String,
        expected: String,
        actual: String,
    },

    /// Archive malformed or I/O failure during extraction.
    #[error("{0}")]
    ExtractFailed(String),

    /// A finalize target is held by another process; the install stays
    /// pending and is retried on the next startup.
    #[error("finalize deferred, target in use: {0}")]
    FinalizeBusy(PathBuf),

    /// Non-recoverable filesystem failure while moving staged files.
    #[error("finalize failed for {path}: {reason}")]
    FinalizeFailed { path: PathBuf, reason: String },

    /// The operation was refused because install tasks are active.
    #[error("busy: {0}")]
    Busy(String),

    /// The install task was cancelled.
    #[error("installation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PacmError {
    /// True for the informational "nothing to do" outcome.
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, PacmError::UpToDate(_))
    }
}

impl From<FetchError> for PacmError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => PacmError::Cancelled,
            other => PacmError::DownloadFailed(other.to_string()),
        }
    }
}

impl From<ExtractError> for PacmError {
    fn from(err: ExtractError) -> Self {
        PacmError::ExtractFailed(err.to_string())
    }
}

pub type PacmResult<T> = Result<T, PacmError>;
