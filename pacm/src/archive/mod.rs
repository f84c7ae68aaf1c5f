//! Archive extraction.
//!
//! Supports the two archive formats packages are distributed in: `.zip` and
//! `.tar.gz`. Extraction is abstracted behind [`ArchiveExtractor`] so tests
//! can substitute their own staging behavior, and every entry path is
//! validated against directory traversal before anything touches disk.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while expanding a package archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file extension is not a supported archive type.
    #[error("unsupported archive type: {0}")]
    Unsupported(String),

    /// The archive is malformed or could not be read.
    #[error("malformed archive {archive}: {reason}")]
    Malformed { archive: PathBuf, reason: String },

    /// An entry would escape the extraction directory.
    #[error("archive entry escapes extraction directory: {0}")]
    UnsafeEntry(String),

    #[error("extraction I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Extractor for package archives.
pub trait ArchiveExtractor: Send + Sync {
    /// Expand `archive` into `dest`, creating it if needed.
    ///
    /// Returns the relative paths of the regular files written, in archive
    /// order. Directories are created as needed but not reported.
    fn extract(&self, archive: &Path, dest: &Path) -> ExtractResult<Vec<PathBuf>>;
}

/// Returns true if the file name is a supported package archive.
pub fn supported_archive(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower.ends_with(".zip") || lower.ends_with(".tar.gz") || lower.ends_with(".tgz")
}

/// Default extractor dispatching on the archive file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtractor;

impl ArchiveExtractor for DefaultExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> ExtractResult<Vec<PathBuf>> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        fs::create_dir_all(dest)?;

        if name.ends_with(".zip") {
            extract_zip(archive, dest)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            extract_tar_gz(archive, dest)
        } else {
            Err(ExtractError::Unsupported(name))
        }
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> ExtractResult<Vec<PathBuf>> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| ExtractError::Malformed {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut written = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| ExtractError::Malformed {
            archive: archive.to_path_buf(),
            reason: e.to_string(),
        })?;

        let rel = match entry.enclosed_name() {
            Some(path) => path,
            None => return Err(ExtractError::UnsafeEntry(entry.name().to_string())),
        };

        let target = dest.join(&rel);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        debug!(entry = %rel.display(), "extracted");
        written.push(rel);
    }

    Ok(written)
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> ExtractResult<Vec<PathBuf>> {
    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    let mut written = Vec::new();
    let entries = tar.entries().map_err(|e| ExtractError::Malformed {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ExtractError::Malformed {
            archive: archive.to_path_buf(),
            reason: e.to_string(),
        })?;

        let rel = entry
            .path()
            .map_err(|e| ExtractError::Malformed {
                archive: archive.to_path_buf(),
                reason: e.to_string(),
            })?
            .into_owned();
        if !path_is_safe(&rel) {
            return Err(ExtractError::UnsafeEntry(rel.display().to_string()));
        }

        let is_file = entry.header().entry_type().is_file();
        entry.unpack_in(dest).map_err(|e| ExtractError::Malformed {
            archive: archive.to_path_buf(),
            reason: e.to_string(),
        })?;

        if is_file {
            debug!(entry = %rel.display(), "extracted");
            written.push(rel);
        }
    }

    Ok(written)
}

/// A relative path with no parent or root components.
fn path_is_safe(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn write_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let opts = zip::write::SimpleFileOptions::default();

        zip.add_directory("plugin", opts).unwrap();
        zip.start_file("plugin/plugin.so", opts).unwrap();
        zip.write_all(b"binary contents").unwrap();
        zip.start_file("plugin.json", opts).unwrap();
        zip.write_all(b"{}").unwrap();
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut tar = tar::Builder::new(encoder);

        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, "plugin/plugin.so", &b"hello"[..])
            .unwrap();
        tar.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_supported_archive_types() {
        assert!(supported_archive("pkg-1.0.0.zip"));
        assert!(supported_archive("pkg-1.0.0.tar.gz"));
        assert!(supported_archive("pkg-1.0.0.tgz"));
        assert!(supported_archive("PKG.ZIP"));
        assert!(!supported_archive("pkg-1.0.0.rar"));
        assert!(!supported_archive("pkg-1.0.0.gz"));
    }

    #[test]
    fn test_extract_zip_returns_file_paths() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        write_zip(&archive);

        let dest = dir.path().join("staging");
        let files = DefaultExtractor.extract(&archive, &dest).unwrap();

        assert_eq!(
            files,
            vec![
                PathBuf::from("plugin/plugin.so"),
                PathBuf::from("plugin.json")
            ]
        );
        assert_eq!(
            fs::read(dest.join("plugin/plugin.so")).unwrap(),
            b"binary contents"
        );
    }

    #[test]
    fn test_extract_tar_gz_returns_file_paths() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.tar.gz");
        write_tar_gz(&archive);

        let dest = dir.path().join("staging");
        let files = DefaultExtractor.extract(&archive, &dest).unwrap();

        assert_eq!(files, vec![PathBuf::from("plugin/plugin.so")]);
        assert_eq!(fs::read(dest.join("plugin/plugin.so")).unwrap(), b"hello");
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.rar");
        fs::write(&archive, b"not an archive").unwrap();

        let result = DefaultExtractor.extract(&archive, &dir.path().join("out"));
        assert!(matches!(result, Err(ExtractError::Unsupported(_))));
    }

    #[test]
    fn test_garbage_zip_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let result = DefaultExtractor.extract(&archive, &dir.path().join("out"));
        assert!(matches!(result, Err(ExtractError::Malformed { .. })));
    }

    #[test]
    fn test_path_safety() {
        assert!(path_is_safe(Path::new("a/b/c")));
        assert!(!path_is_safe(Path::new("../escape")));
        assert!(!path_is_safe(Path::new("/absolute")));
    }
}
