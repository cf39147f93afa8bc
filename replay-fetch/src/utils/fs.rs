//! Filesystem helpers shared across modules.
//!
//! These keep error context (operation + path) consistent and centralize the
//! "is there already a usable file here" checks the pipeline relies on.

use std::path::Path;

use tracing::{debug, warn};

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// Size of `path` if it exists and is a regular file.
///
/// Any stat failure is treated as "not present".
pub async fn regular_file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        Ok(_) => None,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Stat failed");
            }
            None
        }
    }
}

/// Whether anything exists at `path`.
///
/// A failed stat is an error rather than "absent".
pub async fn exists(op: &'static str, path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// Remove a file, logging instead of failing.
///
/// Returns whether the file was removed.
pub async fn remove_file_logged(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed file");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_regular_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.flv");
        tokio::fs::write(&file, b"12345").await.unwrap();

        assert_eq!(regular_file_size(&file).await, Some(5));
        assert_eq!(regular_file_size(&dir.path().join("missing")).await, None);
        // Directories are not regular files.
        assert_eq!(regular_file_size(dir.path()).await, None);
    }

    #[tokio::test]
    async fn test_ensure_dir_all_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir_all("creating directory", &nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_ensure_dir_all_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        tokio::fs::write(&file, b"x").await.unwrap();

        let err = ensure_dir_all("creating directory", &file.join("sub")).await.unwrap_err();
        match err {
            Error::Io { op, path, .. } => {
                assert_eq!(op, "creating directory");
                assert_eq!(path, file.join("sub"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remove_file_logged() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.ts");
        tokio::fs::write(&file, b"x").await.unwrap();

        assert!(remove_file_logged(&file).await);
        assert!(!remove_file_logged(&file).await);
        assert!(!exists("checking file", &file).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exists_reports_stat_failures() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        tokio::fs::write(&file, b"x").await.unwrap();

        assert!(exists("checking file", &file).await.unwrap());
        let err = exists("checking file", &file.join("sub")).await.unwrap_err();
        assert!(matches!(err, Error::Io { op: "checking file", .. }), "{err}");
    }
}
