//! Scoped temporary files for source and converted documents.
//!
//! A [`ScopedTempFile`] deletes its file when dropped, so a request that
//! fails half-way never leaks its temp files. After a successful request the
//! pipeline calls [`ScopedTempFile::release`] to delete them explicitly and
//! log any failure.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

/// File name prefix of every temp file.
pub const TEMP_PREFIX: &str = "docconv-";

/// Allocates scoped temp files in one directory.
#[derive(Debug, Clone)]
pub struct TempFileManager {
    dir: PathBuf,
}

impl Default for TempFileManager {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl TempFileManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an empty file named `docconv-<random>.<extension>`.
    ///
    /// The engine derives the input format from the extension, so it is
    /// kept. An empty extension yields a name without a dot.
    pub async fn acquire(&self, extension: &str) -> io::Result<ScopedTempFile> {
        let dir = self.dir.clone();
        let suffix = if extension.is_empty() {
            String::new()
        } else {
            format!(".{extension}")
        };

        let path = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .suffix(&suffix)
                .tempfile_in(&dir)
                .map(|file| file.into_temp_path())
        })
        .await
        .map_err(io::Error::other)??;

        debug!(path = %path.display(), "Temp file allocated");
        Ok(ScopedTempFile { path })
    }

    /// Take ownership of a file created by someone else (the engine's output).
    pub fn adopt(&self, path: impl Into<PathBuf>) -> ScopedTempFile {
        ScopedTempFile {
            path: TempPath::from_path(path.into()),
        }
    }
}

/// A temp file deleted on drop.
#[derive(Debug)]
pub struct ScopedTempFile {
    path: TempPath,
}

impl ScopedTempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. Failures are logged, never returned.
    pub async fn release(self) {
        let shown = self.path.display().to_string();
        let path = self.path;
        match tokio::task::spawn_blocking(move || path.close()).await {
            Ok(Ok(())) => debug!(path = %shown, "Temp file released"),
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %shown, "Temp file already gone")
            }
            Ok(Err(e)) => warn!(path = %shown, "Failed to release temp file: {}", e),
            Err(e) => warn!(path = %shown, "Temp file release task failed: {}", e),
        }
    }
}
