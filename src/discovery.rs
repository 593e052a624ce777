//! Media file discovery

use crate::{PipelineError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A source recording found by discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    path: PathBuf,
    discovered_at: DateTime<Local>,
}

// Identity is the path alone
impl PartialEq for MediaFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for MediaFile {}

impl std::hash::Hash for MediaFile {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl MediaFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            discovered_at: Local::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn discovered_at(&self) -> DateTime<Local> {
        self.discovered_at
    }

    /// Sibling path with the extension replaced, e.g. `talk.mp4` -> `talk.srt`
    pub fn sibling_with_extension(&self, extension: &str) -> PathBuf {
        self.path.with_extension(extension)
    }

    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Check that a file exists and can be opened for reading
pub fn verify_file_exists(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => File::open(path).is_ok(),
        Ok(_) => false,
        Err(e) => {
            debug!("Cannot stat {}: {}", path.display(), e);
            false
        }
    }
}

/// Recursive media discovery filtered by extension and readability
#[derive(Debug, Clone)]
pub struct MediaDiscovery {
    /// Lowercase extensions without the leading dot
    supported_extensions: Vec<String>,
}

impl MediaDiscovery {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            supported_extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn supported_extensions(&self) -> &[String] {
        &self.supported_extensions
    }

    /// Check if a path has a supported media extension
    pub fn is_media_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.supported_extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Walk `root` recursively and return every readable media file.
    ///
    /// Order follows the directory traversal and is not sorted. A missing root
    /// is run-fatal; unreadable files and directories are skipped with a warning.
    pub fn discover(&self, root: &Path) -> Result<Vec<MediaFile>> {
        let root = root
            .canonicalize()
            .map_err(|e| PipelineError::RunFatal(format!("Root folder {} is not accessible: {}", root.display(), e)))?;

        if !root.is_dir() {
            return Err(PipelineError::RunFatal(format!("{} is not a directory", root.display())));
        }

        info!("🔍 Discovering media files under {}", root.display());

        let mut media_files = Vec::new();

        for entry in WalkDir::new(&root).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Error walking directory {}: {}", root.display(), e);
                    continue;
                }
            };

            if entry.file_type().is_dir() || !self.is_media_file(entry.path()) {
                continue;
            }

            if verify_file_exists(entry.path()) {
                media_files.push(MediaFile::new(entry.into_path()));
            } else {
                warn!("Found media file but cannot access: {}", entry.path().display());
            }
        }

        info!("📹 Found {} media files", media_files.len());
        Ok(media_files)
    }

    /// Resolve a single user-supplied file, warning when its extension is not a
    /// supported one. Unreadable files are run-fatal.
    pub fn single_file(&self, path: &Path) -> Result<MediaFile> {
        if !verify_file_exists(path) {
            return Err(PipelineError::RunFatal(format!("Could not access file {}", path.display())));
        }

        if !self.is_media_file(path) {
            warn!(
                "{} does not have a supported extension ({}). Proceeding anyway...",
                path.display(),
                self.supported_extensions.join(", ")
            );
        }

        let path = path.canonicalize()?;
        Ok(MediaFile::new(path))
    }
}

impl Default for MediaDiscovery {
    fn default() -> Self {
        Self::new(&crate::config::ProcessingConfig::default().supported_extensions)
    }
}
