//! Directory-backed source provider
//!
//! Walks the configured source directories for files with a source extension.
//! Hidden files and directories are skipped. Unit paths are relative to the
//! workspace root so persisted state survives moving the checkout.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::domain::{decode_decl, Fingerprint, ReadOptions, SourceError, SourceProvider, SourceUnit};

use super::config::{FingerprintMode, ProjectConfig};

/// Source provider over directories on disk
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
    source_dirs: Vec<PathBuf>,
    extensions: Vec<String>,
    mode: FingerprintMode,
    options: ReadOptions,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>, config: &ProjectConfig) -> Self {
        Self {
            root: root.into(),
            source_dirs: config.source_dirs.clone(),
            extensions: config.extensions.clone(),
            mode: config.fingerprint,
            options: config.read_options(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns true if `path` looks like a source unit this provider would list
    pub fn is_source(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let hidden = relative
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));

        !hidden && self.source_dirs.iter().any(|d| relative.starts_with(d)) && self.has_extension(path)
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|x| x == ext))
    }

    fn walk(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SourceError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| SourceError::List(format!("{}: {}", dir.display(), e)))?;

        for entry in entries {
            let entry = entry.map_err(|e| SourceError::List(format!("{}: {}", dir.display(), e)))?;
            let path = entry.path();

            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let file_type = entry
                .file_type()
                .map_err(|e| SourceError::List(format!("{}: {}", path.display(), e)))?;

            if file_type.is_dir() {
                self.walk(&path, out)?;
            } else if self.has_extension(&path) {
                let relative = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();
                out.push(relative);
            }
        }

        Ok(())
    }

    fn fingerprint(&self, full: &Path, bytes: &[u8]) -> Result<Fingerprint, SourceError> {
        match self.mode {
            FingerprintMode::Content => Ok(Fingerprint::of_content(bytes)),
            FingerprintMode::Mtime => {
                let meta = fs::metadata(full).map_err(|e| SourceError::Io {
                    path: full.to_path_buf(),
                    message: e.to_string(),
                })?;
                let nanos = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .unwrap_or(0);
                Ok(Fingerprint::new(format!("{}-{}", nanos, meta.len())))
            }
        }
    }
}

impl SourceProvider for DirectoryProvider {
    fn list(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut paths = Vec::new();
        for dir in &self.source_dirs {
            let full = self.root.join(dir);
            if !full.is_dir() {
                tracing::warn!(dir = %full.display(), "source directory missing, skipping");
                continue;
            }
            self.walk(&full, &mut paths)?;
        }
        paths.sort();
        paths.dedup();
        tracing::debug!(units = paths.len(), "scanned source directories");
        Ok(paths)
    }

    fn read(&self, path: &Path) -> Result<Option<SourceUnit>, SourceError> {
        let full = self.root.join(path);
        let bytes = fs::read(&full).map_err(|e| SourceError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let text = String::from_utf8_lossy(&bytes);

        let Some(decl) = decode_decl(path, &text, &self.options)? else {
            return Ok(None);
        };
        let fingerprint = self.fingerprint(&full, &bytes)?;

        Ok(Some(SourceUnit::new(path, decl, fingerprint)))
    }
}
