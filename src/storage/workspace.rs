//! Workspace management
//!
//! Handles workspace initialization and provides access to the state store and
//! the source provider.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::config::WORKSPACE_DIR;
use super::{Config, DirectoryProvider, StateStore};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Not in an nstools workspace. Run 'nstools init' first.")]
    NotInWorkspace,

    #[error("Source directory does not exist: {}", .0.display())]
    MissingSourceDir(PathBuf),
}

const DEFAULT_CONFIG: &str = r#"# nstools configuration

# Directories scanned for source units, relative to this workspace
source_dirs = ["src"]

# Source unit extensions
extensions = ["clj", "cljc", "cljr"]

# Reader conditional features
features = ["cljr"]

# "content" hashes file contents, "mtime" compares modification times
fingerprint = "content"

[loader]
# Command receiving one JSON request on stdin per load or unload
command = []

[watch]
debounce_millis = 300
"#;

/// An nstools workspace
pub struct Workspace {
    root: PathBuf,
    config: Config,
}

impl Workspace {
    /// Opens an existing workspace at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(WORKSPACE_DIR).is_dir() {
            return Err(WorkspaceError::NotInWorkspace.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the workspace at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(WorkspaceError::NotInWorkspace)?;

        Self::open(root)
    }

    /// Initializes a workspace at the given path
    ///
    /// Existing configuration is left alone.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let dir = root.join(WORKSPACE_DIR);

        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {} directory: {}", WORKSPACE_DIR, dir.display()))?;

        let config_path = dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, "# Tracker state is local to each runtime\nstate.jsonl\n*.tmp\n")
                .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;
        }

        tracing::info!(root = %root.display(), "workspace initialized");
        Self::open(root)
    }

    /// Returns the workspace root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the `.nstools` directory path
    pub fn dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Returns the tracker state store
    pub fn state_store(&self) -> StateStore {
        StateStore::for_workspace(&self.root)
    }

    /// Absolute paths of the configured source directories
    pub fn source_dirs(&self) -> Vec<PathBuf> {
        self.config
            .project
            .source_dirs
            .iter()
            .map(|d| self.root.join(d))
            .collect()
    }

    /// Returns a provider over the configured source directories
    ///
    /// Fails if a configured directory is missing.
    pub fn provider(&self) -> Result<DirectoryProvider> {
        for dir in self.source_dirs() {
            if !dir.is_dir() {
                return Err(WorkspaceError::MissingSourceDir(dir).into());
            }
        }

        Ok(DirectoryProvider::new(&self.root, &self.config.project))
    }

    /// Returns a path relative to the workspace root
    pub fn relative_path(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(|p| p.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::config::FingerprintMode;
    use tempfile::TempDir;

    #[test]
    fn init_creates_structure() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::init(dir.path()).unwrap();

        assert!(ws.dir().is_dir());
        assert!(ws.dir().join("config.toml").is_file());
        assert!(ws.dir().join(".gitignore").is_file());
        assert_eq!(ws.config().project.fingerprint, FingerprintMode::Content);
    }

    #[test]
    fn default_config_file_parses_to_defaults() {
        let parsed: crate::storage::ProjectConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, crate::storage::ProjectConfig::default());
    }

    #[test]
    fn init_is_idempotent_and_keeps_config() {
        let dir = TempDir::new().unwrap();
        Workspace::init(dir.path()).unwrap();

        let config_path = dir.path().join(WORKSPACE_DIR).join("config.toml");
        fs::write(&config_path, "source_dirs = [\"lib\"]\n").unwrap();

        let ws = Workspace::init(dir.path()).unwrap();
        assert_eq!(ws.config().project.source_dirs, vec![PathBuf::from("lib")]);
    }

    #[test]
    fn open_non_workspace_fails() {
        let dir = TempDir::new().unwrap();
        let err = Workspace::open(dir.path()).err().unwrap();
        assert!(err.downcast_ref::<WorkspaceError>().is_some());
    }

    #[test]
    fn provider_requires_source_dirs() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::init(dir.path()).unwrap();
        assert!(ws.provider().is_err());

        fs::create_dir_all(dir.path().join("src")).unwrap();
        assert!(ws.provider().is_ok());
    }

    #[test]
    fn relative_path() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::init(dir.path()).unwrap();

        let abs_path = dir.path().join("src").join("a.clj");
        assert_eq!(ws.relative_path(&abs_path), Some(PathBuf::from("src/a.clj")));
    }
}
