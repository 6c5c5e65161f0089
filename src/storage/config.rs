//! Configuration handling for nstools
//!
//! Configuration is stored in `.nstools/config.toml` (workspace) and
//! `~/.config/nstools/config.toml` (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ReadOptions;

/// Name of the workspace directory
pub const WORKSPACE_DIR: &str = ".nstools";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// How a source unit's fingerprint is computed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// blake3 digest of the file contents
    #[default]
    Content,
    /// Modification time and length
    Mtime,
}

impl FingerprintMode {
    pub fn as_str(&self) -> &str {
        match self {
            FingerprintMode::Content => "content",
            FingerprintMode::Mtime => "mtime",
        }
    }
}

/// External loader process
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Program and arguments; one process is spawned per load or unload
    pub command: Vec<String>,
}

/// Configuration for `nstools watch`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a burst of file events triggers a refresh
    pub debounce_millis: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_millis: 300 }
    }
}

/// Workspace-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directories scanned for source units, relative to the workspace root
    pub source_dirs: Vec<PathBuf>,

    /// File extensions of source units, without the dot
    pub extensions: Vec<String>,

    /// Reader conditional features, in priority order
    pub features: Vec<String>,

    pub fingerprint: FingerprintMode,

    pub loader: LoaderConfig,

    pub watch: WatchConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            source_dirs: vec![PathBuf::from("src")],
            extensions: vec!["clj".to_string(), "cljc".to_string(), "cljr".to_string()],
            features: ReadOptions::default().features,
            fingerprint: FingerprintMode::Content,
            loader: LoaderConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Rejects settings no scan could work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_dirs.is_empty() {
            return Err(ConfigError::Invalid("source_dirs must not be empty".to_string()));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("extensions must not be empty".to_string()));
        }
        if let Some(ext) = self.extensions.iter().find(|e| e.is_empty() || e.starts_with('.')) {
            return Err(ConfigError::Invalid(format!(
                "extension '{}' must be non-empty and given without the dot",
                ext
            )));
        }
        if self.source_dirs.iter().any(|d| d.is_absolute()) {
            return Err(ConfigError::Invalid(
                "source_dirs must be relative to the workspace root".to_string(),
            ));
        }
        Ok(())
    }

    /// Reader options for declarations
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            features: self.features.clone(),
        }
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + workspace)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let project_root = std::env::current_dir().ok().and_then(|cwd| Self::find_root_from(&cwd));

        let project = match &project_root {
            Some(root) => Self::load_project_config(root)?,
            None => ProjectConfig::default(),
        };

        Ok(Self {
            project,
            global,
            project_root,
        })
    }

    /// Loads configuration for a specific workspace
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(project_root)?;

        Ok(Self {
            project,
            global,
            project_root: Some(project_root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "nstools", "nstools").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration, falling back to defaults
    pub fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads and validates workspace configuration
    pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(WORKSPACE_DIR).join("config.toml");

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project config")?;

        config
            .validate()
            .with_context(|| format!("In {}", config_path.display()))?;

        Ok(config)
    }

    /// Finds the workspace root by walking up from `start` looking for `.nstools/`
    pub fn find_root_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(WORKSPACE_DIR).is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Finds the workspace root from the current directory
    pub fn find_project_root() -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        Self::find_root_from(&cwd)
    }

    /// Returns the workspace root, or an error if not in a workspace
    pub fn require_project_root(&self) -> Result<&Path> {
        self.project_root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not in an nstools workspace. Run 'nstools init' first."))
    }

    /// Saves the workspace configuration
    pub fn save_project(&self) -> Result<()> {
        let root = self.require_project_root()?;
        let config_path = root.join(WORKSPACE_DIR).join("config.toml");

        let content =
            toml::to_string_pretty(&self.project).context("Failed to serialize project config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write project config: {}", config_path.display()))
    }
}
