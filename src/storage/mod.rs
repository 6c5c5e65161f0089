//! # Storage Layer
//!
//! Everything that touches the filesystem: configuration, the directory
//! source provider, and persisted tracker state.
//!
//! ## Workspace Structure
//!
//! ```text
//! .nstools/
//! ├── config.toml     # Workspace configuration
//! ├── state.jsonl     # One tracked namespace per line
//! └── .gitignore      # Ignores state
//! ```
//!
//! ## Concurrency Safety
//!
//! - [`StateStore`] uses file locking (`fs2`) for concurrent access
//! - State writes are atomic (temp file + rename)
//!
//! ## Key Types
//!
//! - [`Workspace`] - Entry point for accessing an nstools workspace
//! - [`DirectoryProvider`] - Scans source directories for source units
//! - [`StateStore`] - Read/write tracker state as JSONL
//! - [`Config`] - Workspace and global configuration

mod config;
mod scan;
mod state;
mod workspace;

pub use config::{
    Config, ConfigError, FingerprintMode, GlobalConfig, LoaderConfig, OutputFormat, ProjectConfig, WatchConfig,
    WORKSPACE_DIR,
};
pub use scan::DirectoryProvider;
pub use state::StateStore;
pub use workspace::{Workspace, WorkspaceError};
