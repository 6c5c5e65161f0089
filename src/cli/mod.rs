//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Commands
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Workspace setup | `init` |
//! | Reload | Drive the loader | `refresh`, `refresh --all`, `teardown`, `watch` |
//! | Inspect | Read the graph | `check`, `graph`, `order`, `status` |
//! | State | Tracker bookkeeping | `clear` |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output; `NSTOOLS_LOG` sets the log
//! filter directly:
//! ```bash
//! nstools --verbose refresh
//! NSTOOLS_LOG=nstools=trace nstools refresh
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod inspect;
mod output;
mod reload;
mod watch;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
