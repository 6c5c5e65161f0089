//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{inspect, reload, watch};
use crate::storage::{Config, Workspace};

#[derive(Parser)]
#[command(name = "nstools")]
#[command(author, version, about = "Namespace dependency tracking and selective reload")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new nstools workspace
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Reload changed namespaces and their dependents
    Refresh {
        /// Reload every namespace, not only changed ones
        #[arg(long)]
        all: bool,

        /// Show the plan without loading anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Check source units for dependency cycles
    Check,

    /// Print the dependency graph
    Graph {
        /// Show only this namespace's dependencies and dependents
        namespace: Option<String>,

        /// Emit Graphviz dot
        #[arg(long, conflicts_with = "namespace")]
        dot: bool,
    },

    /// Print the load order
    Order,

    /// Show load state of tracked namespaces
    Status,

    /// Forget tracked state without unloading
    Clear,

    /// Unload every loaded namespace and forget tracked state
    Teardown,

    /// Refresh whenever source units change
    Watch {
        /// Debounce window in milliseconds (overrides config)
        #[arg(long)]
        debounce: Option<u64>,
    },
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = match cli.format {
        Some(format) => format,
        None => Config::load_global()?.default_format.into(),
    };
    let output = Output::new(format, cli.verbose);

    output.verbose("nstools starting");

    match cli.command {
        Commands::Init { path } => {
            output.verbose_ctx("init", &format!("Initializing workspace at: {}", path));
            let workspace = Workspace::init(&path)?;
            output.verbose_ctx("init", &format!("Created {}", workspace.dir().display()));
            output.success(&format!(
                "Initialized nstools workspace at {}",
                workspace.root().display()
            ));
        }

        Commands::Refresh { all, dry_run } => {
            output.verbose_ctx("refresh", &format!("all={}, dry_run={}", all, dry_run));
            reload::refresh(&output, all, dry_run)?
        }

        Commands::Check => inspect::check(&output)?,

        Commands::Graph { namespace, dot } => match namespace {
            Some(name) => inspect::graph_of(&output, &name)?,
            None => inspect::graph(&output, dot)?,
        },

        Commands::Order => inspect::order(&output)?,

        Commands::Status => inspect::status(&output)?,

        Commands::Clear => reload::clear(&output)?,

        Commands::Teardown => reload::teardown(&output)?,

        Commands::Watch { debounce } => watch::run(&output, debounce)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}

/// Installs the stderr log subscriber; `NSTOOLS_LOG` overrides the level
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("NSTOOLS_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("nstools={}", default_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
