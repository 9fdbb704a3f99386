//! Scriptor CLI: compile, load and register workspace capability scripts.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;
mod formatter;
mod theme;

use commands::{compile, config, resolve, scan};
use formatter::OutputFormat;

/// Scriptor - dynamic script loader
#[derive(Parser)]
#[command(name = "scriptor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty (default) or json
    #[arg(long, global = true, default_value = "pretty")]
    format: String,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true, env = "SCRIPTOR_WORKSPACE")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, compile, load and register capability scripts
    Scan,

    /// Show how a specifier resolves
    Resolve {
        /// Module specifier, e.g. `lodash` or `./util`
        specifier: String,

        /// File the specifier is required from (defaults to the scan directory)
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Compile one entry script and report diagnostics
    Compile {
        /// Entry script to compile
        file: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Include which layer set each field
        #[arg(long)]
        sources: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace_root = match cli.workspace {
        Some(ref path) => path.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    // Load unified config for logging setup.
    let resolved = scriptor_config::Config::load(Some(&workspace_root));
    let fallback = || {
        let level = if cli.verbose { "debug" } else { "info" };
        scriptor_telemetry::LogConfig::new(level)
            .with_format(scriptor_telemetry::LogFormat::Compact)
    };
    let log_config = match resolved.as_ref().map(|r| config_bridge::to_log_config(&r.config)) {
        Ok(Ok(mut lc)) => {
            if cli.verbose {
                "debug".clone_into(&mut lc.level);
            }
            lc
        },
        Ok(Err(e)) => {
            eprintln!("Invalid logging configuration, using defaults: {e}");
            fallback()
        },
        Err(_) => fallback(),
    };
    if let Err(e) = scriptor_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let format: OutputFormat = cli
        .format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let resolved = resolved.context("failed to load configuration")?;
    tracing::debug!(
        workspace = %workspace_root.display(),
        files = resolved.loaded_files.len(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Scan => scan::run(&resolved.config, &workspace_root, format).await,
        Commands::Resolve { specifier, from } => {
            resolve::run(&resolved.config, &workspace_root, &specifier, from, format)
        },
        Commands::Compile { file } => {
            compile::run(&resolved.config, &workspace_root, &file, format)
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { sources } => config::show(&resolved, sources, format),
        },
    }
}
