// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `routeweave`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "routeweave",
    version,
    about = "Drive many accounts through a dependency-aware task catalogue.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, global = true, value_name = "PATH", default_value = "Routeweave.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ROUTEWEAVE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Execute scheduling passes until nothing is eligible.
    Run {
        /// Run a single pass and exit.
        #[arg(long)]
        once: bool,

        /// Stop after this many passes.
        #[arg(long, value_name = "N")]
        max_passes: Option<usize>,
    },
    /// Create or extend the route of every account.
    Generate,
    /// Print the task breakdown of every route.
    Routes,
    /// Print per-account statistics and the summary.
    Stats,
    /// Print the compiled module order without touching the store.
    Plan,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
