// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! NOTE: this expects `clap` to be built with the `derive` feature, e.g.:
//! `clap = { version = "4.5.53", features = ["derive"] }` in `Cargo.toml`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `bidsflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bidsflow",
    version,
    about = "Rule-based Slurm scheduler for BIDS neuroimaging pipelines.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Bidsflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BIDSFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Memory limit for batch jobs (e.g. 32G). Overrides the config file.
    #[arg(long, value_name = "MEM")]
    pub batch_mem: Option<String>,

    /// CPUs per task for batch jobs. Overrides the config file.
    #[arg(long, value_name = "N")]
    pub batch_cpus: Option<u32>,

    /// Directory for batch stdout/stderr logs. Overrides the config file.
    #[arg(long, value_name = "DIR")]
    pub batch_log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Discover sessions, evaluate rules, and submit jobs.
    Run {
        /// Print what would be submitted without submitting.
        #[arg(long)]
        dry_run: bool,

        /// Re-queue procedures even when their output is already complete.
        #[arg(long)]
        force: bool,

        /// Limit --force to a single procedure (e.g. bids). Ignored
        /// without --force.
        #[arg(long, value_name = "NAME")]
        procedure: Option<String>,

        /// Skip the pre-run batch poll and filesystem reconcile.
        #[arg(long)]
        skip_monitor: bool,
    },

    /// Show the current task manifest without submitting.
    Manifest,

    /// Show recorded job state (pending/running/complete/failed).
    Status,

    /// Poll the batch manager, reconcile statuses, and save the state file.
    Monitor,

    /// Remove failed state entries so they are retried on the next run.
    Retry {
        /// Procedure name to retry (e.g. bids).
        #[arg(long, value_name = "NAME")]
        procedure: Option<String>,

        /// Subject to retry (e.g. sub-0001).
        #[arg(long, value_name = "SUB")]
        subject: Option<String>,
    },
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
