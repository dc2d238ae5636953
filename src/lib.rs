// src/lib.rs

pub mod batch;
pub mod cli;
pub mod config;
pub mod discover;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod manifest;
pub mod monitor;
pub mod oracle;
pub mod rules;
pub mod state;
pub mod submit;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;

use crate::batch::SlurmBatch;
use crate::cli::{CliArgs, Command};
use crate::config::model::ConfigFile;
use crate::engine::{monitor_pass, retry_pass, run_pass, PassOptions};
use crate::manifest::{build_manifest, filter_in_flight};
use crate::rules::ForceOptions;
use crate::state::{StateRow, StateStore, Status};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, applies CLI overrides, and dispatches to
/// the requested subcommand. Nonzero exit is reserved for configuration
/// errors and invariant violations; per-task submission failures are
/// reported but do not fail the command.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = config::load_and_validate(&args.config)?;

    if let Some(mem) = args.batch_mem {
        cfg.batch_mem = Some(mem);
    }
    if let Some(cpus) = args.batch_cpus {
        cfg.batch_cpus = Some(cpus);
    }
    if let Some(dir) = args.batch_log_dir {
        cfg.batch_log_dir = Some(dir);
    }

    let batch = SlurmBatch::new(Duration::from_secs(cfg.batch_timeout_secs));

    match args.command {
        Command::Run {
            dry_run,
            force,
            procedure,
            skip_monitor,
        } => {
            let options = PassOptions {
                dry_run,
                force: ForceOptions {
                    force,
                    procedures: if force {
                        procedure.map(|name| vec![name])
                    } else {
                        None
                    },
                },
                skip_monitor,
            };
            cmd_run(&cfg, &batch, options).await
        }
        Command::Manifest => cmd_manifest(&cfg),
        Command::Status => cmd_status(&cfg),
        Command::Monitor => cmd_monitor(&cfg, &batch).await,
        Command::Retry { procedure, subject } => {
            cmd_retry(&cfg, procedure.as_deref(), subject.as_deref())
        }
    }
}

async fn cmd_run(cfg: &ConfigFile, batch: &SlurmBatch, options: PassOptions) -> Result<()> {
    let summary = run_pass(cfg, batch, &options).await?;

    println!("Found {} session(s).", summary.sessions);
    println!("  {} task(s) need processing.", summary.candidates);
    println!(
        "  {} task(s) after filtering in-flight jobs.",
        summary.after_filter
    );

    if summary.after_filter == 0 {
        println!("Nothing to submit.");
        return Ok(());
    }

    if options.dry_run {
        println!("[DRY RUN] Would submit {} job(s).", summary.stats.submitted);
    } else {
        println!(
            "Submitted {} job(s). State saved to {:?}.",
            summary.stats.submitted, cfg.state_file
        );
        if summary.stats.failed > 0 {
            println!(
                "{} submission(s) failed; they will be retried next run (see audit log).",
                summary.stats.failed
            );
        }
    }

    Ok(())
}

fn cmd_manifest(cfg: &ConfigFile) -> Result<()> {
    let sessions = discover::discover_sessions(cfg)?;
    let manifest = build_manifest(&sessions, cfg, &ForceOptions::none());
    let candidates = manifest.len();

    let state = StateStore::load(&cfg.state_file)?;
    let manifest = filter_in_flight(manifest, &state);

    if manifest.is_empty() {
        println!("No tasks pending.");
        return Ok(());
    }

    if candidates > manifest.len() {
        println!("{} task(s) in flight, not shown.", candidates - manifest.len());
    }
    println!(
        "{:<12} {:<18} {:<14} {:>8}",
        "subject", "session", "procedure", "priority"
    );
    for task in &manifest {
        println!(
            "{:<12} {:<18} {:<14} {:>8}",
            task.subject, task.session, task.procedure, task.priority
        );
    }

    Ok(())
}

fn cmd_status(cfg: &ConfigFile) -> Result<()> {
    let state = StateStore::load(&cfg.state_file)?;

    if state.is_empty() {
        println!("No state recorded yet.");
        return Ok(());
    }

    println!("Summary:");
    println!("{:<14} {:<10} {:>6}", "procedure", "status", "count");
    for (procedure, status, count) in status_breakdown(state.rows()) {
        println!("{procedure:<14} {status:<10} {count:>6}");
    }
    println!();

    let with_logs = cfg.batch_log_dir.is_some();
    if with_logs {
        println!(
            "{:<12} {:<18} {:<14} {:<10} {:<24} {:<10} {}",
            "subject", "session", "procedure", "status", "submitted_at", "job_id", "log_path"
        );
    } else {
        println!(
            "{:<12} {:<18} {:<14} {:<10} {:<24} {}",
            "subject", "session", "procedure", "status", "submitted_at", "job_id"
        );
    }
    for row in state.rows() {
        let submitted_at = row.submitted_at.format("%Y-%m-%dT%H:%M:%SZ");
        if with_logs {
            let log_path = submit::log_file_path(cfg, row)
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!(
                "{:<12} {:<18} {:<14} {:<10} {:<24} {:<10} {}",
                row.subject, row.session, row.procedure, row.status, submitted_at, row.job_id,
                log_path
            );
        } else {
            println!(
                "{:<12} {:<18} {:<14} {:<10} {:<24} {}",
                row.subject, row.session, row.procedure, row.status, submitted_at, row.job_id
            );
        }
    }

    Ok(())
}

async fn cmd_monitor(cfg: &ConfigFile, batch: &SlurmBatch) -> Result<()> {
    let before = StateStore::load(&cfg.state_file)?;
    if before.is_empty() {
        println!("No state recorded yet.");
        return Ok(());
    }

    let summary = monitor_pass(cfg, batch).await?;
    let transitions = summary.polled + summary.reconciled;

    if transitions == 0 {
        println!("No status changes.");
    } else {
        println!(
            "Updated {} job status(es) ({} from the batch manager, {} from disk).",
            transitions, summary.polled, summary.reconciled
        );
    }

    let state = StateStore::load(&cfg.state_file)?;
    println!("{:<14} {:<10} {:>6}", "procedure", "status", "count");
    for (procedure, status, count) in status_breakdown(state.rows()) {
        println!("{procedure:<14} {status:<10} {count:>6}");
    }

    Ok(())
}

fn cmd_retry(cfg: &ConfigFile, procedure: Option<&str>, subject: Option<&str>) -> Result<()> {
    let cleared = retry_pass(cfg, procedure, subject)?;

    if cleared == 0 {
        println!("No matching failed entries found.");
    } else {
        println!("Cleared {cleared} failed entry/entries. They will be retried on the next run.");
    }

    Ok(())
}

/// Per-(procedure, status) counts in first-appearance order.
fn status_breakdown(rows: &[StateRow]) -> Vec<(String, Status, usize)> {
    let mut order: Vec<(String, Status)> = Vec::new();
    let mut counts: HashMap<(String, Status), usize> = HashMap::new();

    for row in rows {
        let key = (row.procedure.clone(), row.status);
        if !counts.contains_key(&key) {
            order.push(key.clone());
        }
        *counts.entry(key).or_insert(0) += 1;
    }

    order
        .into_iter()
        .map(|key| {
            let count = counts[&key];
            (key.0, key.1, count)
        })
        .collect()
}
