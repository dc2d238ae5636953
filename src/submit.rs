// src/submit.rs

//! Submission: translate manifest rows into sbatch invocations and record
//! the resulting job ids as pending state rows.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::batch::BatchManager;
use crate::config::model::{ConfigFile, Procedure, Scope};
use crate::manifest::TaskRow;
use crate::state::{AuditLog, StateRow, StateStore, Status};

/// Outcome counters for one submission batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubmitStats {
    /// Tasks submitted (or, in dry-run mode, that would have been).
    pub submitted: usize,
    /// Tasks whose submission failed; they reappear in the next manifest.
    pub failed: usize,
}

/// Job name: `<procedure>_<subject>` for subject scope,
/// `<procedure>_<subject>_<session>` for session scope.
pub fn build_job_name(procedure: &str, subject: &str, session: &str, scope: Scope) -> String {
    match scope {
        Scope::Subject => format!("{procedure}_{subject}"),
        Scope::Session => format!("{procedure}_{subject}_{session}"),
    }
}

/// Assemble the full sbatch argv for one task.
///
/// When a log directory is configured its per-procedure subdirectory is
/// created here, so sbatch never fails on a missing `--output` parent.
pub fn build_submit_argv(cfg: &ConfigFile, proc: &Procedure, task: &TaskRow) -> Result<Vec<String>> {
    let job_name = build_job_name(&task.procedure, &task.subject, &task.session, proc.scope);

    let mut argv: Vec<String> = vec!["sbatch".into()];
    if !cfg.batch_partition.is_empty() {
        argv.push(format!("--partition={}", cfg.batch_partition));
    }
    argv.push(format!("--account={}", cfg.batch_account));
    argv.push(format!("--job-name={job_name}"));
    if let Some(mem) = &cfg.batch_mem {
        argv.push(format!("--mem={mem}"));
    }
    if let Some(cpus) = cfg.batch_cpus {
        argv.push(format!("--cpus-per-task={cpus}"));
    }
    if let Some(log_dir) = &cfg.batch_log_dir {
        let log_subdir = log_dir.join(&task.procedure);
        std::fs::create_dir_all(&log_subdir)
            .with_context(|| format!("creating log directory {:?}", log_subdir))?;
        argv.push(format!("--output={}/{job_name}_%j.out", log_subdir.display()));
        argv.push(format!("--error={}/{job_name}_%j.err", log_subdir.display()));
    }

    argv.push(proc.script.clone());
    argv.push(task.subject.clone());
    if proc.scope == Scope::Session {
        argv.push(task.session.clone());
        argv.push(task.dicom_path.display().to_string());
    }

    Ok(argv)
}

/// Derived log file path for a recorded state row, mirroring the
/// `--output` flag passed at submission time.
pub fn log_file_path(cfg: &ConfigFile, row: &StateRow) -> Option<PathBuf> {
    let log_dir = cfg.batch_log_dir.as_ref()?;
    let scope = cfg
        .procedure(&row.procedure)
        .map(|p| p.scope)
        .unwrap_or(Scope::Session);
    let job_name = build_job_name(&row.procedure, &row.subject, &row.session, scope);
    Some(
        log_dir
            .join(&row.procedure)
            .join(format!("{job_name}_{}.out", row.job_id)),
    )
}

/// Submit every task in the manifest, sequentially and independently.
///
/// Each success appends a pending state row and persists the store before
/// the next submission, so a crash mid-pass cannot orphan recorded job ids.
/// Per-task failures are audited and counted, never fatal. In dry-run mode
/// the command is printed and audited instead, and no state row is written.
pub async fn submit_manifest(
    manifest: &[TaskRow],
    cfg: &ConfigFile,
    batch: &dyn BatchManager,
    state: &mut StateStore,
    audit: &AuditLog,
    dry_run: bool,
) -> Result<SubmitStats> {
    let mut stats = SubmitStats::default();

    for task in manifest {
        let proc = match cfg.procedure(&task.procedure) {
            Some(proc) => proc,
            None => {
                // Unreachable with a validated config.
                warn!(procedure = %task.procedure, "manifest row for unknown procedure");
                continue;
            }
        };

        let argv = match build_submit_argv(cfg, proc, task) {
            Ok(argv) => argv,
            Err(err) => {
                warn!(procedure = %task.procedure, subject = %task.subject, error = %err, "could not assemble submission");
                audit.error(&task.subject, &task.session, &task.procedure, &err.to_string());
                stats.failed += 1;
                continue;
            }
        };
        let command = argv.join(" ");

        if dry_run {
            info!(%command, "[dry-run] would submit");
            println!("[DRY RUN] Would submit: {command}");
            audit.dry_run(&task.subject, &task.session, &task.procedure, &command);
            stats.submitted += 1;
            continue;
        }

        info!(%command, "submitting");
        println!("Submitting: {command}");

        match batch.submit(&argv).await {
            Ok(job_id) => {
                audit.submitted(&task.subject, &task.session, &task.procedure, &job_id);
                state.push(StateRow {
                    subject: task.subject.clone(),
                    session: task.session.clone(),
                    procedure: task.procedure.clone(),
                    status: Status::Pending,
                    submitted_at: Utc::now(),
                    job_id,
                });
                // Persist after every success; losing a recorded job id to a
                // crash would resubmit it on the next pass.
                state.save()?;
                stats.submitted += 1;
            }
            Err(err) => {
                warn!(
                    procedure = %task.procedure,
                    subject = %task.subject,
                    error = %err,
                    "submission failed; task will be retried next pass"
                );
                audit.error(&task.subject, &task.session, &task.procedure, &err.to_string());
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}
