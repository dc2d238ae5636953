// src/engine/pass.rs

//! Pass orchestration.
//!
//! A pass is one short sequential transaction:
//! Discover → Monitor → Reconcile → Build Manifest → Filter In-flight →
//! Submit → Persist. All state mutation funnels through here so the CLI
//! layer only formats results.

use anyhow::{Context, Result};
use tracing::info;

use crate::batch::BatchManager;
use crate::config::model::ConfigFile;
use crate::discover::discover_sessions;
use crate::manifest::{build_manifest, filter_in_flight};
use crate::monitor;
use crate::rules::ForceOptions;
use crate::state::{AuditLog, StateStore};
use crate::submit::{submit_manifest, SubmitStats};

/// Options for a `run` pass.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    pub dry_run: bool,
    pub force: ForceOptions,
    /// Skip the pre-submission batch poll and filesystem reconcile.
    pub skip_monitor: bool,
}

/// What one `run` pass did.
#[derive(Debug, Clone, Copy)]
pub struct PassSummary {
    pub sessions: usize,
    /// Manifest size before the in-flight filter.
    pub candidates: usize,
    /// Manifest size after the in-flight filter.
    pub after_filter: usize,
    pub stats: SubmitStats,
}

/// What a monitor pass did.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSummary {
    /// Transitions applied from batch-manager polling.
    pub polled: usize,
    /// Transitions applied from filesystem reconciliation.
    pub reconciled: usize,
}

/// Execute one full scheduler pass.
pub async fn run_pass(
    cfg: &ConfigFile,
    batch: &dyn BatchManager,
    options: &PassOptions,
) -> Result<PassSummary> {
    let audit = AuditLog::new(cfg.audit_log_path());

    let sessions = discover_sessions(cfg).context("discovering sessions")?;

    let mut state = StateStore::load(&cfg.state_file)?;

    if !options.skip_monitor {
        let polled = monitor::update_from_batch(&mut state, batch, &audit).await;
        let reconciled = monitor::reconcile_with_filesystem(&mut state, cfg, &audit);
        if polled + reconciled > 0 {
            state.save().context("persisting monitored state")?;
        }
    }

    let manifest = build_manifest(&sessions, cfg, &options.force);
    let candidates = manifest.len();
    let manifest = filter_in_flight(manifest, &state);
    let after_filter = manifest.len();

    info!(
        sessions = sessions.len(),
        candidates,
        after_filter,
        dry_run = options.dry_run,
        "pass manifest ready"
    );

    let stats = submit_manifest(&manifest, cfg, batch, &mut state, &audit, options.dry_run).await?;

    // Submission already persists incrementally; this final save is a no-op
    // unless the manifest was empty.
    if !options.dry_run {
        state.save().context("persisting state store")?;
    }

    Ok(PassSummary {
        sessions: sessions.len(),
        candidates,
        after_filter,
        stats,
    })
}

/// Poll the batch manager and reconcile against the filesystem, persisting
/// any transitions.
pub async fn monitor_pass(cfg: &ConfigFile, batch: &dyn BatchManager) -> Result<MonitorSummary> {
    let audit = AuditLog::new(cfg.audit_log_path());
    let mut state = StateStore::load(&cfg.state_file)?;

    let polled = monitor::update_from_batch(&mut state, batch, &audit).await;
    let reconciled = monitor::reconcile_with_filesystem(&mut state, cfg, &audit);

    if polled + reconciled > 0 {
        state.save().context("persisting monitored state")?;
    }

    Ok(MonitorSummary { polled, reconciled })
}

/// Remove failed state rows (optionally filtered) so the next pass can
/// re-queue them. Returns how many rows were cleared.
pub fn retry_pass(
    cfg: &ConfigFile,
    procedure: Option<&str>,
    subject: Option<&str>,
) -> Result<usize> {
    let audit = AuditLog::new(cfg.audit_log_path());
    let mut state = StateStore::load(&cfg.state_file)?;

    let removed = state.take_failed(procedure, subject);
    if removed.is_empty() {
        return Ok(0);
    }

    for row in &removed {
        info!(
            subject = %row.subject,
            session = %row.session,
            procedure = %row.procedure,
            job_id = %row.job_id,
            "cleared failed entry for retry"
        );
        audit.retry_cleared(row);
    }

    state.save().context("persisting state store")?;
    Ok(removed.len())
}
