// src/monitor.rs

//! Status convergence between passes.
//!
//! Monitor polls the batch manager for every in-flight row; Reconcile then
//! re-checks the filesystem for whatever is still in flight, covering jobs
//! the batch manager has forgotten (retention window, renumbering, work
//! done out-of-band). Monitor always runs before Reconcile; together they
//! are idempotent.

use tracing::info;

use crate::batch::BatchManager;
use crate::config::model::ConfigFile;
use crate::oracle::{self, OracleCtx};
use crate::state::{AuditLog, StateStore, Status};

/// Map a raw batch-manager state string to an internal status.
///
/// Unknown states return `None` and leave the row untouched, so new
/// scheduler state strings never break a pass.
pub fn map_batch_state(raw: &str) -> Option<Status> {
    match raw {
        "PENDING" => Some(Status::Pending),
        "RUNNING" => Some(Status::Running),
        "COMPLETED" => Some(Status::Complete),
        "FAILED" | "TIMEOUT" | "OUT_OF_MEMORY" | "NODE_FAIL" => Some(Status::Failed),
        s if s.starts_with("CANCELLED") => Some(Status::Failed),
        _ => None,
    }
}

/// Poll the batch manager and update any in-flight row whose state changed.
///
/// Job ids containing a step separator (`.`) are skipped. An unavailable
/// batch manager yields an empty query result and leaves every row
/// unchanged. Returns the number of transitions applied.
pub async fn update_from_batch(
    state: &mut StateStore,
    batch: &dyn BatchManager,
    audit: &AuditLog,
) -> usize {
    let in_flight = state.in_flight_indices();

    let job_ids: Vec<String> = in_flight
        .iter()
        .map(|&idx| state.rows()[idx].job_id.clone())
        .filter(|id| !id.is_empty() && !id.contains('.'))
        .collect();
    if job_ids.is_empty() {
        return 0;
    }

    let polled = batch.query(&job_ids).await;
    if polled.is_empty() {
        return 0;
    }

    let mut transitions = 0;
    for idx in in_flight {
        let row = &state.rows()[idx];
        let new_status = match polled.get(&row.job_id).and_then(|raw| map_batch_state(raw)) {
            Some(status) => status,
            None => continue,
        };
        let old_status = row.status;
        if new_status == old_status {
            continue;
        }

        info!(
            job_id = %row.job_id,
            subject = %row.subject,
            session = %row.session,
            procedure = %row.procedure,
            old = %old_status,
            new = %new_status,
            "job status changed"
        );
        audit.status_change(row, old_status, new_status);
        state.set_status(idx, new_status);
        transitions += 1;
    }

    transitions
}

/// Promote in-flight rows to complete when their output is present on disk.
///
/// Returns the number of transitions applied.
pub fn reconcile_with_filesystem(
    state: &mut StateStore,
    cfg: &ConfigFile,
    audit: &AuditLog,
) -> usize {
    let mut transitions = 0;

    for idx in state.in_flight_indices() {
        let row = &state.rows()[idx];
        let proc = match cfg.procedure(&row.procedure) {
            Some(proc) => proc,
            None => continue,
        };
        let output_path = cfg.output_path(proc, &row.subject, &row.session);
        let ctx = OracleCtx {
            bids_root: &cfg.bids_root,
            derivatives_root: &cfg.derivatives_root,
            subject: &row.subject,
        };

        if !oracle::is_complete(proc, &output_path, &ctx) {
            continue;
        }

        let old_status = row.status;
        info!(
            subject = %row.subject,
            session = %row.session,
            procedure = %row.procedure,
            old = %old_status,
            "output complete on disk; reconciling"
        );
        audit.status_change(row, old_status, Status::Complete);
        state.set_status(idx, Status::Complete);
        transitions += 1;
    }

    transitions
}
