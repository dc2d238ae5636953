// tests/monitor_reconcile.rs

//! Monitor and Reconcile: batch-state mapping, status transitions, and the
//! filesystem fallback when the batch manager has forgotten a job.

mod common;

use std::error::Error;
use std::fs;

use chrono::Utc;
use tempfile::TempDir;

use bidsflow::batch::parse_job_id;
use bidsflow::batch::slurm::parse_sacct_output;
use bidsflow::monitor::{map_batch_state, reconcile_with_filesystem, update_from_batch};
use bidsflow::state::{AuditLog, StateRow, StateStore, Status};
use common::{add_bids_t1w, test_config, two_step_procedures, FakeBatch, UnavailableBatch};

type TestResult = Result<(), Box<dyn Error>>;

fn row(subject: &str, session: &str, procedure: &str, status: Status, job_id: &str) -> StateRow {
    StateRow {
        subject: subject.into(),
        session: session.into(),
        procedure: procedure.into(),
        status,
        submitted_at: Utc::now(),
        job_id: job_id.into(),
    }
}

#[test]
fn batch_state_mapping_table() {
    assert_eq!(map_batch_state("PENDING"), Some(Status::Pending));
    assert_eq!(map_batch_state("RUNNING"), Some(Status::Running));
    assert_eq!(map_batch_state("COMPLETED"), Some(Status::Complete));
    assert_eq!(map_batch_state("FAILED"), Some(Status::Failed));
    assert_eq!(map_batch_state("TIMEOUT"), Some(Status::Failed));
    assert_eq!(map_batch_state("CANCELLED"), Some(Status::Failed));
    assert_eq!(map_batch_state("CANCELLED by 1234"), Some(Status::Failed));
    assert_eq!(map_batch_state("OUT_OF_MEMORY"), Some(Status::Failed));
    assert_eq!(map_batch_state("NODE_FAIL"), Some(Status::Failed));
    assert_eq!(map_batch_state("REQUEUED"), None);
    assert_eq!(map_batch_state(""), None);
}

#[test]
fn sacct_output_parsing_skips_substeps_and_normalizes() {
    let parsed = parse_sacct_output(
        "100|RUNNING\n100.batch|RUNNING\n100.0|RUNNING\n101|CANCELLED+ by user\n102|COMPLETED\n\n",
    );
    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed["100"], "RUNNING");
    assert_eq!(parsed["101"], "CANCELLED");
    assert_eq!(parsed["102"], "COMPLETED");
}

#[test]
fn job_id_parsing_takes_the_trailing_numeric_token() {
    assert_eq!(parse_job_id("Submitted batch job 12345"), Some("12345".into()));
    assert_eq!(parse_job_id("12345"), Some("12345".into()));
    assert_eq!(parse_job_id("Submitted batch job abc"), None);
    assert_eq!(parse_job_id(""), None);
}

#[tokio::test]
async fn monitor_applies_polled_transitions() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    let audit = AuditLog::new(cfg.audit_log_path());

    let mut state = StateStore::load(&cfg.state_file)?;
    state.push(row("sub-0001", "ses-01", "bids", Status::Pending, "100"));
    state.push(row("sub-0002", "ses-02", "bids", Status::Pending, "101"));
    state.push(row("sub-0003", "ses-03", "bids", Status::Running, "102"));
    state.push(row("sub-0004", "ses-04", "bids", Status::Complete, "103"));

    let batch = FakeBatch::new();
    batch.set_state("100", "RUNNING");
    batch.set_state("101", "CANCELLED");
    batch.set_state("102", "RUNNING"); // unchanged
    batch.set_state("103", "FAILED"); // not in flight; never queried

    let transitions = update_from_batch(&mut state, &batch, &audit).await;
    assert_eq!(transitions, 2);

    assert_eq!(state.rows()[0].status, Status::Running);
    assert_eq!(state.rows()[1].status, Status::Failed);
    assert_eq!(state.rows()[2].status, Status::Running);
    assert_eq!(state.rows()[3].status, Status::Complete);

    let audit_contents = fs::read_to_string(cfg.audit_log_path())?;
    assert_eq!(
        audit_contents
            .lines()
            .filter(|l| l.contains("\"event\":\"status_change\""))
            .count(),
        2
    );
    assert!(audit_contents.contains("\"old_status\":\"pending\""));
    assert!(audit_contents.contains("\"new_status\":\"failed\""));
    Ok(())
}

#[tokio::test]
async fn unknown_batch_states_leave_rows_unchanged() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    let audit = AuditLog::new(cfg.audit_log_path());

    let mut state = StateStore::load(&cfg.state_file)?;
    state.push(row("sub-0001", "ses-01", "bids", Status::Pending, "100"));

    let batch = FakeBatch::new();
    batch.set_state("100", "REQUEUED");

    let transitions = update_from_batch(&mut state, &batch, &audit).await;
    assert_eq!(transitions, 0);
    assert_eq!(state.rows()[0].status, Status::Pending);
    Ok(())
}

#[tokio::test]
async fn step_separator_job_ids_are_never_queried() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    let audit = AuditLog::new(cfg.audit_log_path());

    let mut state = StateStore::load(&cfg.state_file)?;
    state.push(row("sub-0001", "ses-01", "bids", Status::Pending, "100.batch"));

    let batch = FakeBatch::new();
    batch.set_state("100.batch", "COMPLETED");

    let transitions = update_from_batch(&mut state, &batch, &audit).await;
    assert_eq!(transitions, 0);
    assert_eq!(state.rows()[0].status, Status::Pending);
    Ok(())
}

#[tokio::test]
async fn unavailable_batch_manager_changes_nothing() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    let audit = AuditLog::new(cfg.audit_log_path());

    let mut state = StateStore::load(&cfg.state_file)?;
    state.push(row("sub-0001", "ses-01", "bids", Status::Pending, "100"));
    state.push(row("sub-0002", "ses-02", "bids", Status::Running, "101"));

    let transitions = update_from_batch(&mut state, &UnavailableBatch, &audit).await;
    assert_eq!(transitions, 0);
    assert_eq!(state.rows()[0].status, Status::Pending);
    assert_eq!(state.rows()[1].status, Status::Running);
    Ok(())
}

#[test]
fn reconcile_promotes_rows_whose_output_is_on_disk() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    let audit = AuditLog::new(cfg.audit_log_path());

    // sub-0001's bids output is complete on disk; sub-0002's is not.
    add_bids_t1w(&cfg, "sub-0001", "ses-01");

    let mut state = StateStore::load(&cfg.state_file)?;
    state.push(row("sub-0001", "ses-01", "bids", Status::Running, "100"));
    state.push(row("sub-0002", "ses-02", "bids", Status::Running, "101"));

    let transitions = reconcile_with_filesystem(&mut state, &cfg, &audit);
    assert_eq!(transitions, 1);
    assert_eq!(state.rows()[0].status, Status::Complete);
    assert_eq!(state.rows()[1].status, Status::Running);

    // Idempotent: nothing new on disk, nothing changes.
    let transitions = reconcile_with_filesystem(&mut state, &cfg, &audit);
    assert_eq!(transitions, 0);
    Ok(())
}

#[test]
fn reconcile_resolves_subject_scoped_output_paths() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    let audit = AuditLog::new(cfg.audit_log_path());

    let scripts = cfg
        .derivatives_root
        .join("recon")
        .join("sub-0001")
        .join("scripts");
    fs::create_dir_all(&scripts)?;
    fs::write(scripts.join("done"), b"")?;

    let mut state = StateStore::load(&cfg.state_file)?;
    state.push(row("sub-0001", "", "recon", Status::Pending, "100"));

    let transitions = reconcile_with_filesystem(&mut state, &cfg, &audit);
    assert_eq!(transitions, 1);
    assert_eq!(state.rows()[0].status, Status::Complete);
    Ok(())
}
