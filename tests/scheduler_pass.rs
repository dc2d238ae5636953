// tests/scheduler_pass.rs

//! Full pass behaviour: submit, dedupe, converge, retry.

mod common;

use std::error::Error;
use std::fs;

use chrono::Utc;
use tempfile::TempDir;

use bidsflow::engine::{monitor_pass, retry_pass, run_pass, PassOptions};
use bidsflow::state::{StateRow, StateStore, Status};
use common::{
    add_bids_t1w, add_dicom_session, test_config, two_step_procedures, FakeBatch,
    UnavailableBatch,
};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn fresh_session_is_submitted_once() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    add_dicom_session(&cfg, "sub-0001", "ses-202407110849");

    let batch = FakeBatch::new();
    let summary = run_pass(&cfg, &batch, &PassOptions::default()).await?;

    assert_eq!(summary.sessions, 1);
    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.after_filter, 1);
    assert_eq!(summary.stats.submitted, 1);

    let state = StateStore::load(&cfg.state_file)?;
    assert_eq!(state.len(), 1);
    assert_eq!(state.rows()[0].procedure, "bids");
    assert_eq!(state.rows()[0].status, Status::Pending);

    // Second pass: the task is in flight, nothing new to submit.
    let summary = run_pass(&cfg, &batch, &PassOptions::default()).await?;
    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.after_filter, 0);
    assert_eq!(batch.submission_count(), 1);
    Ok(())
}

#[tokio::test]
async fn completed_upstream_unlocks_downstream_on_the_next_pass() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    add_dicom_session(&cfg, "sub-0001", "ses-202407110849");

    let batch = FakeBatch::new();
    run_pass(&cfg, &batch, &PassOptions::default()).await?;

    // The bids job finishes and its output lands on disk.
    add_bids_t1w(&cfg, "sub-0001", "ses-202407110849");
    batch.set_state("1", "COMPLETED");

    let summary = run_pass(&cfg, &batch, &PassOptions::default()).await?;
    assert_eq!(summary.after_filter, 1);

    let state = StateStore::load(&cfg.state_file)?;
    assert_eq!(state.len(), 2);
    assert_eq!(state.rows()[0].procedure, "bids");
    assert_eq!(state.rows()[0].status, Status::Complete);
    assert_eq!(state.rows()[1].procedure, "recon");
    assert_eq!(state.rows()[1].session, "");
    assert_eq!(state.rows()[1].status, Status::Pending);

    // recon was submitted with just the subject as argument.
    let submissions = batch.submissions.lock().unwrap();
    let recon_argv = submissions.last().unwrap();
    assert_eq!(recon_argv[recon_argv.len() - 2], "run_recon.sh");
    assert_eq!(recon_argv.last().unwrap(), "sub-0001");
    Ok(())
}

#[tokio::test]
async fn dry_run_leaves_no_state_behind() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    add_dicom_session(&cfg, "sub-0001", "ses-01");

    let batch = FakeBatch::new();
    let options = PassOptions {
        dry_run: true,
        ..Default::default()
    };
    let summary = run_pass(&cfg, &batch, &options).await?;

    assert_eq!(summary.stats.submitted, 1);
    assert_eq!(batch.submission_count(), 0);
    assert!(!cfg.state_file.exists());

    let audit = fs::read_to_string(cfg.audit_log_path())?;
    assert!(audit.contains("\"event\":\"dry_run\""));
    Ok(())
}

#[tokio::test]
async fn failed_job_is_requeued_after_retry() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    add_dicom_session(&cfg, "sub-0003", "ses-Y");

    let mut state = StateStore::load(&cfg.state_file)?;
    state.push(StateRow {
        subject: "sub-0003".into(),
        session: "ses-Y".into(),
        procedure: "bids".into(),
        status: Status::Failed,
        submitted_at: Utc::now(),
        job_id: "42".into(),
    });
    state.save()?;

    let cleared = retry_pass(&cfg, None, Some("sub-0003"))?;
    assert_eq!(cleared, 1);
    assert!(StateStore::load(&cfg.state_file)?.is_empty());

    let audit = fs::read_to_string(cfg.audit_log_path())?;
    assert!(audit.contains("\"event\":\"retry_cleared\""));
    assert!(audit.contains("\"job_id\":\"42\""));
    assert!(audit.contains("\"old_status\":\"failed\""));

    // The next pass re-evaluates the rules and resubmits.
    let batch = FakeBatch::new();
    let summary = run_pass(&cfg, &batch, &PassOptions::default()).await?;
    assert_eq!(summary.stats.submitted, 1);
    Ok(())
}

#[test]
fn retry_ignores_in_flight_and_complete_rows() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());

    let mut state = StateStore::load(&cfg.state_file)?;
    for (subject, status) in [
        ("sub-0001", Status::Pending),
        ("sub-0002", Status::Running),
        ("sub-0003", Status::Complete),
        ("sub-0004", Status::Failed),
    ] {
        state.push(StateRow {
            subject: subject.into(),
            session: "ses-01".into(),
            procedure: "bids".into(),
            status,
            submitted_at: Utc::now(),
            job_id: "7".into(),
        });
    }
    state.save()?;

    let cleared = retry_pass(&cfg, None, None)?;
    assert_eq!(cleared, 1);

    let remaining = StateStore::load(&cfg.state_file)?;
    assert_eq!(remaining.len(), 3);
    assert!(remaining.rows().iter().all(|r| r.status != Status::Failed));
    Ok(())
}

#[test]
fn retry_procedure_filter_only_clears_matching_rows() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());

    let mut state = StateStore::load(&cfg.state_file)?;
    for procedure in ["bids", "recon"] {
        state.push(StateRow {
            subject: "sub-0001".into(),
            session: String::new(),
            procedure: procedure.into(),
            status: Status::Failed,
            submitted_at: Utc::now(),
            job_id: "7".into(),
        });
    }
    state.save()?;

    let cleared = retry_pass(&cfg, Some("recon"), None)?;
    assert_eq!(cleared, 1);

    let remaining = StateStore::load(&cfg.state_file)?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining.rows()[0].procedure, "bids");
    Ok(())
}

#[tokio::test]
async fn batch_manager_down_still_reconciles_and_submits() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());

    // sub-0001's bids output is complete on disk, but the batch manager has
    // forgotten the job. sub-0002's job is genuinely still out there.
    add_dicom_session(&cfg, "sub-0001", "ses-01");
    add_dicom_session(&cfg, "sub-0002", "ses-02");
    add_bids_t1w(&cfg, "sub-0001", "ses-01");

    let mut state = StateStore::load(&cfg.state_file)?;
    for (subject, session, job) in [("sub-0001", "ses-01", "90"), ("sub-0002", "ses-02", "91")] {
        state.push(StateRow {
            subject: subject.into(),
            session: session.into(),
            procedure: "bids".into(),
            status: Status::Running,
            submitted_at: Utc::now(),
            job_id: job.into(),
        });
    }
    state.save()?;

    let summary = monitor_pass(&cfg, &UnavailableBatch).await?;
    assert_eq!(summary.polled, 0);
    assert_eq!(summary.reconciled, 1);

    let state = StateStore::load(&cfg.state_file)?;
    assert_eq!(state.rows()[0].status, Status::Complete);
    assert_eq!(state.rows()[1].status, Status::Running);

    // A fresh run pass is not blocked: sub-0001 moves on to recon while
    // sub-0002's bids stays filtered as in-flight.
    let batch = FakeBatch::new();
    let summary = run_pass(&cfg, &batch, &PassOptions::default()).await?;
    assert_eq!(summary.stats.submitted, 1);
    let submissions = batch.submissions.lock().unwrap();
    assert!(submissions[0].iter().any(|a| a == "run_recon.sh"));
    Ok(())
}

#[tokio::test]
async fn monitor_and_reconcile_twice_is_a_no_op() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = test_config(tmp.path(), two_step_procedures());
    add_bids_t1w(&cfg, "sub-0001", "ses-01");

    let mut state = StateStore::load(&cfg.state_file)?;
    state.push(StateRow {
        subject: "sub-0001".into(),
        session: "ses-01".into(),
        procedure: "bids".into(),
        status: Status::Pending,
        submitted_at: Utc::now(),
        job_id: "100".into(),
    });
    state.save()?;

    let batch = FakeBatch::new();
    batch.set_state("100", "COMPLETED");

    let first = monitor_pass(&cfg, &batch).await?;
    assert_eq!(first.polled + first.reconciled, 1);

    let second = monitor_pass(&cfg, &batch).await?;
    assert_eq!(second.polled + second.reconciled, 0);
    Ok(())
}
