// tests/common/mod.rs

//! Shared fixtures: an in-memory batch manager and config builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use bidsflow::batch::BatchManager;
use bidsflow::config::{CompletionMarker, ConfigFile, Procedure, Scope};

/// In-memory batch manager. Records submissions, hands out sequential job
/// ids, and serves canned query states.
#[derive(Default)]
pub struct FakeBatch {
    pub submissions: Mutex<Vec<Vec<String>>>,
    pub states: Mutex<HashMap<String, String>>,
    pub fail_submissions: bool,
    next_id: Mutex<u64>,
}

impl FakeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_submissions: true,
            ..Self::default()
        }
    }

    pub fn set_state(&self, job_id: &str, state: &str) {
        self.states
            .lock()
            .unwrap()
            .insert(job_id.to_string(), state.to_string());
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl BatchManager for FakeBatch {
    async fn submit(&self, argv: &[String]) -> Result<String> {
        if self.fail_submissions {
            bail!("sbatch exited with exit status: 1");
        }
        self.submissions.lock().unwrap().push(argv.to_vec());
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        Ok(next.to_string())
    }

    async fn query(&self, job_ids: &[String]) -> HashMap<String, String> {
        let states = self.states.lock().unwrap();
        job_ids
            .iter()
            .filter_map(|id| states.get(id).map(|s| (id.clone(), s.clone())))
            .collect()
    }
}

/// A batch manager whose query tool is "missing": submissions fail and
/// queries return nothing, like a cluster front-end that is down.
pub struct UnavailableBatch;

#[async_trait]
impl BatchManager for UnavailableBatch {
    async fn submit(&self, _argv: &[String]) -> Result<String> {
        bail!("sbatch: command not found");
    }

    async fn query(&self, _job_ids: &[String]) -> HashMap<String, String> {
        HashMap::new()
    }
}

pub fn procedure(
    name: &str,
    output_dir: &str,
    scope: Scope,
    depends_on: &[&str],
    completion_marker: Option<CompletionMarker>,
) -> Procedure {
    Procedure {
        name: name.into(),
        output_dir: output_dir.into(),
        script: format!("run_{name}.sh"),
        scope,
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        completion_marker,
    }
}

/// The two-procedure pipeline from the scheduler's canonical scenario:
/// session-scoped `bids` (T1w marker), subject-scoped `recon` depending on
/// it (literal `scripts/done` marker).
pub fn two_step_procedures() -> Vec<Procedure> {
    vec![
        procedure(
            "bids",
            "",
            Scope::Session,
            &[],
            Some(CompletionMarker::Many(vec!["anat/*_T1w.nii.gz".into()])),
        ),
        procedure(
            "recon",
            "recon",
            Scope::Subject,
            &["bids"],
            Some(CompletionMarker::Single("scripts/done".into())),
        ),
    ]
}

/// Config rooted at a temp directory, with all path roots underneath it.
pub fn test_config(root: &Path, procedures: Vec<Procedure>) -> ConfigFile {
    ConfigFile {
        dicom_root: root.join("dicom"),
        bids_root: root.join("bids"),
        derivatives_root: root.join("derivatives"),
        state_file: root.join("state.jsonl"),
        log_file: Some(root.join("audit.jsonl")),
        sessions_file: None,
        batch_partition: "debug".into(),
        batch_account: "study".into(),
        batch_mem: None,
        batch_cpus: None,
        batch_log_dir: None,
        batch_timeout_secs: 60,
        procedures,
    }
}

/// Create a DICOM session directory under the config's dicom root.
pub fn add_dicom_session(cfg: &ConfigFile, subject: &str, session: &str) {
    std::fs::create_dir_all(cfg.dicom_root.join(subject).join(session)).unwrap();
}

/// Create a T1w anatomical file for a BIDS session.
pub fn add_bids_t1w(cfg: &ConfigFile, subject: &str, session: &str) {
    let anat = cfg.bids_root.join(subject).join(session).join("anat");
    std::fs::create_dir_all(&anat).unwrap();
    std::fs::write(anat.join(format!("{subject}_{session}_T1w.nii.gz")), b"").unwrap();
}
