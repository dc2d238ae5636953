// src/config/model.rs

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// dicom_root = "/data/study/dicom"
/// bids_root = "/data/study/bids"
/// derivatives_root = "/data/study/derivatives"
/// state_file = "/data/study/.scheduler_state.jsonl"
///
/// batch_partition = "debug"
/// batch_account = "study"
/// batch_mem = "32G"
///
/// [[procedures]]
/// name = "bids"
/// output_dir = ""
/// script = "run_bids.sh"
/// scope = "session"
/// completion_marker = ["anat/*_T1w.nii.gz"]
///
/// [[procedures]]
/// name = "qsiprep"
/// output_dir = "qsiprep"
/// script = "run_qsiprep.sh"
/// depends_on = ["bids"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Root holding raw acquisitions laid out as `sub-*/ses-*`.
    pub dicom_root: PathBuf,

    /// BIDS root; also the output root for procedures with an empty
    /// `output_dir`.
    pub bids_root: PathBuf,

    /// Root for derived outputs; procedures with a non-empty `output_dir`
    /// write under `derivatives_root/<output_dir>`.
    pub derivatives_root: PathBuf,

    /// Persisted task state (JSON Lines, one row per submitted task).
    pub state_file: PathBuf,

    /// Audit log path. Defaults to `scheduler_audit.jsonl` next to
    /// `state_file` when omitted.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Optional sessions index. When set, Discover reads this file instead
    /// of walking `dicom_root`.
    #[serde(default)]
    pub sessions_file: Option<PathBuf>,

    /// Slurm partition. Left empty, `--partition` is omitted from sbatch.
    #[serde(default)]
    pub batch_partition: String,

    /// Slurm account, passed as `--account`.
    #[serde(default)]
    pub batch_account: String,

    /// Optional memory request, e.g. `"32G"`.
    #[serde(default)]
    pub batch_mem: Option<String>,

    /// Optional `--cpus-per-task` value.
    #[serde(default)]
    pub batch_cpus: Option<u32>,

    /// When set, sbatch stdout/stderr land under
    /// `<batch_log_dir>/<procedure>/<job_name>_%j.{out,err}`.
    #[serde(default)]
    pub batch_log_dir: Option<PathBuf>,

    /// Timeout for sbatch/sacct subprocess calls, in seconds.
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,

    /// Ordered procedure declarations. Declaration order defines submission
    /// priority, and `depends_on` may only reference earlier entries.
    #[serde(default)]
    pub procedures: Vec<Procedure>,
}

fn default_batch_timeout_secs() -> u64 {
    60
}

/// One declared processing step.
#[derive(Debug, Clone, Deserialize)]
pub struct Procedure {
    /// Short unique identifier; appears in state rows and job names.
    pub name: String,

    /// Output subdirectory under `derivatives_root`. Empty means outputs
    /// live under `bids_root` directly.
    #[serde(default)]
    pub output_dir: String,

    /// Submission script, passed to sbatch verbatim.
    pub script: String,

    /// Keying granularity: one task per session, or one per subject.
    #[serde(default)]
    pub scope: Scope,

    /// Names of procedures that must be complete on disk before this one
    /// is submitted.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// What "complete" means for this procedure's output directory:
    ///
    /// - absent           → directory exists and is non-empty
    /// - `"scripts/done"` → that literal path exists inside the directory
    /// - `"**/*.nii.gz"`  → at least one file matches the glob
    /// - `["a", "b"]`     → every pattern matches at least one file
    #[serde(default)]
    pub completion_marker: Option<CompletionMarker>,
}

/// Task keying granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Session,
    Subject,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Session
    }
}

/// Completion marker: a single pattern/literal or a list of patterns.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CompletionMarker {
    Single(String),
    Many(Vec<String>),
}

impl ConfigFile {
    /// Base output root for a procedure: `bids_root` when `output_dir` is
    /// empty, otherwise `derivatives_root/<output_dir>`.
    pub fn procedure_root(&self, proc: &Procedure) -> PathBuf {
        if proc.output_dir.is_empty() {
            self.bids_root.clone()
        } else {
            self.derivatives_root.join(&proc.output_dir)
        }
    }

    /// Output directory for one `(procedure, subject, session)` task.
    ///
    /// Subject-scoped procedures ignore `session`.
    pub fn output_path(&self, proc: &Procedure, subject: &str, session: &str) -> PathBuf {
        let root = self.procedure_root(proc);
        match proc.scope {
            Scope::Subject => root.join(subject),
            Scope::Session => root.join(subject).join(session),
        }
    }

    /// Look up a procedure by name.
    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.name == name)
    }

    /// Zero-based index of a procedure in the declared list (its priority).
    pub fn procedure_index(&self, name: &str) -> Option<usize> {
        self.procedures.iter().position(|p| p.name == name)
    }

    /// Resolved audit log path.
    pub fn audit_log_path(&self) -> PathBuf {
        match &self.log_file {
            Some(path) => path.clone(),
            None => {
                let parent = self.state_file.parent().unwrap_or_else(|| Path::new("."));
                parent.join("scheduler_audit.jsonl")
            }
        }
    }
}
