// src/manifest.rs

//! The task table for one scheduler pass: rules evaluated over every
//! session row, minus tasks already in flight.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::debug;

use crate::config::model::{ConfigFile, Scope};
use crate::discover::SessionRow;
use crate::rules::{self, ForceOptions};
use crate::state::StateStore;

/// One submission candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub subject: String,
    /// Empty for subject-scoped procedures.
    pub session: String,
    pub procedure: String,
    /// Empty for subject-scoped procedures.
    pub dicom_path: PathBuf,
    /// Zero-based index of the procedure in the declared list; lower values
    /// submit first.
    pub priority: usize,
}

/// Evaluate every rule over every session row and return the ordered task
/// manifest.
///
/// Subject-scoped procedures contribute at most one row per subject, with
/// an empty session and dicom path. Rows are ordered by ascending priority
/// with a stable `(subject, session)` tiebreak.
pub fn build_manifest(
    sessions: &[SessionRow],
    cfg: &ConfigFile,
    force: &ForceOptions,
) -> Vec<TaskRow> {
    let mut rows: Vec<TaskRow> = Vec::new();
    let mut seen_subject_procs: HashSet<(String, String)> = HashSet::new();

    for session_row in sessions {
        for (proc_idx, proc) in cfg.procedures.iter().enumerate() {
            if !rules::needs_submission(cfg, proc_idx, session_row, force) {
                continue;
            }

            match proc.scope {
                Scope::Subject => {
                    let key = (session_row.subject.clone(), proc.name.clone());
                    if !seen_subject_procs.insert(key) {
                        continue;
                    }
                    rows.push(TaskRow {
                        subject: session_row.subject.clone(),
                        session: String::new(),
                        procedure: proc.name.clone(),
                        dicom_path: PathBuf::new(),
                        priority: proc_idx,
                    });
                }
                Scope::Session => {
                    rows.push(TaskRow {
                        subject: session_row.subject.clone(),
                        session: session_row.session.clone(),
                        procedure: proc.name.clone(),
                        dicom_path: session_row.dicom_path.clone(),
                        priority: proc_idx,
                    });
                }
            }
        }
    }

    rows.sort_by(|a, b| {
        (a.priority, &a.subject, &a.session).cmp(&(b.priority, &b.subject, &b.session))
    });

    rows
}

/// Remove manifest rows with a matching pending/running state row.
///
/// After this filter, no task in the manifest has an active job slot; this
/// is the at-most-one-active-job guarantee. Historical complete/failed rows
/// do not block resubmission.
pub fn filter_in_flight(manifest: Vec<TaskRow>, state: &StateStore) -> Vec<TaskRow> {
    manifest
        .into_iter()
        .filter(|task| {
            let blocked = state.has_in_flight(&task.subject, &task.session, &task.procedure);
            if blocked {
                debug!(
                    subject = %task.subject,
                    session = %task.session,
                    procedure = %task.procedure,
                    "task already in flight; skipping"
                );
            }
            !blocked
        })
        .collect()
}
