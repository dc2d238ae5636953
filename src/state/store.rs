// src/state/store.rs

//! Persisted task state: one row per submitted task, JSON Lines on disk.
//!
//! The store is exclusively owned by the scheduler process. Snapshots are
//! written atomically (temp file + rename), so a failed pass leaves the
//! previous state intact.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Running,
    Complete,
    Failed,
}

impl Status {
    /// Pending or running: the task has an active job slot and must not be
    /// resubmitted.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Status::Pending | Status::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Complete => "complete",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record in the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRow {
    pub subject: String,
    /// Empty for subject-scoped procedures.
    pub session: String,
    pub procedure: String,
    pub status: Status,
    pub submitted_at: DateTime<Utc>,
    /// Batch-manager handle; empty when none was recorded.
    pub job_id: String,
}

/// In-memory view of the state file plus its location.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    rows: Vec<StateRow>,
}

impl StateStore {
    /// Load the store from disk. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self { path, rows: Vec::new() });
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading state file at {:?}", path));
            }
        };

        let mut rows = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: StateRow = serde_json::from_str(line).with_context(|| {
                format!("parsing state row at {:?}:{}", path, lineno + 1)
            })?;
            rows.push(row);
        }

        Ok(Self { path, rows })
    }

    /// Persist the store atomically: write every row to a temp file in the
    /// target directory, then rename over the state file.
    pub fn save(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating state directory {:?}", parent))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("creating temp state file in {:?}", parent))?;

        for row in &self.rows {
            let line = serde_json::to_string(row).context("serializing state row")?;
            writeln!(tmp, "{line}").context("writing temp state file")?;
        }

        tmp.persist(&self.path)
            .with_context(|| format!("replacing state file at {:?}", self.path))?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> &[StateRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn push(&mut self, row: StateRow) {
        self.rows.push(row);
    }

    pub fn set_status(&mut self, idx: usize, status: Status) {
        self.rows[idx].status = status;
    }

    /// Indices of rows whose status is pending or running.
    pub fn in_flight_indices(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.status.is_in_flight())
            .map(|(idx, _)| idx)
            .collect()
    }

    /// True when an in-flight row exists for the given task key. The basis
    /// of the at-most-one-active-job guarantee.
    pub fn has_in_flight(&self, subject: &str, session: &str, procedure: &str) -> bool {
        self.rows.iter().any(|row| {
            row.status.is_in_flight()
                && row.subject == subject
                && row.session == session
                && row.procedure == procedure
        })
    }

    /// Remove failed rows, optionally restricted by procedure and/or
    /// subject, and return the removed rows. Pending, running, and complete
    /// rows are never touched.
    pub fn take_failed(
        &mut self,
        procedure: Option<&str>,
        subject: Option<&str>,
    ) -> Vec<StateRow> {
        let matches = |row: &StateRow| {
            row.status == Status::Failed
                && procedure.map_or(true, |p| row.procedure == p)
                && subject.map_or(true, |s| row.subject == s)
        };

        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            if matches(&row) {
                removed.push(row);
            } else {
                kept.push(row);
            }
        }
        self.rows = kept;
        removed
    }
}
