// src/state/audit.rs

//! Append-only JSONL audit trail.
//!
//! Every significant scheduler event is appended as one JSON object per
//! line. Writes are best-effort: a failed append logs a warning and the
//! pass continues, since the audit log is observability rather than a
//! data-integrity boundary.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::state::store::{StateRow, Status};

/// Audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Submitted,
    StatusChange,
    Error,
    DryRun,
    RetryCleared,
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    timestamp: DateTime<Utc>,
    event: AuditKind,
    subject: &'a str,
    session: &'a str,
    procedure: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<&'a str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    detail: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_status: Option<Status>,
}

/// Handle on the audit log file. Parent directories are created on the
/// first write.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn submitted(&self, subject: &str, session: &str, procedure: &str, job_id: &str) {
        self.append(AuditRecord {
            timestamp: Utc::now(),
            event: AuditKind::Submitted,
            subject,
            session,
            procedure,
            job_id: Some(job_id),
            detail: "",
            old_status: None,
            new_status: None,
        });
    }

    pub fn dry_run(&self, subject: &str, session: &str, procedure: &str, command: &str) {
        self.append(AuditRecord {
            timestamp: Utc::now(),
            event: AuditKind::DryRun,
            subject,
            session,
            procedure,
            job_id: None,
            detail: command,
            old_status: None,
            new_status: None,
        });
    }

    pub fn error(&self, subject: &str, session: &str, procedure: &str, detail: &str) {
        self.append(AuditRecord {
            timestamp: Utc::now(),
            event: AuditKind::Error,
            subject,
            session,
            procedure,
            job_id: None,
            detail,
            old_status: None,
            new_status: None,
        });
    }

    pub fn status_change(&self, row: &StateRow, old_status: Status, new_status: Status) {
        self.append(AuditRecord {
            timestamp: Utc::now(),
            event: AuditKind::StatusChange,
            subject: &row.subject,
            session: &row.session,
            procedure: &row.procedure,
            job_id: Some(&row.job_id),
            detail: "",
            old_status: Some(old_status),
            new_status: Some(new_status),
        });
    }

    pub fn retry_cleared(&self, row: &StateRow) {
        self.append(AuditRecord {
            timestamp: Utc::now(),
            event: AuditKind::RetryCleared,
            subject: &row.subject,
            session: &row.session,
            procedure: &row.procedure,
            job_id: Some(&row.job_id),
            detail: "",
            old_status: Some(row.status),
            new_status: None,
        });
    }

    fn append(&self, record: AuditRecord<'_>) {
        if let Err(err) = self.try_append(&record) {
            warn!(path = ?self.path, error = %err, "failed to append audit event");
            return;
        }
        debug!(
            event = ?record.event,
            subject = %record.subject,
            session = %record.session,
            procedure = %record.procedure,
            "audit event written"
        );
    }

    fn try_append(&self, record: &AuditRecord<'_>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
