// src/discover/mod.rs

//! Work-unit discovery: one row per `(subject, session)`, enriched with the
//! output path and existence flag of every configured procedure.
//!
//! Two modes: walk `dicom_root` for `sub-*/ses-*` directories, or read the
//! configured sessions index file.

pub mod index;

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::model::ConfigFile;

/// One configured procedure's resolved output location for a session row.
#[derive(Debug, Clone)]
pub struct ProcOutput {
    pub path: PathBuf,
    pub exists: bool,
}

/// One candidate work unit.
///
/// `proc_outputs` is aligned index-for-index with `config.procedures`;
/// subject-scoped procedures resolve to the same path for every session of
/// a subject.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub subject: String,
    pub session: String,
    pub dicom_path: PathBuf,
    pub dicom_exists: bool,
    pub proc_outputs: Vec<ProcOutput>,
}

/// Produce the session table for this pass.
///
/// Indexed mode is used when `sessions_file` is configured; otherwise the
/// DICOM root is walked. A missing DICOM root yields an empty table, not an
/// error.
pub fn discover_sessions(cfg: &ConfigFile) -> Result<Vec<SessionRow>> {
    if let Some(index_path) = &cfg.sessions_file {
        let rows = index::discover_from_index(cfg, index_path)?;
        info!(count = rows.len(), index = ?index_path, "discovered sessions from index");
        return Ok(rows);
    }

    let rows = walk_dicom_root(cfg);
    info!(count = rows.len(), root = ?cfg.dicom_root, "discovered sessions from filesystem");
    Ok(rows)
}

/// Walk `dicom_root` one level for `sub-*` entries, then each subject for
/// `ses-*` entries, in sorted order.
fn walk_dicom_root(cfg: &ConfigFile) -> Vec<SessionRow> {
    let mut rows = Vec::new();

    for entry in WalkDir::new(&cfg.dicom_root)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let session = entry.file_name().to_string_lossy().to_string();
        if !session.starts_with("ses-") {
            continue;
        }
        let subject = match entry.path().parent().and_then(Path::file_name) {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };
        if !subject.starts_with("sub-") {
            continue;
        }

        debug!(%subject, %session, "found session directory");
        rows.push(build_row(cfg, &subject, &session, entry.path().to_path_buf()));
    }

    rows
}

/// Build a session row: record the DICOM path and, per configured
/// procedure, the resolved output path plus an existence snapshot.
pub(crate) fn build_row(
    cfg: &ConfigFile,
    subject: &str,
    session: &str,
    dicom_path: PathBuf,
) -> SessionRow {
    let proc_outputs = cfg
        .procedures
        .iter()
        .map(|proc| {
            let path = cfg.output_path(proc, subject, session);
            ProcOutput {
                exists: path.exists(),
                path,
            }
        })
        .collect();

    SessionRow {
        subject: subject.to_string(),
        session: session.to_string(),
        dicom_exists: !dicom_path.as_os_str().is_empty() && dicom_path.exists(),
        dicom_path,
        proc_outputs,
    }
}
