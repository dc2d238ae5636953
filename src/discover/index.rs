// src/discover/index.rs

//! Indexed discovery: build the session table from a sessions index file
//! instead of walking the DICOM root.
//!
//! The index is tabular with a header row. Required columns: `SubjectCode`,
//! `ScanID`, `dicom_path`; anything else is ignored. Identifier columns are
//! sanitized into BIDS labels; `dicom_path` is copied verbatim. No row is
//! dropped for an empty `dicom_path`; such rows simply never pass the
//! DICOM-exists rule.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::model::ConfigFile;
use crate::discover::{build_row, SessionRow};
use crate::errors::ConfigError;

const REQUIRED_COLUMNS: [&str; 3] = ["SubjectCode", "ScanID", "dicom_path"];

/// Strip non-digit characters and zero-pad to 4 digits, prefixed `sub-`.
///
/// Idempotent: feeding an already-sanitized label back in returns it
/// unchanged.
pub fn sanitize_subject_code(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("sub-{digits:0>4}")
}

/// Strip non-digit characters and zero-pad to 12 digits, prefixed `ses-`.
pub fn sanitize_session_id(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("ses-{digits:0>12}")
}

/// Read the sessions index and build enriched session rows.
///
/// Duplicate `(subject, session)` keys keep the first occurrence.
pub fn discover_from_index(cfg: &ConfigFile, index_path: &Path) -> Result<Vec<SessionRow>> {
    let mut reader = csv::Reader::from_path(index_path)
        .with_context(|| format!("opening sessions index at {:?}", index_path))?;

    let headers = reader
        .headers()
        .with_context(|| format!("reading header row of {:?}", index_path))?
        .clone();

    let column = |name: &str| headers.iter().position(|h| h == name);

    let (subject_col, scan_col, dicom_col) =
        match (column("SubjectCode"), column("ScanID"), column("dicom_path")) {
            (Some(subject), Some(scan), Some(dicom)) => (subject, scan, dicom),
            _ => {
                let missing: Vec<String> = REQUIRED_COLUMNS
                    .iter()
                    .filter(|name| column(name).is_none())
                    .map(|name| name.to_string())
                    .collect();
                return Err(ConfigError::MissingIndexColumns {
                    path: index_path.to_path_buf(),
                    missing,
                }
                .into());
            }
        };

    let mut rows = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for record in reader.records() {
        let record =
            record.with_context(|| format!("reading record from {:?}", index_path))?;

        let subject = sanitize_subject_code(record.get(subject_col).unwrap_or(""));
        let session = sanitize_session_id(record.get(scan_col).unwrap_or(""));
        let dicom_path = PathBuf::from(record.get(dicom_col).unwrap_or(""));

        if !seen.insert((subject.clone(), session.clone())) {
            debug!(%subject, %session, "duplicate index row skipped");
            continue;
        }

        rows.push(build_row(cfg, &subject, &session, dicom_path));
    }

    Ok(rows)
}
