// src/oracle/mod.rs

//! Completion oracle: decides whether a procedure's output is complete on
//! disk.
//!
//! The generic check interprets the procedure's `completion_marker`. Three
//! procedures carry specialized checks layered on top of the generic one,
//! dispatched by name:
//!
//! - `freesurfer`: the `scripts/recon-all.done` marker must record as many
//!   `-i` inputs as there are T1w images currently in BIDS, so adding a
//!   session re-queues the subject.
//! - `qsiprep`: one `ses-*` output per BIDS session with a DWI modality.
//! - `qsirecon`: `ses-*` outputs must match the qsiprep session count.
//!
//! The oracle never raises: missing directories, unreadable files, and
//! malformed markers all read as incomplete. When in doubt the answer is
//! "re-run".

pub mod counts;

use std::fs;
use std::path::Path;

use globset::GlobBuilder;
use tracing::trace;
use walkdir::WalkDir;

use crate::config::model::{CompletionMarker, Procedure};
use crate::oracle::counts::{
    count_available_t1w, count_bids_dwi_sessions, count_recon_all_inputs, count_session_dirs,
};

/// Context the specialized checks need beyond the output path itself.
#[derive(Debug, Clone, Copy)]
pub struct OracleCtx<'a> {
    pub bids_root: &'a Path,
    pub derivatives_root: &'a Path,
    pub subject: &'a str,
}

/// Completion strategy for a procedure: the generic marker logic, or one of
/// the specialized session/input-count checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompletionCheck {
    Generic,
    SubjectRecon,
    DwiPreproc,
    DwiRecon,
}

impl CompletionCheck {
    fn for_name(name: &str) -> Self {
        match name {
            "freesurfer" => CompletionCheck::SubjectRecon,
            "qsiprep" => CompletionCheck::DwiPreproc,
            "qsirecon" => CompletionCheck::DwiRecon,
            _ => CompletionCheck::Generic,
        }
    }
}

/// Return true iff the procedure's output at `output_path` is complete.
pub fn is_complete(proc: &Procedure, output_path: &Path, ctx: &OracleCtx<'_>) -> bool {
    if !output_path.is_dir() {
        return false;
    }

    if !marker_satisfied(proc, output_path) {
        trace!(procedure = %proc.name, path = ?output_path, "completion marker not satisfied");
        return false;
    }

    match CompletionCheck::for_name(&proc.name) {
        CompletionCheck::Generic => true,
        CompletionCheck::SubjectRecon => subject_recon_complete(output_path, ctx),
        CompletionCheck::DwiPreproc => dwi_preproc_complete(output_path, ctx),
        CompletionCheck::DwiRecon => dwi_recon_complete(output_path, ctx),
    }
}

/// Generic marker logic:
///
/// - no marker → directory non-empty
/// - single pattern with glob metacharacters → at least one matching file
/// - single pattern without → literal path exists
/// - list → every pattern matches at least one file
fn marker_satisfied(proc: &Procedure, output_path: &Path) -> bool {
    match &proc.completion_marker {
        None => dir_nonempty(output_path),
        Some(CompletionMarker::Single(pattern)) => {
            if is_glob(pattern) {
                glob_matches_any_file(output_path, pattern)
            } else {
                output_path.join(pattern).exists()
            }
        }
        Some(CompletionMarker::Many(patterns)) => patterns
            .iter()
            .all(|pattern| glob_matches_any_file(output_path, pattern)),
    }
}

/// Subject reconstruction: `scripts/recon-all.done` must exist, and the
/// number of `-i` inputs it records must equal the T1w images discoverable
/// in BIDS right now.
fn subject_recon_complete(output_path: &Path, ctx: &OracleCtx<'_>) -> bool {
    let done_file = output_path.join("scripts").join("recon-all.done");
    if !done_file.is_file() {
        return false;
    }
    count_recon_all_inputs(&done_file) == count_available_t1w(ctx.bids_root, ctx.subject)
}

/// Preprocessing: at least one `ses-*` output, matching the number of BIDS
/// sessions that carry a DWI modality.
fn dwi_preproc_complete(output_path: &Path, ctx: &OracleCtx<'_>) -> bool {
    let done_sessions = count_session_dirs(output_path);
    done_sessions >= 1 && done_sessions == count_bids_dwi_sessions(ctx.bids_root, ctx.subject)
}

/// Reconstruction: `ses-*` output count must match the preprocessing output
/// for the same subject.
fn dwi_recon_complete(output_path: &Path, ctx: &OracleCtx<'_>) -> bool {
    let preproc_subject = ctx.derivatives_root.join("qsiprep").join(ctx.subject);
    count_session_dirs(output_path) == count_session_dirs(&preproc_subject)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(|c| matches!(c, '*' | '?' | '['))
}

fn dir_nonempty(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

/// Walk `root` recursively and return true as soon as one *file* matches
/// `pattern` against its root-relative path.
///
/// `*` and `?` do not cross directory separators; `**` does. An invalid
/// pattern matches nothing.
fn glob_matches_any_file(root: &Path, pattern: &str) -> bool {
    let matcher = match GlobBuilder::new(pattern).literal_separator(true).build() {
        Ok(glob) => glob.compile_matcher(),
        Err(_) => return false,
    };

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            if matcher.is_match(rel) {
                return true;
            }
        }
    }

    false
}
