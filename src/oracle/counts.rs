// src/oracle/counts.rs

//! Counting helpers backing the specialized completion checks.

use std::fs;
use std::path::{Path, PathBuf};

/// Number of `-i` input flags recorded on the `#CMDARGS` line of a
/// `recon-all.done` marker. Missing file or missing line count as zero.
pub fn count_recon_all_inputs(done_file: &Path) -> usize {
    let contents = match fs::read_to_string(done_file) {
        Ok(c) => c,
        Err(_) => return 0,
    };

    for line in contents.lines() {
        if let Some(args) = line.strip_prefix("#CMDARGS") {
            return args.split_whitespace().filter(|tok| *tok == "-i").count();
        }
    }

    0
}

/// Number of T1w NIfTI images discoverable for a subject across all BIDS
/// sessions.
///
/// Selection mirrors what the reconstruction helper feeds to `recon-all`:
/// files named `*_T1w.nii.gz` under `<subject>/ses-*/anat/`, excluding
/// `defaced` variants, and restricted to `rec-norm` variants when any exist.
pub fn count_available_t1w(bids_root: &Path, subject: &str) -> usize {
    let subject_dir = bids_root.join(subject);

    let mut files: Vec<PathBuf> = Vec::new();
    for session_dir in session_dirs(&subject_dir) {
        let anat = session_dir.join("anat");
        let entries = match fs::read_dir(&anat) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with("_T1w.nii.gz") && !name.contains("defaced") {
                files.push(entry.path());
            }
        }
    }

    let rec_norm = files
        .iter()
        .filter(|f| {
            f.file_name()
                .map(|n| n.to_string_lossy().contains("rec-norm"))
                .unwrap_or(false)
        })
        .count();

    if rec_norm > 0 {
        rec_norm
    } else {
        files.len()
    }
}

/// Number of `ses-*` child directories directly under `dir`.
pub fn count_session_dirs(dir: &Path) -> usize {
    session_dirs(dir).len()
}

/// Number of BIDS sessions for a subject that carry a DWI modality
/// (a non-empty `dwi/` child directory).
pub fn count_bids_dwi_sessions(bids_root: &Path, subject: &str) -> usize {
    session_dirs(&bids_root.join(subject))
        .iter()
        .filter(|session_dir| {
            let dwi = session_dir.join("dwi");
            fs::read_dir(&dwi)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false)
        })
        .count()
}

/// Sorted `ses-*` child directories of `dir`. Missing or unreadable
/// directories yield an empty list.
fn session_dirs(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().map(|t| t.is_dir()).unwrap_or(false)
                && e.file_name().to_string_lossy().starts_with("ses-")
        })
        .map(|e| e.path())
        .collect();

    dirs.sort();
    dirs
}
