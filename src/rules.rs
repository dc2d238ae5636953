// src/rules.rs

//! Per-procedure submission rules.
//!
//! A task `(row, procedure)` is a candidate iff the session has DICOM data,
//! every dependency is complete on disk, and the procedure's own output is
//! not. `--force` bypasses only the self-completion check; dependencies are
//! always verified against disk, never against the state store, so forcing
//! a downstream procedure cannot outrun its upstream outputs.

use tracing::warn;

use crate::config::model::ConfigFile;
use crate::discover::SessionRow;
use crate::oracle::{self, OracleCtx};

/// Force toggle with an optional procedure filter.
#[derive(Debug, Clone, Default)]
pub struct ForceOptions {
    pub force: bool,
    /// When set, only these procedures skip their self-completion check.
    pub procedures: Option<Vec<String>>,
}

impl ForceOptions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn applies_to(&self, procedure: &str) -> bool {
        self.force
            && self
                .procedures
                .as_ref()
                .map_or(true, |names| names.iter().any(|n| n == procedure))
    }
}

/// Evaluate the rule for the procedure at `proc_idx` against a session row.
pub fn needs_submission(
    cfg: &ConfigFile,
    proc_idx: usize,
    row: &SessionRow,
    force: &ForceOptions,
) -> bool {
    if !row.dicom_exists {
        return false;
    }

    let proc = &cfg.procedures[proc_idx];
    let ctx = OracleCtx {
        bids_root: &cfg.bids_root,
        derivatives_root: &cfg.derivatives_root,
        subject: &row.subject,
    };

    for dep_name in &proc.depends_on {
        let dep_idx = match cfg.procedure_index(dep_name) {
            Some(idx) => idx,
            None => {
                // Unreachable with a validated config.
                warn!(procedure = %proc.name, dependency = %dep_name, "unknown dependency at rule time");
                return false;
            }
        };
        let dep_proc = &cfg.procedures[dep_idx];
        if !oracle::is_complete(dep_proc, &row.proc_outputs[dep_idx].path, &ctx) {
            return false;
        }
    }

    if force.applies_to(&proc.name) {
        return true;
    }

    !oracle::is_complete(proc, &row.proc_outputs[proc_idx].path, &ctx)
}
