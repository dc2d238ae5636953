// src/batch/slurm.rs

//! Slurm front-end: `sbatch` for submission, `sacct` for status queries.
//!
//! Both subprocesses are bounded by the configured timeout. Query failures
//! degrade to an empty result so a pass can proceed in reconcile-only mode
//! when the accounting daemon is down.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::batch::{parse_job_id, BatchManager};

#[derive(Debug, Clone)]
pub struct SlurmBatch {
    timeout: Duration,
}

impl SlurmBatch {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl BatchManager for SlurmBatch {
    async fn submit(&self, argv: &[String]) -> Result<String> {
        let (bin, args) = argv
            .split_first()
            .context("submission command must not be empty")?;

        let mut cmd = Command::new(bin);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow!("{bin} timed out after {:?}", self.timeout))?
            .with_context(|| format!("spawning {bin}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{bin} exited with {}: {}", output.status, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let ack = stdout.trim();
        parse_job_id(ack)
            .ok_or_else(|| anyhow!("unexpected submission acknowledgement: {ack:?}"))
    }

    async fn query(&self, job_ids: &[String]) -> HashMap<String, String> {
        if job_ids.is_empty() {
            return HashMap::new();
        }

        let ids = job_ids.join(",");
        let mut cmd = Command::new("sacct");
        cmd.args(["-j", &ids, "--format=JobID,State", "--noheader", "--parsable2"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(status = ?output.status, stderr = %stderr.trim(), "sacct query failed");
                return HashMap::new();
            }
            Ok(Err(err)) => {
                warn!(error = %err, "sacct unavailable");
                return HashMap::new();
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "sacct query timed out");
                return HashMap::new();
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let states = parse_sacct_output(&stdout);
        debug!(queried = job_ids.len(), returned = states.len(), "sacct query complete");
        states
    }
}

/// Parse `sacct --parsable2` output into `job_id → state` pairs.
///
/// Sub-step rows (`12345.batch`, `12345.0`) are skipped; state strings are
/// normalized to their first token with any trailing `+` removed
/// (`"CANCELLED by user"` → `"CANCELLED"`).
pub fn parse_sacct_output(stdout: &str) -> HashMap<String, String> {
    let mut states = HashMap::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split('|');
        let (job_id, raw_state) = match (parts.next(), parts.next()) {
            (Some(id), Some(state)) => (id, state),
            _ => continue,
        };
        if job_id.contains('.') {
            continue;
        }
        let state = match raw_state.split_whitespace().next() {
            Some(tok) => tok.trim_end_matches('+'),
            None => continue,
        };
        states.insert(job_id.to_string(), state.to_string());
    }

    states
}
