// src/batch/mod.rs

//! Abstract batch-manager interface.
//!
//! The scheduler only needs two operations: submit a command and query job
//! states. Keeping them behind a trait lets the pass logic run against an
//! in-memory fake in tests.

pub mod slurm;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

pub use slurm::SlurmBatch;

#[async_trait]
pub trait BatchManager: Send + Sync {
    /// Execute a submission command (`argv[0]` is the binary) and return
    /// the job identifier parsed from its acknowledgement line.
    async fn submit(&self, argv: &[String]) -> Result<String>;

    /// Query the raw scheduler state for each job id.
    ///
    /// A missing or unavailable query tool yields an empty map, never an
    /// error; the caller falls back to filesystem reconciliation.
    async fn query(&self, job_ids: &[String]) -> HashMap<String, String>;
}

/// Extract the job id from a submission acknowledgement: the last
/// whitespace-delimited token, which must be entirely numeric.
///
/// `"Submitted batch job 12345"` → `Some("12345")`.
pub fn parse_job_id(ack: &str) -> Option<String> {
    let last = ack.split_whitespace().last()?;
    if !last.is_empty() && last.chars().all(|c| c.is_ascii_digit()) {
        Some(last.to_string())
    } else {
        None
    }
}
