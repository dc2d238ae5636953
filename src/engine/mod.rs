// src/engine/mod.rs

pub mod pass;

pub use pass::{monitor_pass, retry_pass, run_pass, MonitorSummary, PassOptions, PassSummary};
