// src/config/loader.rs

//! Config loading.
//!
//! A deployment is described by one TOML document: the four path roots
//! (`dicom_root`, `bids_root`, `derivatives_root`, `state_file`), Slurm
//! submission settings (`batch_*`), an optional sessions index, and the
//! ordered `[[procedures]]` list. Deserialization fills defaults; the
//! semantic checks in [`validate_config`] run afterwards so a bad
//! procedure graph aborts before any pass logic sees it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::model::ConfigFile;
use crate::config::validate::validate_config;

/// File name looked up in the working directory when `--config` is not
/// given.
pub const DEFAULT_CONFIG_FILE: &str = "Bidsflow.toml";

/// Read and deserialize a config file without semantic validation.
///
/// Prefer [`load_and_validate`]; this exists for tooling that wants to
/// inspect a possibly-invalid procedure list.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading config file at {:?}", path))?;

    toml::from_str(&contents).with_context(|| format!("parsing TOML config from {:?}", path))
}

/// Load a scheduler config and reject bad procedure graphs.
///
/// Every CLI invocation goes through here: unknown, forward, or circular
/// `depends_on` references and an empty procedure list all fail the
/// command before a pass can run with them. Note that the `--batch-mem`,
/// `--batch-cpus`, and `--batch-log-dir` CLI overrides are applied by the
/// caller after loading, not here.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let config = load_from_path(path.as_ref())?;
    validate_config(&config)?;
    Ok(config)
}

/// [`DEFAULT_CONFIG_FILE`] in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}
