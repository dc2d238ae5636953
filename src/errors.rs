// src/errors.rs

//! Crate-wide error types.
//!
//! Configuration problems get a typed enum so load-time failures read well
//! on the CLI; everything else flows through `anyhow`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("procedure '{procedure}' depends on unknown procedure '{dependency}'")]
    UnknownDependency {
        procedure: String,
        dependency: String,
    },

    #[error("procedure '{procedure}' depends on '{dependency}', which is declared later in the procedure list")]
    ForwardDependency {
        procedure: String,
        dependency: String,
    },

    #[error("procedure '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("cycle detected in procedure dependencies involving '{0}'")]
    DependencyCycle(String),

    #[error("duplicate procedure name '{0}'")]
    DuplicateProcedure(String),

    #[error("config must declare at least one [[procedures]] entry")]
    NoProcedures,

    #[error("sessions file {path:?} is missing required column(s): {missing:?}")]
    MissingIndexColumns {
        path: std::path::PathBuf,
        missing: Vec<String>,
    },
}

pub use anyhow::{Error, Result};
