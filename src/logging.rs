// src/logging.rs

//! Tracing setup.
//!
//! Scheduler internals (discovery counts, submissions, status transitions,
//! sacct fallbacks) log through `tracing`; operator-facing tables and
//! submission echoes go to stdout from the command layer. The level is
//! resolved from the `--log-level` flag when given, otherwise from the
//! `BIDSFLOW_LOG` environment variable, otherwise `info`.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Install the global subscriber.
///
/// Call once from `main` before the first pass runs; `tracing-subscriber`
/// panics on a second install.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_max_level(resolve_level(cli_level))
        .with_target(true)
        .init();

    Ok(())
}

/// Flag beats environment beats the `info` default. An unparseable
/// `BIDSFLOW_LOG` value falls through to the default instead of erroring.
fn resolve_level(cli_level: Option<LogLevel>) -> Level {
    if let Some(lvl) = cli_level {
        return lvl.into();
    }

    std::env::var("BIDSFLOW_LOG")
        .ok()
        .and_then(|s| s.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

impl From<LogLevel> for Level {
    fn from(lvl: LogLevel) -> Self {
        match lvl {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
