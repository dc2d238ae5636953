// src/config/mod.rs

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, DEFAULT_CONFIG_FILE};
pub use model::{CompletionMarker, ConfigFile, Procedure, Scope};
pub use validate::validate_config;
