//! Configuration loading, validation and env substitution.
//!
//! Config files: `tgdc.toml`, `tgdc.yaml`, or `tgdc.json`
//! Searched in `./` then the user config dir (`~/.config/tgdc/`).
//!
//! Supports `${ENV_VAR}` substitution in all string values. Platform
//! sections are kept as raw values and deserialized by each adapter.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, find_config_file,
        load_config, load_env_file,
    },
    schema::{MetricsConfig, RelayConfig, StorageConfig, TgdcConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
