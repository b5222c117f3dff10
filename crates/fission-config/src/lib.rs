// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Fission Configuration System
//!
//! Type-safe loader for the simulation parameters with support for:
//! - `key = value` parameter files (`//` comments, later lines win)
//! - Environment variable overrides (`FISSION_<KEY>`)
//! - CLI argument overrides (`--set KEY=VALUE`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fission_config::{load_config, validate_config};
//!
//! let params = load_config(None, None).expect("Failed to load config");
//! validate_config(&params).expect("Invalid config");
//!
//! println!("Energy demand: {}", params.energy_demand);
//! println!("Tick interval: {:?}", params.tick_interval());
//! ```
//!
//! Unknown keys are ignored and missing keys fall back to their defaults
//! (zero for the core simulation keys).

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{
    apply_cli_overrides, apply_environment_overrides, find_config_file, load_config, parse_params,
    set_param,
};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError, MAX_SIZE_LIMIT};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid parameter file syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_types_compile() {
        let params = SimulationParams::default();
        assert_eq!(params.energy_demand, 0);
        assert_eq!(params.max_active_workers, 1000);
    }
}
