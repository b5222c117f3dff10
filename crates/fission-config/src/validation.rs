// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Parameter validation
//!
//! Rejects parameter sets the simulation cannot run with, such as a size
//! range too small to draw a worker size from or a zero tick period.

use crate::{ConfigError, ConfigResult, SimulationParams};

/// Largest accepted `MAX_SIZE`
///
/// Keeps the energy of one split (at most `(MAX_SIZE / 2)^2`) and the
/// per-tick sums well inside `i64`.
pub const MAX_SIZE_LIMIT: i64 = 1_000_000;

/// Validation errors that can occur during parameter validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    Negative { field: String, value: i64 },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Negative { field, value } => {
                write!(f, "{} = {} must not be negative", field, value)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete parameter set
///
/// Checks for:
/// - Non-negative counts and thresholds
/// - A drawable worker size range (`2 <= MAX_SIZE <= MAX_SIZE_LIMIT`)
/// - Positive durations and periods
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(params: &SimulationParams) -> ConfigResult<()> {
    let errors = collect_errors(params);

    if errors.is_empty() {
        return Ok(());
    }

    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

fn collect_errors(params: &SimulationParams) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("ENERGY_DEMAND", params.energy_demand),
        ("N_INITIAL_WORKERS", params.n_initial_workers),
        ("MIN_VIABLE_SIZE", params.min_viable_size),
        ("N_NEW_PER_TICK", params.n_new_per_tick),
        ("EXPLODE_THRESHOLD", params.explode_threshold),
        ("STEP_INTERVAL", params.step_interval),
        ("MAX_ACTIVE_WORKERS", params.max_active_workers),
    ] {
        if value < 0 {
            errors.push(ConfigValidationError::Negative {
                field: field.to_string(),
                value,
            });
        }
    }

    // Worker sizes are drawn from [1, MAX_SIZE - 1]
    if params.max_size < 2 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "MAX_SIZE".to_string(),
            reason: format!("{} leaves no size to draw from [1, MAX_SIZE-1]", params.max_size),
        });
    }

    if params.max_size > MAX_SIZE_LIMIT {
        errors.push(ConfigValidationError::InvalidValue {
            field: "MAX_SIZE".to_string(),
            reason: format!("{} exceeds the limit of {}", params.max_size, MAX_SIZE_LIMIT),
        });
    }

    if params.sim_duration < 1 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "SIM_DURATION".to_string(),
            reason: "must be at least one tick".to_string(),
        });
    }

    if params.n_new_per_tick > 0 && params.step_interval == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "STEP_INTERVAL".to_string(),
            reason: "must be positive when the feeder injects workers".to_string(),
        });
    }

    if params.rate_interval_ms == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "RATE_INTERVAL_MS".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    if params.tick_interval_ms == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "TICK_INTERVAL_MS".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    if params.throttle > 1 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "THROTTLE".to_string(),
            reason: format!("expected 0 or 1, got {}", params.throttle),
        });
    }

    errors
}
