// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! `SimulationParams` maps one-to-one onto the keys of the parameter file.
//! Every field accepts both the historical key (`N_ATOMI_INIT`, `STEP`, ...)
//! and the descriptive key used when the struct is serialized back out.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default population bound used by the throttle controller
pub const DEFAULT_MAX_ACTIVE_WORKERS: i64 = 1000;
/// Default rate limiter polling interval
pub const DEFAULT_RATE_INTERVAL_MS: u64 = 500;
/// Default supervisor tick period
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
/// Default launch countdown
pub const DEFAULT_COUNTDOWN_SECS: u64 = 3;
/// Default bound on the shutdown drain
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

/// Simulation parameters
///
/// Core keys default to zero when absent from the file. The extended keys
/// (`MAX_ACTIVE_WORKERS` onwards) carry the defaults above.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Energy withdrawn from the total every tick
    #[serde(rename = "ENERGY_DEMAND")]
    pub energy_demand: i64,

    /// Workers launched by the supervisor before the countdown
    #[serde(rename = "N_INITIAL_WORKERS", alias = "N_ATOMI_INIT")]
    pub n_initial_workers: i64,

    /// Size of the initial workers and upper bound (exclusive) for fed workers
    #[serde(rename = "MAX_SIZE", alias = "N_ATOM_MAX")]
    pub max_size: i64,

    /// Workers smaller than this become waste
    #[serde(rename = "MIN_VIABLE_SIZE", alias = "MIN_N_ATOMICO")]
    pub min_viable_size: i64,

    /// Workers injected by the feeder per step
    #[serde(rename = "N_NEW_PER_TICK", alias = "N_NUOVI_ATOMI")]
    pub n_new_per_tick: i64,

    /// Number of ticks before the run times out
    #[serde(rename = "SIM_DURATION")]
    pub sim_duration: i64,

    /// Total energy above which the run explodes
    #[serde(rename = "EXPLODE_THRESHOLD", alias = "ENERGY_EXPLODE_THRESHOLD")]
    pub explode_threshold: i64,

    /// Feeder pacing in microseconds
    #[serde(rename = "STEP_INTERVAL", alias = "STEP")]
    pub step_interval: i64,

    #[serde(rename = "MAX_ACTIVE_WORKERS")]
    pub max_active_workers: i64,

    #[serde(rename = "RATE_INTERVAL_MS")]
    pub rate_interval_ms: u64,

    #[serde(rename = "TICK_INTERVAL_MS")]
    pub tick_interval_ms: u64,

    #[serde(rename = "COUNTDOWN_SECS")]
    pub countdown_secs: u64,

    #[serde(rename = "SHUTDOWN_TIMEOUT_MS")]
    pub shutdown_timeout_ms: u64,

    /// RNG seed for worker size draws (0 = seed from entropy)
    #[serde(rename = "SEED")]
    pub seed: u64,

    /// Start the throttle controller (0/1)
    #[serde(rename = "THROTTLE")]
    pub throttle: u8,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            energy_demand: 0,
            n_initial_workers: 0,
            max_size: 0,
            min_viable_size: 0,
            n_new_per_tick: 0,
            sim_duration: 0,
            explode_threshold: 0,
            step_interval: 0,
            max_active_workers: DEFAULT_MAX_ACTIVE_WORKERS,
            rate_interval_ms: DEFAULT_RATE_INTERVAL_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            seed: 0,
            throttle: 0,
        }
    }
}

impl SimulationParams {
    /// Whether the throttle controller takes part in this run
    pub fn throttle_enabled(&self) -> bool {
        self.throttle != 0
    }

    /// Feeder pacing (negative values clamp to zero)
    pub fn step_interval(&self) -> Duration {
        Duration::from_micros(self.step_interval.max(0) as u64)
    }

    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.rate_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations() {
        let params = SimulationParams {
            step_interval: 1_500_000,
            ..Default::default()
        };
        assert_eq!(params.step_interval(), Duration::from_millis(1500));
        assert_eq!(params.rate_interval(), Duration::from_millis(500));
        assert_eq!(params.tick_interval(), Duration::from_secs(1));
        assert_eq!(params.countdown(), Duration::from_secs(3));
    }

    #[test]
    fn test_negative_step_clamps() {
        let params = SimulationParams {
            step_interval: -5,
            ..Default::default()
        };
        assert_eq!(params.step_interval(), Duration::ZERO);
    }
}
