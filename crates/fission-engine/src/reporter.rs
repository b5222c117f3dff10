// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-tick status reporting

use tracing::info;

use crate::supervisor::SimulationOutcome;

/// Everything the supervisor knows at the end of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: i64,
    /// Ticks left before TIMEOUT
    pub remaining: i64,
    pub active_workers: i64,
    pub energy_total: i64,
    pub energy_total_tick: i64,
    pub energy_withdrawn: i64,
    pub energy_demand: i64,
    pub activations: i64,
    pub splits: i64,
    pub waste: i64,
    pub energy_absorbed_tick: i64,
    /// `None` when no controller takes part in the run
    pub throttle_active: Option<bool>,
    pub split_gate_open: bool,
}

/// Sink for tick reports
pub trait StatusReporter: Send {
    fn report(&mut self, report: &TickReport);

    /// Called once after the run has been torn down
    fn finish(&mut self, _outcome: &SimulationOutcome) {}
}

/// Writes one structured `tracing` event per tick
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&mut self, r: &TickReport) {
        let throttle = match r.throttle_active {
            Some(true) => "ACTIVE",
            Some(false) => "INACTIVE",
            None => "OFF",
        };
        let split_gate = if r.split_gate_open { "OPEN" } else { "CLOSED" };
        info!(
            tick = r.tick,
            remaining = r.remaining,
            active_workers = r.active_workers,
            activations = r.activations,
            energy_total = r.energy_total,
            energy_tick = r.energy_total_tick,
            energy_withdrawn = r.energy_withdrawn,
            demand = r.energy_demand,
            splits = r.splits,
            waste = r.waste,
            absorbed = r.energy_absorbed_tick,
            throttle,
            split_gate,
            "[SUPERVISOR] Tick {} ({} remaining)",
            r.tick,
            r.remaining
        );
    }

    fn finish(&mut self, outcome: &SimulationOutcome) {
        let s = &outcome.final_state;
        info!(
            "[SUPERVISOR] Simulation ended by {} after {} tick(s)",
            outcome.cause, outcome.ticks
        );
        info!(
            "[SUPERVISOR]   energy total={} withdrawn={} absorbed={}",
            s.energy_total, s.energy_withdrawn, s.energy_absorbed
        );
        info!(
            "[SUPERVISOR]   splits={} waste={} activations={} workers still active={}",
            outcome.total_splits, outcome.total_waste, outcome.total_activations, s.active_workers
        );
    }
}
