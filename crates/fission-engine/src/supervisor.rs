// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Supervisor: startup, the tick loop, termination and teardown
//!
//! ## Tick
//! 1. Drain energy, split, waste and activation counts from the bus
//! 2. Fold them (and the population deltas) into the shared counters,
//!    withdrawing the demand
//! 3. Hand the tick to the throttle controller and wait for its ack
//! 4. Report, then clear the per-tick counters
//! 5. EXPLODE, else BLACKOUT, else TIMEOUT, else keep going
//!
//! Between ticks the supervisor waits on the termination-cause lane, so a
//! MELTDOWN posted by any spawner ends the run before the next evaluation.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fission_config::{validate_config, SimulationParams};
use fission_state::{MetricKind, StateSnapshot};
use tracing::{debug, info, warn};

use crate::feeder::Feeder;
use crate::kernel::{spawn_worker, Kernel, Launcher, SpawnError, DRAIN_TOKENS};
use crate::rate_limiter::RateLimiter;
use crate::reporter::{StatusReporter, TickReport};
use crate::throttle::ThrottleController;
use crate::{EngineError, Result};

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationCause {
    Timeout,
    Explode,
    Blackout,
    Meltdown,
}

impl TerminationCause {
    /// Payload on the termination-cause lane
    pub fn code(self) -> i64 {
        match self {
            TerminationCause::Timeout => 0,
            TerminationCause::Explode => 1,
            TerminationCause::Blackout => 2,
            TerminationCause::Meltdown => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TerminationCause::Timeout),
            1 => Some(TerminationCause::Explode),
            2 => Some(TerminationCause::Blackout),
            3 => Some(TerminationCause::Meltdown),
            _ => None,
        }
    }

    /// Process exit status for this cause
    pub fn exit_code(self) -> i32 {
        self.code() as i32
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationCause::Timeout => "TIMEOUT",
            TerminationCause::Explode => "EXPLODE",
            TerminationCause::Blackout => "BLACKOUT",
            TerminationCause::Meltdown => "MELTDOWN",
        };
        f.write_str(name)
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub cause: TerminationCause,
    pub ticks: i64,
    /// Counters after teardown
    pub final_state: StateSnapshot,
    pub total_splits: i64,
    pub total_waste: i64,
    pub total_activations: i64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    splits: i64,
    waste: i64,
    activations: i64,
}

struct Service {
    name: &'static str,
    handle: JoinHandle<u64>,
}

pub struct Supervisor {
    kernel: Arc<Kernel>,
    reporter: Box<dyn StatusReporter>,
    services: Vec<Service>,
    tick: i64,
    totals: Totals,
    shut_down: bool,
}

impl Supervisor {
    pub fn new(
        params: SimulationParams,
        launcher: Arc<dyn Launcher>,
        reporter: Box<dyn StatusReporter>,
    ) -> Self {
        Self::with_kernel(Kernel::new(params, launcher), reporter)
    }

    pub fn with_kernel(kernel: Arc<Kernel>, reporter: Box<dyn StatusReporter>) -> Self {
        Self {
            kernel,
            reporter,
            services: Vec::new(),
            tick: 0,
            totals: Totals::default(),
            shut_down: false,
        }
    }

    /// Handle for out-of-band control (throttle toggling)
    pub fn kernel(&self) -> Arc<Kernel> {
        self.kernel.clone()
    }

    /// Ticks evaluated so far
    pub fn ticks(&self) -> i64 {
        self.tick
    }

    /// Validate, start up, tick until a cause is set, tear down
    ///
    /// Parameters that fail [`validate_config`] are returned as
    /// `EngineError::Config` before any thread starts. On a resource failure
    /// the run is still torn down (best effort) before the error is returned.
    pub fn run(mut self) -> Result<SimulationOutcome> {
        let result = validate_config(self.kernel.params())
            .map_err(EngineError::from)
            .and_then(|()| self.startup())
            .and_then(|()| self.main_loop());
        let teardown = self.shutdown();

        let cause = match result {
            Ok(cause) => cause,
            Err(e) => {
                if let Err(teardown_err) = teardown {
                    warn!("[SUPERVISOR] Teardown after failure also failed: {}", teardown_err);
                }
                return Err(e);
            }
        };
        teardown?;

        let outcome = SimulationOutcome {
            cause,
            ticks: self.tick,
            final_state: self.kernel.state().snapshot(),
            total_splits: self.totals.splits,
            total_waste: self.totals.waste,
            total_activations: self.totals.activations,
        };
        self.reporter.finish(&outcome);
        Ok(outcome)
    }

    /// Start the services and initial workers, count down, open the run
    pub fn startup(&mut self) -> Result<()> {
        let kernel = self.kernel.clone();
        let params = kernel.params();

        info!(
            "[SUPERVISOR] Starting simulation: {} initial worker(s) of size {}, {} tick(s)",
            params.n_initial_workers, params.max_size, params.sim_duration
        );

        self.start_service("fission-feeder", {
            let k = kernel.clone();
            move || Feeder::new(k).run()
        })?;
        self.start_service("fission-rate-limiter", {
            let k = kernel.clone();
            move || RateLimiter::new(k).run()
        })?;
        if kernel.state().throttle_enabled() {
            self.start_service("fission-throttle", {
                let k = kernel.clone();
                move || ThrottleController::new(k).run()
            })?;
        }

        for _ in 0..params.n_initial_workers {
            if spawn_worker(&kernel, params.max_size).is_err() {
                warn!("[SUPERVISOR] ⚠️ Initial population incomplete, MELTDOWN posted");
                break;
            }
        }

        let mut countdown = params.countdown();
        while !countdown.is_zero() {
            info!("[SUPERVISOR] Starting in {}...", countdown.as_secs());
            let step = countdown.min(Duration::from_secs(1));
            thread::sleep(step);
            countdown -= step;
        }

        kernel.begin_run()?;
        info!("[SUPERVISOR] ✅ Simulation running");
        Ok(())
    }

    fn start_service<F>(&mut self, name: &'static str, entry: F) -> Result<()>
    where
        F: FnOnce() -> u64 + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(entry)
            .map_err(|e| SpawnError::new(name, e))?;
        self.services.push(Service { name, handle });
        Ok(())
    }

    fn main_loop(&mut self) -> Result<TerminationCause> {
        let interval = self.kernel.params().tick_interval();
        loop {
            if let Some(cause) = self.await_posted_cause(Instant::now() + interval) {
                info!("[SUPERVISOR] {} reported before tick {}", cause, self.tick + 1);
                return Ok(cause);
            }
            if let Some(cause) = self.tick()? {
                return Ok(cause);
            }
        }
    }

    /// Wait until `deadline` for a cause posted on the bus
    fn await_posted_cause(&self, deadline: Instant) -> Option<TerminationCause> {
        let channel = self.kernel.channel();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let code = channel.recv_timeout(MetricKind::TerminationCause, remaining)?;
            match TerminationCause::from_code(code) {
                Some(cause) => return Some(cause),
                None => warn!("[SUPERVISOR] Ignoring unknown termination code {}", code),
            }
        }
    }

    /// Evaluate one tick
    pub fn tick(&mut self) -> Result<Option<TerminationCause>> {
        let kernel = self.kernel.clone();
        let params = kernel.params();
        let channel = kernel.channel();
        let gates = kernel.gates();
        let state = kernel.state();

        self.tick += 1;

        let energy_tick = channel.drain_sum(MetricKind::EnergyProduced);
        let splits = channel.drain_sum(MetricKind::SplitCount);
        let waste = channel.drain_sum(MetricKind::WasteCount);
        let activations = channel.drain_sum(MetricKind::ActivationCount);

        {
            let cs = state.enter()?;
            cs.set_energy_total_tick(energy_tick);
            cs.add_energy_total(energy_tick);
            cs.add_energy_withdrawn(params.energy_demand);
            cs.add_energy_total(-params.energy_demand);
            cs.add_active_workers(channel.drain_sum(MetricKind::PopulationDelta));
        }
        self.totals.splits += splits;
        self.totals.waste += waste;
        self.totals.activations += activations;

        if state.throttle_enabled() {
            gates.tick_release.release()?;
            gates.tick_ack.acquire()?;
        }

        let snapshot = {
            let cs = state.enter()?;
            let snapshot = cs.snapshot();
            self.reporter.report(&TickReport {
                tick: self.tick,
                remaining: params.sim_duration - self.tick,
                active_workers: snapshot.active_workers,
                energy_total: snapshot.energy_total,
                energy_total_tick: snapshot.energy_total_tick,
                energy_withdrawn: snapshot.energy_withdrawn,
                energy_demand: params.energy_demand,
                activations,
                splits,
                waste,
                energy_absorbed_tick: snapshot.energy_absorbed_tick,
                throttle_active: snapshot.throttle_enabled.then_some(snapshot.throttle_active),
                split_gate_open: gates.split_gate.peek() != 0,
            });
            cs.set_energy_total_tick(0);
            cs.set_energy_absorbed_tick(0);
            snapshot
        };

        let cause = self.evaluate(&snapshot);
        if let Some(cause) = cause {
            info!(
                "[SUPERVISOR] {} at tick {} (energy {})",
                cause, self.tick, snapshot.energy_total
            );
        }
        Ok(cause)
    }

    fn evaluate(&self, snapshot: &StateSnapshot) -> Option<TerminationCause> {
        let params = self.kernel.params();
        if snapshot.energy_total > params.explode_threshold {
            Some(TerminationCause::Explode)
        } else if snapshot.energy_total < params.energy_demand {
            Some(TerminationCause::Blackout)
        } else if self.tick >= params.sim_duration {
            Some(TerminationCause::Timeout)
        } else {
            None
        }
    }

    /// Stop every entity, wait for workers to drain, destroy the kernel
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let kernel = self.kernel.clone();
        let gates = kernel.gates();
        let timeout = kernel.params().shutdown_timeout();

        info!("[SUPERVISOR] Stopping simulation...");
        kernel.end_run()?;

        // Nobody may stay parked: workers that never saw the start, and
        // workers waiting for a step token
        if gates.start_gate.peek() != 0 {
            gates.start_gate.force_set(0)?;
        }
        gates.rate_gate.force_set(DRAIN_TOKENS)?;

        self.drain_population(timeout)?;
        gates.tick_release.release()?;

        for service in self.services.drain(..) {
            join_with_timeout(service, timeout);
        }

        gates.destroy_all()?;
        let undelivered = kernel.channel().clone().destroy();
        if undelivered > 0 {
            debug!("[SUPERVISOR] {} metric(s) left undelivered", undelivered);
        }

        info!("[SUPERVISOR] ✅ Simulation stopped cleanly");
        Ok(())
    }

    fn drain_population(&self, timeout: Duration) -> Result<()> {
        let channel = self.kernel.channel();
        let state = self.kernel.state();
        let deadline = Instant::now() + timeout;

        state
            .enter()?
            .add_active_workers(channel.drain_sum(MetricKind::PopulationDelta));

        loop {
            let active = state.active_workers();
            if active <= 0 {
                debug!("[SUPERVISOR] All workers exited");
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    "[SUPERVISOR] ⚠️ {} worker(s) still active after {:?}, proceeding with shutdown",
                    active, timeout
                );
                return Ok(());
            }

            if let Some(delta) = channel.recv_timeout(MetricKind::PopulationDelta, remaining) {
                state.enter()?.add_active_workers(delta);
            }
        }
    }
}

/// Join a service thread, giving up after `timeout`
fn join_with_timeout(service: Service, timeout: Duration) {
    let Service { name, handle } = service;
    let start = Instant::now();
    let (tx, rx) = mpsc::channel();

    // JoinHandle has no timed join, so wait for it from a helper thread
    thread::spawn(move || {
        let _ = tx.send(handle.join());
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(count)) => debug!("[SUPERVISOR] {} stopped (count={})", name, count),
        Ok(Err(_)) => warn!("[SUPERVISOR] ⚠️ {} panicked during shutdown", name),
        Err(RecvTimeoutError::Timeout) => warn!(
            "[SUPERVISOR] ⚠️ {} did not stop within {:?}, proceeding with shutdown",
            name,
            start.elapsed()
        ),
        Err(RecvTimeoutError::Disconnected) => {
            warn!("[SUPERVISOR] ⚠️ Join thread for {} disconnected unexpectedly", name)
        }
    }
}
