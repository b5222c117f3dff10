// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Kernel: every shared resource of one run
//!
//! The kernel is created by the supervisor before any other entity starts
//! and handed to each of them as an `Arc<Kernel>`. Workers are started
//! through a [`Launcher`], so tests can replace real threads with doubles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use fission_config::SimulationParams;
use fission_state::{Gate, MetricChannel, MetricKind, SharedState, StateError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, trace, warn};

use crate::supervisor::TerminationCause;
use crate::worker::Worker;

/// Tokens put into `rate_gate` at shutdown so no worker stays parked on it
pub const DRAIN_TOKENS: u32 = 1 << 30;

/// Boxed entry point handed to a [`Launcher`]
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Failure to start a concurrent task
#[derive(Debug, thiserror::Error)]
#[error("failed to launch '{name}': {reason}")]
pub struct SpawnError {
    pub name: String,
    pub reason: String,
}

impl SpawnError {
    pub fn new(name: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Starts detached tasks (one per worker)
pub trait Launcher: Send + Sync {
    fn launch(&self, name: String, task: Task) -> Result<(), SpawnError>;
}

/// Runs every task on its own named OS thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadLauncher;

impl Launcher for ThreadLauncher {
    fn launch(&self, name: String, task: Task) -> Result<(), SpawnError> {
        thread::Builder::new()
            .name(name.clone())
            .spawn(task)
            .map(|_detached| ())
            .map_err(|e| SpawnError::new(name, e))
    }
}

/// The gates of one run
///
/// | gate | initial | discipline |
/// |---|---|---|
/// | `run_flag` | 1 | 0 while the run is live (read by value) |
/// | `start_gate` | 1 | everyone waits for zero |
/// | `rate_gate` | 0 | one token per worker step |
/// | `split_gate` | 1 | 1 while fission is permitted (read by value) |
/// | `critical_section` | 1 | mutex over [`SharedState`] |
/// | `tick_release`, `tick_ack` | 0 | supervisor/controller barrier |
pub struct Gates {
    pub run_flag: Gate,
    pub start_gate: Gate,
    pub rate_gate: Gate,
    pub split_gate: Gate,
    pub critical_section: Arc<Gate>,
    pub tick_release: Gate,
    pub tick_ack: Gate,
}

impl Gates {
    pub fn new() -> Self {
        Self {
            run_flag: Gate::new("run_flag", 1),
            start_gate: Gate::new("start_gate", 1),
            rate_gate: Gate::new("rate_gate", 0),
            split_gate: Gate::new("split_gate", 1),
            critical_section: Arc::new(Gate::new("critical_section", 1)),
            tick_release: Gate::new("tick_release", 0),
            tick_ack: Gate::new("tick_ack", 0),
        }
    }

    fn all(&self) -> [&Gate; 7] {
        [
            &self.run_flag,
            &self.start_gate,
            &self.rate_gate,
            &self.split_gate,
            &*self.critical_section,
            &self.tick_release,
            &self.tick_ack,
        ]
    }

    /// Destroy every gate, reporting the first failure
    ///
    /// Keeps going after an error so one bad gate does not leave the others
    /// holding blocked threads.
    pub fn destroy_all(&self) -> Result<(), StateError> {
        let mut first_error = None;
        for gate in self.all() {
            if let Err(e) = gate.destroy() {
                warn!("[KERNEL] {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for Gates {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared resources of one simulation run
pub struct Kernel {
    params: SimulationParams,
    gates: Gates,
    channel: MetricChannel,
    state: SharedState,
    launcher: Arc<dyn Launcher>,
    next_task_id: AtomicU64,
}

impl Kernel {
    pub fn new(params: SimulationParams, launcher: Arc<dyn Launcher>) -> Arc<Self> {
        let gates = Gates::new();
        let state = SharedState::new(gates.critical_section.clone(), params.throttle_enabled());
        Arc::new(Self {
            params,
            gates,
            channel: MetricChannel::new(),
            state,
            launcher,
            next_task_id: AtomicU64::new(0),
        })
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn gates(&self) -> &Gates {
        &self.gates
    }

    pub fn channel(&self) -> &MetricChannel {
        &self.channel
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Whether the run is live (`run_flag` reads zero)
    pub fn is_running(&self) -> bool {
        self.gates.run_flag.peek() == 0
    }

    /// Mark the run live and open the start gate
    pub fn begin_run(&self) -> Result<(), StateError> {
        self.gates.run_flag.acquire()?;
        self.gates.start_gate.acquire()
    }

    /// Clear the run flag; polling entities wind down on their next check
    pub fn end_run(&self) -> Result<(), StateError> {
        self.gates.run_flag.release()
    }

    /// Fresh RNG for one task
    ///
    /// With `SEED = 0` every task draws from OS entropy; otherwise task `k`
    /// always gets the same stream for a given seed.
    pub fn task_rng(&self) -> (u64, StdRng) {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let rng = match self.params.seed {
            0 => StdRng::from_entropy(),
            seed => StdRng::seed_from_u64(seed ^ id.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        };
        (id, rng)
    }
}

/// Start a worker of `size`
///
/// The +1 population delta is posted before the launch, so a child is never
/// counted after its parent's exit. A failed launch cancels that delta and
/// posts MELTDOWN.
pub fn spawn_worker(kernel: &Arc<Kernel>, size: i64) -> Result<(), SpawnError> {
    let (id, rng) = kernel.task_rng();
    let channel = kernel.channel();
    channel.send(MetricKind::PopulationDelta, 1);

    let worker = Worker::new(kernel.clone(), id, size, rng);
    match kernel
        .launcher
        .launch(format!("fission-worker-{}", id), Box::new(move || {
            worker.run();
        })) {
        Ok(()) => {
            trace!("[KERNEL] Launched worker {} (size {})", id, size);
            Ok(())
        }
        Err(e) => {
            error!("[KERNEL] {}", e);
            channel.send(MetricKind::PopulationDelta, -1);
            channel.send(MetricKind::TerminationCause, TerminationCause::Meltdown.code());
            Err(e)
        }
    }
}
