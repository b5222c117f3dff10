// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Fission Engine
//!
//! The concurrency kernel of the simulator. A [`Supervisor`] owns one
//! [`Kernel`] (gates, metric bus and shared counters) and drives a fixed
//! tick; every other entity runs on its own thread and talks to the rest
//! only through the kernel.
//!
//! ```text
//!                 ┌──────────────┐  tick_release / tick_ack  ┌────────────────────┐
//!                 │  Supervisor  │◄─────────────────────────►│ ThrottleController │
//!                 └──────┬───────┘                           └─────────┬──────────┘
//!          drain_sum()   │ critical_section                 split_gate │ critical_section
//!                 ┌──────▼───────────────────────────────────────────── ▼──────────┐
//!                 │   Kernel: Gates + MetricChannel + SharedState                   │
//!                 └──────▲──────────────────▲──────────────────────▲───────────────┘
//!                  send()│        rate_gate │ release       spawn  │
//!                 ┌──────┴───┐      ┌───────┴──────┐        ┌──────┴───┐
//!                 │ Workers  │      │ RateLimiter  │        │  Feeder  │
//!                 └──────────┘      └──────────────┘        └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fission_config::SimulationParams;
//! use fission_engine::{LogReporter, Supervisor, ThreadLauncher};
//! use std::sync::Arc;
//!
//! let params = SimulationParams::default();
//! let supervisor = Supervisor::new(params, Arc::new(ThreadLauncher), Box::new(LogReporter));
//! let outcome = supervisor.run()?;
//! std::process::exit(outcome.cause.exit_code());
//! # Ok::<(), fission_engine::EngineError>(())
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod feeder;
pub mod kernel;
pub mod rate_limiter;
pub mod reporter;
pub mod supervisor;
pub mod throttle;
pub mod worker;

pub use feeder::Feeder;
pub use kernel::{spawn_worker, Gates, Kernel, Launcher, SpawnError, Task, ThreadLauncher, DRAIN_TOKENS};
pub use rate_limiter::RateLimiter;
pub use reporter::{LogReporter, StatusReporter, TickReport};
pub use supervisor::{SimulationOutcome, Supervisor, TerminationCause};
pub use throttle::{ThrottleController, ThrottleDecision};
pub use worker::{fission_energy, Worker, WorkerExit};

use fission_config::ConfigError;
use fission_state::StateError;

/// Errors surfaced by the supervisor API
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A shared primitive failed; the run cannot continue
    #[error("resource failure: {0}")]
    Resource(#[from] StateError),

    /// A service thread could not be started
    #[error("spawn failure: {0}")]
    Spawn(#[from] SpawnError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
