// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Fission State
//!
//! Shared runtime state and synchronization primitives for the fission
//! simulator. Every entity of a run (supervisor, feeder, rate limiter,
//! throttle controller, workers) talks to the others only through the three
//! pieces in this crate.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   SharedState                       │  ← Cache-line aligned atomics
//! │   (guarded by `critical_section`)   │    multi-field updates via CriticalSection
//! └─────────────────────────────────────┘
//!           ↑
//! ┌─────────────────────────────────────┐
//! │   Gate                              │  ← Counting semaphore: mutex, flag-by-value,
//! │                                     │    token bucket, barrier half
//! └─────────────────────────────────────┘
//!           ↑
//! ┌─────────────────────────────────────┐
//! │   MetricChannel                     │  ← Unbounded per-kind FIFO lanes,
//! │                                     │    drained once per tick
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use fission_state::{Gate, MetricChannel, MetricKind, SharedState};
//!
//! let critical_section = Arc::new(Gate::new("critical_section", 1));
//! let state = SharedState::new(critical_section, false);
//! let channel = MetricChannel::new();
//!
//! channel.send(MetricKind::PopulationDelta, 1);
//! channel.send(MetricKind::PopulationDelta, 1);
//!
//! {
//!     let cs = state.enter()?;
//!     cs.add_active_workers(channel.drain_sum(MetricKind::PopulationDelta));
//! }
//! assert_eq!(state.snapshot().active_workers, 2);
//! # Ok::<(), fission_state::StateError>(())
//! ```

pub mod gate;
pub mod metric_channel;
pub mod shared_state;

pub use gate::Gate;
pub use metric_channel::{MetricChannel, MetricKind};
pub use shared_state::{CriticalSection, SharedState, SimulationCounters, StateSnapshot};

/// Resource failures of the shared primitives
///
/// Any of these is fatal to a run.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    /// Operation on a gate after `destroy()`
    #[error("gate '{0}' has been destroyed")]
    GateDestroyed(&'static str),

    /// Every handle on the other side of a metric lane is gone
    #[error("metric channel lane {0:?} is closed")]
    ChannelClosed(MetricKind),
}

pub type Result<T> = std::result::Result<T, StateError>;
