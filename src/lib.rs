// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Fission - population simulator on a small concurrency kernel
//!
//! A population of workers splits, decays and releases energy while a
//! supervisor aggregates their metrics once per tick, optionally throttled
//! by a feedback controller.
//!
//! ## Feature Flags
//!
//! - **`engine`** (default): supervisor, workers and the `fission-sim` binary
//! - **`file-logging`**: per-run JSON log files
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fission::prelude::*;
//! use std::sync::Arc;
//!
//! let params = load_config(None, None)?;
//! validate_config(&params)?;
//!
//! let outcome = Supervisor::new(params, Arc::new(ThreadLauncher), Box::new(LogReporter)).run()?;
//! println!("ended by {} after {} ticks", outcome.cause, outcome.ticks);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export foundation
pub use fission_config as config;
pub use fission_state as state;

// Re-export runtime
#[cfg(feature = "engine")]
pub use fission_engine as engine;

#[cfg(feature = "engine")]
pub use fission_observability as observability;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::config::{load_config, validate_config, SimulationParams};
    pub use crate::state::{Gate, MetricChannel, MetricKind, SharedState, StateSnapshot};

    #[cfg(feature = "engine")]
    pub use crate::engine::{
        Launcher, LogReporter, SimulationOutcome, StatusReporter, Supervisor, TerminationCause,
        ThreadLauncher, TickReport,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let params = SimulationParams::default();
        assert_eq!(params.max_active_workers, 1000);
        assert_eq!(MetricKind::TerminationCause.code(), 15);
    }
}
