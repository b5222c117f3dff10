// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Throttle controller
//!
//! Runs once per tick between `tick_release` and `tick_ack`. When active it
//! absorbs energy above three quarters of the explode threshold (bringing the
//! total back to half the threshold) and closes the split gate while the
//! population is above `max_active_workers`.

use std::sync::Arc;

use fission_state::StateError;
use tracing::{debug, info, warn};

use crate::kernel::Kernel;

/// Result of one controller evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    /// Energy removed this tick
    pub absorbed: i64,
    /// Split gate value written
    pub split_open: bool,
}

pub struct ThrottleController {
    kernel: Arc<Kernel>,
}

impl ThrottleController {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self { kernel }
    }

    /// One evaluation under the critical section
    pub fn evaluate(&self) -> Result<ThrottleDecision, StateError> {
        let params = self.kernel.params();
        let threshold = params.explode_threshold;

        let cs = self.kernel.state().enter()?;
        let overload = cs.energy_total() + cs.energy_total_tick();

        // overload > 0.75 * threshold, in integers
        let absorbed = if i128::from(overload) * 4 > i128::from(threshold) * 3 {
            let absorbed = overload - threshold / 2;
            cs.add_energy_absorbed(absorbed);
            cs.set_energy_total(overload - absorbed);
            absorbed
        } else {
            0
        };
        cs.set_energy_absorbed_tick(absorbed);

        let split_open = cs.active_workers() <= params.max_active_workers;
        self.kernel
            .gates()
            .split_gate
            .force_set(u32::from(split_open))?;
        drop(cs);

        if absorbed > 0 {
            debug!("[THROTTLE] Absorbed {} energy", absorbed);
        }
        Ok(ThrottleDecision {
            absorbed,
            split_open,
        })
    }

    /// Serve the tick barrier until the run stops
    ///
    /// Returns the number of ticks served.
    pub fn run(self) -> u64 {
        let gates = self.kernel.gates();
        let state = self.kernel.state();

        if gates.start_gate.wait_until_zero().is_err() {
            return 0;
        }
        info!("[THROTTLE] Started (active: {})", state.throttle_active());

        let mut ticks = 0u64;
        while self.kernel.is_running() {
            if gates.tick_release.acquire().is_err() || !self.kernel.is_running() {
                break;
            }

            if state.throttle_active() {
                if let Err(e) = self.evaluate() {
                    warn!("[THROTTLE] Evaluation failed: {}", e);
                }
            }

            ticks += 1;
            if gates.tick_ack.release().is_err() {
                break;
            }
        }

        debug!("[THROTTLE] Stopped after {} tick(s)", ticks);
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_support::{params, RecordingLauncher};
    use std::thread;

    fn kernel(threshold: i64, max_active: i64) -> Arc<Kernel> {
        let mut p = params();
        p.explode_threshold = threshold;
        p.max_active_workers = max_active;
        p.throttle = 1;
        Kernel::new(p, Arc::new(RecordingLauncher::default()))
    }

    #[test]
    fn test_population_above_limit_closes_split_gate() {
        let kernel = kernel(1_000_000, 1000);
        kernel.state().enter().unwrap().add_active_workers(1500);

        let decision = ThrottleController::new(kernel.clone()).evaluate().unwrap();

        assert!(!decision.split_open);
        assert_eq!(kernel.gates().split_gate.peek(), 0);
    }

    #[test]
    fn test_population_at_limit_keeps_split_gate_open() {
        let kernel = kernel(1_000_000, 1000);
        kernel.gates().split_gate.force_set(0).unwrap();
        kernel.state().enter().unwrap().add_active_workers(1000);

        let decision = ThrottleController::new(kernel.clone()).evaluate().unwrap();

        assert!(decision.split_open);
        assert_eq!(kernel.gates().split_gate.peek(), 1);
    }

    #[test]
    fn test_absorbs_above_three_quarters() {
        let kernel = kernel(1000, 1000);
        {
            let cs = kernel.state().enter().unwrap();
            cs.set_energy_total(700);
            cs.set_energy_total_tick(100);
        }

        let decision = ThrottleController::new(kernel.clone()).evaluate().unwrap();

        // overload 800 > 750: absorb 800 - 500
        assert_eq!(decision.absorbed, 300);
        let snapshot = kernel.state().snapshot();
        assert_eq!(snapshot.energy_total, 500);
        assert_eq!(snapshot.energy_absorbed, 300);
        assert_eq!(snapshot.energy_absorbed_tick, 300);
    }

    #[test]
    fn test_exactly_three_quarters_is_not_absorbed() {
        let kernel = kernel(1000, 1000);
        kernel.state().enter().unwrap().set_energy_total(750);

        let decision = ThrottleController::new(kernel.clone()).evaluate().unwrap();

        assert_eq!(decision.absorbed, 0);
        assert_eq!(kernel.state().snapshot().energy_total, 750);
    }

    #[test]
    fn test_acks_every_tick_even_when_inactive() {
        let kernel = kernel(1000, 1000);
        kernel.state().set_throttle_active(false);
        kernel.state().enter().unwrap().add_active_workers(5000);
        kernel.begin_run().unwrap();

        let handle = thread::spawn({
            let k = kernel.clone();
            move || ThrottleController::new(k).run()
        });

        let gates = kernel.gates();
        for _ in 0..3 {
            gates.tick_release.release().unwrap();
            gates.tick_ack.acquire().unwrap();
        }
        // Inactive controller leaves the gate alone
        assert_eq!(gates.split_gate.peek(), 1);

        kernel.end_run().unwrap();
        gates.tick_release.release().unwrap();
        assert_eq!(handle.join().unwrap(), 3);
    }
}
