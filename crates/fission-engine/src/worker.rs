// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Worker: the fission state machine
//!
//! ```text
//! Spawned(n) ──wait start_gate──► loop while running:
//!     n < min_viable or n <= 1  ──► Exited(Waste)        posts -1, waste +1
//!     acquire rate_gate
//!     run stopped               ──► Exited(Normal)       posts -1
//!     split_gate closed         ──► next step
//!     fission(child)            ──► n -= child, spawn child, post energy + split
//! loop condition fails          ──► Exited(Normal)       posts -1
//! ```

use std::sync::Arc;

use fission_state::MetricKind;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, trace};

use crate::kernel::{spawn_worker, Kernel};

/// Energy released by one fission
///
/// `n_after` is the parent size after the child has been split off.
/// Saturates at `i64::MAX` instead of overflowing.
pub fn fission_energy(n_after: i64, child: i64) -> i64 {
    n_after
        .saturating_mul(child)
        .saturating_sub(n_after.max(child))
}

/// How a worker left the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Fell below the viable size
    Waste,
    /// The run stopped
    Normal,
    /// A child could not be started
    Meltdown,
}

pub struct Worker {
    kernel: Arc<Kernel>,
    id: u64,
    size: i64,
    rng: StdRng,
}

impl Worker {
    pub fn new(kernel: Arc<Kernel>, id: u64, size: i64, rng: StdRng) -> Self {
        Self {
            kernel,
            id,
            size,
            rng,
        }
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    /// Run to completion on the calling thread
    ///
    /// Posts exactly one -1 population delta whichever way it exits.
    pub fn run(mut self) -> WorkerExit {
        let exit = self.run_loop();
        let channel = self.kernel.channel();
        channel.send(MetricKind::PopulationDelta, -1);
        if exit == WorkerExit::Waste {
            channel.send(MetricKind::WasteCount, 1);
        }
        trace!("[WORKER] {} exited {:?} at size {}", self.id, exit, self.size);
        exit
    }

    fn run_loop(&mut self) -> WorkerExit {
        let kernel = self.kernel.clone();
        let gates = kernel.gates();
        let min_viable = kernel.params().min_viable_size;

        if gates.start_gate.wait_until_zero().is_err() {
            return WorkerExit::Normal;
        }

        while kernel.is_running() {
            if self.size < min_viable || self.size <= 1 {
                return WorkerExit::Waste;
            }

            if gates.rate_gate.acquire().is_err() || !kernel.is_running() {
                return WorkerExit::Normal;
            }

            if gates.split_gate.peek() == 0 {
                continue;
            }

            if !self.split() {
                return WorkerExit::Meltdown;
            }
        }

        WorkerExit::Normal
    }

    /// Split off a child of uniform size in `[1, n-1]`
    fn split(&mut self) -> bool {
        let child = self.rng.gen_range(1..self.size);
        self.size -= child;

        if spawn_worker(&self.kernel, child).is_err() {
            debug!("[WORKER] {} could not start a child, giving up", self.id);
            return false;
        }

        let channel = self.kernel.channel();
        channel.send(MetricKind::EnergyProduced, fission_energy(self.size, child));
        channel.send(MetricKind::SplitCount, 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_support::{params, FailingLauncher, RecordingLauncher};
    use crate::kernel::DRAIN_TOKENS;
    use crate::supervisor::TerminationCause;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use std::thread;
    use std::time::Duration;

    fn started_kernel(
        min_viable: i64,
        launcher: Arc<dyn crate::kernel::Launcher>,
    ) -> Arc<Kernel> {
        let mut p = params();
        p.min_viable_size = min_viable;
        let kernel = Kernel::new(p, launcher);
        kernel.begin_run().unwrap();
        kernel
    }

    fn worker(kernel: &Arc<Kernel>, size: i64) -> Worker {
        Worker::new(kernel.clone(), 0, size, StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_energy_formula() {
        assert_eq!(fission_energy(6, 4), 24 - 6);
        assert_eq!(fission_energy(1, 1), 0);
        assert_eq!(fission_energy(2, 7), 14 - 7);
    }

    #[test]
    fn test_energy_saturates_for_huge_sizes() {
        assert_eq!(
            fission_energy(5_000_000_000, 5_000_000_000),
            i64::MAX - 5_000_000_000
        );
        assert_eq!(fission_energy(i64::MAX, 1), 0);
        assert!(fission_energy(i64::MAX / 2, 3) > 0);
    }

    #[test]
    fn test_below_viable_size_is_waste() {
        let kernel = started_kernel(5, Arc::new(RecordingLauncher::default()));

        assert_eq!(worker(&kernel, 3).run(), WorkerExit::Waste);

        let channel = kernel.channel();
        assert_eq!(channel.drain_sum(MetricKind::PopulationDelta), -1);
        assert_eq!(channel.drain_sum(MetricKind::WasteCount), 1);
        assert_eq!(channel.drain_sum(MetricKind::SplitCount), 0);
    }

    #[test]
    fn test_size_one_is_terminal_even_with_zero_floor() {
        let kernel = started_kernel(0, Arc::new(RecordingLauncher::default()));
        assert_eq!(worker(&kernel, 1).run(), WorkerExit::Waste);
    }

    #[test]
    fn test_splits_until_waste() {
        let launcher = Arc::new(RecordingLauncher::default());
        let kernel = started_kernel(1, launcher.clone());
        kernel.gates().rate_gate.force_set(DRAIN_TOKENS).unwrap();

        let w = worker(&kernel, 10);
        assert_eq!(w.run(), WorkerExit::Waste);

        let splits = launcher.launched.lock().len() as i64;
        let channel = kernel.channel();
        assert!(splits >= 1);
        assert_eq!(channel.drain_sum(MetricKind::SplitCount), splits);
        // One +1 per child, one -1 for the parent
        assert_eq!(channel.drain_sum(MetricKind::PopulationDelta), splits - 1);
        assert_eq!(channel.drain_sum(MetricKind::WasteCount), 1);
        assert!(channel.drain_sum(MetricKind::EnergyProduced) >= 0);
    }

    #[test]
    fn test_closed_split_gate_blocks_fission() {
        let launcher = Arc::new(RecordingLauncher::default());
        let kernel = started_kernel(1, launcher.clone());
        kernel.gates().split_gate.force_set(0).unwrap();

        let k = kernel.clone();
        let handle = thread::spawn(move || worker(&k, 10).run());

        for _ in 0..20 {
            kernel.gates().rate_gate.release().unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        kernel.end_run().unwrap();
        kernel.gates().rate_gate.force_set(DRAIN_TOKENS).unwrap();

        assert_eq!(handle.join().unwrap(), WorkerExit::Normal);
        assert!(launcher.launched.lock().is_empty());
        let channel = kernel.channel();
        assert_eq!(channel.drain_sum(MetricKind::PopulationDelta), -1);
        assert_eq!(channel.drain_sum(MetricKind::WasteCount), 0);
    }

    #[test]
    fn test_stopped_run_exits_without_waste() {
        let kernel = started_kernel(1, Arc::new(RecordingLauncher::default()));
        kernel.end_run().unwrap();

        assert_eq!(worker(&kernel, 10).run(), WorkerExit::Normal);
        assert_eq!(kernel.channel().drain_sum(MetricKind::PopulationDelta), -1);
        assert_eq!(kernel.channel().drain_sum(MetricKind::WasteCount), 0);
    }

    #[test]
    fn test_child_spawn_failure_melts_down() {
        let kernel = started_kernel(1, Arc::new(FailingLauncher));
        kernel.gates().rate_gate.force_set(DRAIN_TOKENS).unwrap();

        assert_eq!(worker(&kernel, 10).run(), WorkerExit::Meltdown);

        let channel = kernel.channel();
        assert_eq!(
            channel.recv_nonblocking(MetricKind::TerminationCause),
            Some(TerminationCause::Meltdown.code())
        );
        // Child's +1 cancelled, parent's own -1 posted
        assert_eq!(channel.drain_sum(MetricKind::PopulationDelta), -1);
        assert_eq!(channel.drain_sum(MetricKind::EnergyProduced), 0);
    }

    proptest! {
        #[test]
        fn energy_is_never_negative_for_valid_splits(n in 2i64..10_000, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let child = rng.gen_range(1..n);
            let after = n - child;
            prop_assert!(after >= 1);
            prop_assert!(fission_energy(after, child) >= 0);
        }
    }
}
