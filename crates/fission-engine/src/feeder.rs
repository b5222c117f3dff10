// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Feeder: periodic injection of fresh workers

use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, error, info};

use crate::kernel::{spawn_worker, Kernel};

pub struct Feeder {
    kernel: Arc<Kernel>,
    rng: StdRng,
}

impl Feeder {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        let (_, rng) = kernel.task_rng();
        Self { kernel, rng }
    }

    /// Every `step_interval`, start up to `n_new_per_tick` workers of random
    /// size in `[1, max_size - 1]` while the split gate is open
    ///
    /// Returns the number of workers started. A failed launch ends the feeder
    /// (MELTDOWN has already been posted by then).
    pub fn run(mut self) -> u64 {
        let kernel = self.kernel.clone();
        let params = kernel.params();
        let gates = kernel.gates();
        let per_step = params.n_new_per_tick;
        let step = params.step_interval();

        if gates.start_gate.wait_until_zero().is_err() {
            return 0;
        }

        if per_step <= 0 {
            info!("[FEEDER] Nothing to feed (N_NEW_PER_TICK = {})", per_step);
            return 0;
        }

        info!("[FEEDER] Started: {} worker(s) every {:?}", per_step, step);
        let mut fed = 0u64;

        while kernel.is_running() {
            thread::sleep(step);

            for _ in 0..per_step {
                if !kernel.is_running() {
                    break;
                }
                if gates.split_gate.peek() == 0 {
                    continue;
                }

                let size = self.rng.gen_range(1..params.max_size);
                if let Err(e) = spawn_worker(&kernel, size) {
                    error!("[FEEDER] Stopping after launch failure: {}", e);
                    return fed;
                }
                fed += 1;
            }
        }

        debug!("[FEEDER] Stopped after feeding {} worker(s)", fed);
        fed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_support::{params, FailingLauncher, RecordingLauncher};
    use crate::supervisor::TerminationCause;
    use fission_state::MetricKind;
    use std::time::Duration;

    fn kernel_with(n_new: i64, launcher: Arc<dyn crate::kernel::Launcher>) -> Arc<Kernel> {
        let mut p = params();
        p.n_new_per_tick = n_new;
        p.step_interval = 2_000;
        Kernel::new(p, launcher)
    }

    #[test]
    fn test_feeds_while_running() {
        let launcher = Arc::new(RecordingLauncher::default());
        let kernel = kernel_with(3, launcher.clone());
        kernel.begin_run().unwrap();

        let handle = thread::spawn({
            let k = kernel.clone();
            move || Feeder::new(k).run()
        });
        thread::sleep(Duration::from_millis(30));
        kernel.end_run().unwrap();
        let fed = handle.join().unwrap();

        assert!(fed >= 3);
        assert_eq!(launcher.launched.lock().len() as u64, fed);
        assert_eq!(
            kernel.channel().drain_sum(MetricKind::PopulationDelta),
            fed as i64
        );
    }

    #[test]
    fn test_closed_split_gate_feeds_nothing() {
        let launcher = Arc::new(RecordingLauncher::default());
        let kernel = kernel_with(3, launcher.clone());
        kernel.gates().split_gate.force_set(0).unwrap();
        kernel.begin_run().unwrap();

        let handle = thread::spawn({
            let k = kernel.clone();
            move || Feeder::new(k).run()
        });
        thread::sleep(Duration::from_millis(20));
        kernel.end_run().unwrap();

        assert_eq!(handle.join().unwrap(), 0);
        assert!(launcher.launched.lock().is_empty());
    }

    #[test]
    fn test_launch_failure_stops_feeder() {
        let kernel = kernel_with(2, Arc::new(FailingLauncher));
        kernel.begin_run().unwrap();

        assert_eq!(Feeder::new(kernel.clone()).run(), 0);
        assert_eq!(
            kernel.channel().recv_nonblocking(MetricKind::TerminationCause),
            Some(TerminationCause::Meltdown.code())
        );
        assert_eq!(kernel.channel().drain_sum(MetricKind::PopulationDelta), 0);
    }

    #[test]
    fn test_zero_per_step_returns_immediately() {
        let kernel = kernel_with(0, Arc::new(RecordingLauncher::default()));
        kernel.begin_run().unwrap();
        assert_eq!(Feeder::new(kernel).run(), 0);
    }
}
