// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Rate limiter: one worker step per interval
//!
//! Tokens are only released while somebody is parked on `rate_gate`, so idle
//! intervals do not bank credit for later.

use std::sync::Arc;
use std::thread;

use fission_state::MetricKind;
use tracing::{debug, info, warn};

use crate::kernel::{Kernel, DRAIN_TOKENS};

pub struct RateLimiter {
    kernel: Arc<Kernel>,
}

impl RateLimiter {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self { kernel }
    }

    /// Release tokens until the run stops, then flood the gate
    ///
    /// Returns the number of activations posted.
    pub fn run(self) -> u64 {
        let gates = self.kernel.gates();
        let interval = self.kernel.params().rate_interval();

        if gates.start_gate.wait_until_zero().is_err() {
            return 0;
        }
        info!("[RATE-LIMITER] Started: one step every {:?}", interval);

        let mut activations = 0u64;
        while self.kernel.is_running() {
            match gates.rate_gate.waiter_count() {
                Ok(0) => {}
                Ok(_) => {
                    if gates.rate_gate.release().is_err() {
                        break;
                    }
                    self.kernel.channel().send(MetricKind::ActivationCount, 1);
                    activations += 1;
                }
                Err(_) => break,
            }
            thread::sleep(interval);
        }

        if let Err(e) = gates.rate_gate.force_set(DRAIN_TOKENS) {
            warn!("[RATE-LIMITER] Could not open rate gate on exit: {}", e);
        }
        debug!("[RATE-LIMITER] Stopped after {} activation(s)", activations);
        activations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_support::{params, RecordingLauncher};
    use std::time::{Duration, Instant};

    fn kernel() -> Arc<Kernel> {
        let kernel = Kernel::new(params(), Arc::new(RecordingLauncher::default()));
        kernel.begin_run().unwrap();
        kernel
    }

    #[test]
    fn test_no_waiters_no_activations() {
        let kernel = kernel();
        let handle = thread::spawn({
            let k = kernel.clone();
            move || RateLimiter::new(k).run()
        });

        thread::sleep(Duration::from_millis(40));
        kernel.end_run().unwrap();

        assert_eq!(handle.join().unwrap(), 0);
        assert_eq!(kernel.channel().drain_sum(MetricKind::ActivationCount), 0);
        assert_eq!(kernel.gates().rate_gate.peek(), DRAIN_TOKENS);
    }

    #[test]
    fn test_releases_parked_worker() {
        let kernel = kernel();
        let parked = thread::spawn({
            let k = kernel.clone();
            move || k.gates().rate_gate.acquire()
        });
        let limiter = thread::spawn({
            let k = kernel.clone();
            move || RateLimiter::new(k).run()
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while !parked.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(parked.is_finished());
        parked.join().unwrap().unwrap();

        kernel.end_run().unwrap();
        let activations = limiter.join().unwrap();
        assert!(activations >= 1);
        assert_eq!(
            kernel.channel().drain_sum(MetricKind::ActivationCount),
            activations as i64
        );
    }
}
