// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Counting gate
//!
//! A semaphore with the full set of operations the simulation needs: blocking
//! acquire/release, wait-until-zero, non-blocking peek, forced set and a
//! count of blocked acquirers. The same primitive serves as a mutex
//! (`critical_section`), a boolean read by value (`run_flag`, `split_gate`),
//! a token bucket (`rate_gate`) and one half of a two-phase barrier.
//!
//! Condition variable waits are re-checked in a loop, so spurious wakeups are
//! retried transparently. `destroy()` wakes every waiter with
//! [`StateError::GateDestroyed`].

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::{Result, StateError};

struct GateInner {
    value: u32,
    /// Threads blocked in `acquire` waiting for the value to rise
    waiters: usize,
    destroyed: bool,
}

pub struct Gate {
    name: &'static str,
    inner: Mutex<GateInner>,
    /// Signalled when the value becomes positive
    nonzero: Condvar,
    /// Signalled when the value drops to zero
    zero: Condvar,
}

impl Gate {
    /// Create a gate with an initial value
    pub fn new(name: &'static str, initial: u32) -> Self {
        trace!("[GATE] {} created with value {}", name, initial);
        Self {
            name,
            inner: Mutex::new(GateInner {
                value: initial,
                waiters: 0,
                destroyed: false,
            }),
            nonzero: Condvar::new(),
            zero: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Block while the value is zero, then decrement it
    pub fn acquire(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.value == 0 && !inner.destroyed {
            inner.waiters += 1;
            while inner.value == 0 && !inner.destroyed {
                self.nonzero.wait(&mut inner);
            }
            inner.waiters -= 1;
        }

        if inner.destroyed {
            return Err(StateError::GateDestroyed(self.name));
        }

        inner.value -= 1;
        if inner.value == 0 {
            self.zero.notify_all();
        }
        Ok(())
    }

    /// Decrement without blocking; `Ok(false)` if the value was zero
    pub fn try_acquire(&self) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return Err(StateError::GateDestroyed(self.name));
        }
        if inner.value == 0 {
            return Ok(false);
        }
        inner.value -= 1;
        if inner.value == 0 {
            self.zero.notify_all();
        }
        Ok(true)
    }

    /// Increment the value, waking one blocked acquirer
    pub fn release(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return Err(StateError::GateDestroyed(self.name));
        }
        inner.value = inner.value.saturating_add(1);
        self.nonzero.notify_one();
        Ok(())
    }

    /// Block until the value is zero without changing it
    pub fn wait_until_zero(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        while inner.value != 0 && !inner.destroyed {
            self.zero.wait(&mut inner);
        }
        if inner.destroyed {
            return Err(StateError::GateDestroyed(self.name));
        }
        Ok(())
    }

    /// Current value (non-blocking)
    pub fn peek(&self) -> u32 {
        self.inner.lock().value
    }

    /// Overwrite the value, waking whichever side the new value satisfies
    pub fn force_set(&self, value: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return Err(StateError::GateDestroyed(self.name));
        }
        inner.value = value;
        if value > 0 {
            self.nonzero.notify_all();
        } else {
            self.zero.notify_all();
        }
        Ok(())
    }

    /// Number of threads currently blocked in `acquire`
    pub fn waiter_count(&self) -> Result<usize> {
        let inner = self.inner.lock();
        if inner.destroyed {
            return Err(StateError::GateDestroyed(self.name));
        }
        Ok(inner.waiters)
    }

    /// Tear the gate down, failing every current and future wait
    pub fn destroy(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return Err(StateError::GateDestroyed(self.name));
        }
        inner.destroyed = true;
        self.nonzero.notify_all();
        self.zero.notify_all();
        debug!(
            "[GATE] {} destroyed (value={}, waiters={})",
            self.name, inner.value, inner.waiters
        );
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Gate")
            .field("name", &self.name)
            .field("value", &inner.value)
            .field("waiters", &inner.waiters)
            .field("destroyed", &inner.destroyed)
            .finish()
    }
}
