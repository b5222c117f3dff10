// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared simulation counters
//!
//! The counters live in a cache-line aligned block of atomics. Reads of a
//! single field are lock-free; updates that span several fields go through a
//! [`CriticalSection`], which holds the `critical_section` gate for its
//! lifetime. The block itself is never handed out, so every cross-field
//! write is serialized by that gate.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::gate::Gate;
use crate::Result;

/// Counter block (64 bytes, cache-line aligned)
#[repr(C, align(64))]
pub struct SimulationCounters {
    active_workers: AtomicI64,
    energy_total: AtomicI64,
    energy_total_tick: AtomicI64,
    energy_withdrawn: AtomicI64,
    energy_absorbed: AtomicI64,
    energy_absorbed_tick: AtomicI64,

    throttle_enabled: AtomicBool,
    throttle_active: AtomicBool,
}

impl SimulationCounters {
    fn new(throttle_enabled: bool) -> Self {
        Self {
            active_workers: AtomicI64::new(0),
            energy_total: AtomicI64::new(0),
            energy_total_tick: AtomicI64::new(0),
            energy_withdrawn: AtomicI64::new(0),
            energy_absorbed: AtomicI64::new(0),
            energy_absorbed_tick: AtomicI64::new(0),
            throttle_enabled: AtomicBool::new(throttle_enabled),
            throttle_active: AtomicBool::new(true),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub active_workers: i64,
    pub energy_total: i64,
    pub energy_total_tick: i64,
    pub energy_withdrawn: i64,
    pub energy_absorbed: i64,
    pub energy_absorbed_tick: i64,
    pub throttle_enabled: bool,
    pub throttle_active: bool,
}

/// Accessor for the shared counter block
pub struct SharedState {
    counters: SimulationCounters,
    critical_section: Arc<Gate>,
}

impl SharedState {
    /// Create zeroed counters guarded by `critical_section`
    ///
    /// `throttle_enabled` is fixed for the run; `throttle_active` starts on.
    pub fn new(critical_section: Arc<Gate>, throttle_enabled: bool) -> Self {
        Self {
            counters: SimulationCounters::new(throttle_enabled),
            critical_section,
        }
    }

    /// Enter the critical section (blocks on the gate)
    pub fn enter(&self) -> Result<CriticalSection<'_>> {
        self.critical_section.acquire()?;
        Ok(CriticalSection { state: self })
    }

    /// Lock-free copy of every field
    ///
    /// Fields are read one by one, so a snapshot taken outside the critical
    /// section may mix values from either side of a concurrent update.
    pub fn snapshot(&self) -> StateSnapshot {
        let c = &self.counters;
        StateSnapshot {
            active_workers: c.active_workers.load(Ordering::Acquire),
            energy_total: c.energy_total.load(Ordering::Acquire),
            energy_total_tick: c.energy_total_tick.load(Ordering::Acquire),
            energy_withdrawn: c.energy_withdrawn.load(Ordering::Acquire),
            energy_absorbed: c.energy_absorbed.load(Ordering::Acquire),
            energy_absorbed_tick: c.energy_absorbed_tick.load(Ordering::Acquire),
            throttle_enabled: c.throttle_enabled.load(Ordering::Acquire),
            throttle_active: c.throttle_active.load(Ordering::Acquire),
        }
    }

    pub fn active_workers(&self) -> i64 {
        self.counters.active_workers.load(Ordering::Acquire)
    }

    pub fn throttle_enabled(&self) -> bool {
        self.counters.throttle_enabled.load(Ordering::Acquire)
    }

    pub fn throttle_active(&self) -> bool {
        self.counters.throttle_active.load(Ordering::Acquire)
    }

    pub fn set_throttle_active(&self, active: bool) {
        self.counters.throttle_active.store(active, Ordering::Release);
    }

    /// Flip `throttle_active`, returning the new value
    ///
    /// Has no effect (and returns `false`) when no controller takes part in
    /// the run.
    pub fn toggle_throttle(&self) -> bool {
        if !self.throttle_enabled() {
            return false;
        }
        let active = !self.counters.throttle_active.fetch_xor(true, Ordering::AcqRel);
        info!(
            "[STATE] Throttle controller {}",
            if active { "ACTIVE" } else { "INACTIVE" }
        );
        active
    }
}

/// Exclusive access to the counters, released on drop
pub struct CriticalSection<'a> {
    state: &'a SharedState,
}

impl CriticalSection<'_> {
    fn counters(&self) -> &SimulationCounters {
        &self.state.counters
    }

    pub fn active_workers(&self) -> i64 {
        self.counters().active_workers.load(Ordering::Relaxed)
    }

    pub fn add_active_workers(&self, delta: i64) {
        self.counters().active_workers.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn energy_total(&self) -> i64 {
        self.counters().energy_total.load(Ordering::Relaxed)
    }

    pub fn set_energy_total(&self, value: i64) {
        self.counters().energy_total.store(value, Ordering::Relaxed);
    }

    pub fn add_energy_total(&self, delta: i64) {
        self.counters().energy_total.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn energy_total_tick(&self) -> i64 {
        self.counters().energy_total_tick.load(Ordering::Relaxed)
    }

    pub fn set_energy_total_tick(&self, value: i64) {
        self.counters().energy_total_tick.store(value, Ordering::Relaxed);
    }

    pub fn energy_withdrawn(&self) -> i64 {
        self.counters().energy_withdrawn.load(Ordering::Relaxed)
    }

    pub fn add_energy_withdrawn(&self, delta: i64) {
        self.counters().energy_withdrawn.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn energy_absorbed(&self) -> i64 {
        self.counters().energy_absorbed.load(Ordering::Relaxed)
    }

    pub fn add_energy_absorbed(&self, delta: i64) {
        self.counters().energy_absorbed.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn energy_absorbed_tick(&self) -> i64 {
        self.counters().energy_absorbed_tick.load(Ordering::Relaxed)
    }

    pub fn set_energy_absorbed_tick(&self, value: i64) {
        self.counters().energy_absorbed_tick.store(value, Ordering::Relaxed);
    }

    /// Consistent copy of every field
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.state.critical_section.release() {
            warn!("[STATE] Failed to leave critical section: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn new_state(throttle: bool) -> SharedState {
        SharedState::new(Arc::new(Gate::new("critical_section", 1)), throttle)
    }

    #[test]
    fn test_counter_block_size() {
        assert_eq!(std::mem::size_of::<SimulationCounters>(), 64);
        assert_eq!(std::mem::align_of::<SimulationCounters>(), 64);
    }

    #[test]
    fn test_critical_section_holds_gate() {
        let gate = Arc::new(Gate::new("critical_section", 1));
        let state = SharedState::new(gate.clone(), false);
        {
            let cs = state.enter().unwrap();
            assert_eq!(gate.peek(), 0);
            cs.add_energy_total(40);
            cs.add_energy_total(-15);
        }
        assert_eq!(gate.peek(), 1);
        assert_eq!(state.snapshot().energy_total, 25);
    }

    #[test]
    fn test_concurrent_updates_serialize() {
        let state = Arc::new(new_state(false));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let s = state.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        let cs = s.enter().unwrap();
                        let total = cs.energy_total();
                        cs.set_energy_total(total + 1);
                        cs.add_active_workers(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = state.snapshot();
        assert_eq!(snapshot.energy_total, 1000);
        assert_eq!(snapshot.active_workers, 1000);
    }

    #[test]
    fn test_toggle_requires_enabled_throttle() {
        let disabled = new_state(false);
        assert!(!disabled.toggle_throttle());
        assert!(disabled.throttle_active());

        let enabled = new_state(true);
        assert!(enabled.throttle_active());
        assert!(!enabled.toggle_throttle());
        assert!(!enabled.throttle_active());
        assert!(enabled.toggle_throttle());
    }

    #[test]
    fn test_enter_fails_after_destroy() {
        let gate = Arc::new(Gate::new("critical_section", 1));
        let state = SharedState::new(gate.clone(), false);
        gate.destroy().unwrap();
        assert!(state.enter().is_err());
    }
}
