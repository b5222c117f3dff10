// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Typed metric bus.

Producers (workers, feeder, rate limiter) post integer values tagged with a
[`MetricKind`]; the supervisor drains them once per tick. Each kind is its own
unbounded crossbeam lane, so receiving one kind never observes another and
ordering is FIFO within a kind only.

ARCHITECTURE:
- Producers: `send()` never blocks
- Supervisor: `drain_sum()` folds everything queued at call time into one delta
- Termination causes are awaited with `recv_timeout()` between ticks
*/

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::{Result, StateError};

/// Message kinds carried by the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// +1 worker started, -1 worker exited
    PopulationDelta,
    /// Energy released by one fission
    EnergyProduced,
    /// +1 per fission
    SplitCount,
    /// +1 per worker that fell below the viable size
    WasteCount,
    /// +1 per token released by the rate limiter
    ActivationCount,
    /// Termination cause code
    TerminationCause,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::PopulationDelta,
        MetricKind::EnergyProduced,
        MetricKind::SplitCount,
        MetricKind::WasteCount,
        MetricKind::ActivationCount,
        MetricKind::TerminationCause,
    ];

    /// Wire type code of the kind
    pub fn code(self) -> i64 {
        match self {
            MetricKind::PopulationDelta => 4,
            MetricKind::EnergyProduced => 5,
            MetricKind::SplitCount => 9,
            MetricKind::WasteCount => 10,
            MetricKind::ActivationCount => 12,
            MetricKind::TerminationCause => 15,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    fn index(self) -> usize {
        match self {
            MetricKind::PopulationDelta => 0,
            MetricKind::EnergyProduced => 1,
            MetricKind::SplitCount => 2,
            MetricKind::WasteCount => 3,
            MetricKind::ActivationCount => 4,
            MetricKind::TerminationCause => 5,
        }
    }
}

struct Lane {
    tx: Sender<i64>,
    rx: Receiver<i64>,
}

/// Multi-producer, multi-consumer metric bus
///
/// Cloning is cheap and every clone shares the same lanes.
#[derive(Clone)]
pub struct MetricChannel {
    lanes: Arc<[Lane; 6]>,
}

impl MetricChannel {
    pub fn new() -> Self {
        let lane = || {
            let (tx, rx) = unbounded();
            Lane { tx, rx }
        };
        Self {
            lanes: Arc::new([lane(), lane(), lane(), lane(), lane(), lane()]),
        }
    }

    fn lane(&self, kind: MetricKind) -> &Lane {
        &self.lanes[kind.index()]
    }

    /// Post a value (never blocks)
    pub fn send(&self, kind: MetricKind, value: i64) {
        // Each lane holds its own receiver, so this only fails if the bus is gone
        if self.lane(kind).tx.send(value).is_err() {
            warn!("[METRICS] Dropped {:?}={} on a closed lane", kind, value);
        }
    }

    /// Block until a value of `kind` arrives
    pub fn recv_blocking(&self, kind: MetricKind) -> Result<i64> {
        self.lane(kind)
            .rx
            .recv()
            .map_err(|_| StateError::ChannelClosed(kind))
    }

    /// Next value of `kind`, or `None` if none is queued
    pub fn recv_nonblocking(&self, kind: MetricKind) -> Option<i64> {
        self.lane(kind).rx.try_recv().ok()
    }

    /// Wait up to `timeout` for a value of `kind`
    pub fn recv_timeout(&self, kind: MetricKind, timeout: Duration) -> Option<i64> {
        self.lane(kind).rx.recv_timeout(timeout).ok()
    }

    /// Sum of every value of `kind` queued at call time (0 if none)
    ///
    /// Messages posted while draining are left for the next call, so a busy
    /// producer cannot keep the drain running forever.
    pub fn drain_sum(&self, kind: MetricKind) -> i64 {
        let rx = &self.lane(kind).rx;
        let queued = rx.len();
        rx.try_iter().take(queued).sum()
    }

    /// Number of queued values of `kind`
    pub fn pending(&self, kind: MetricKind) -> usize {
        self.lane(kind).rx.len()
    }

    /// Drop this handle, returning how many messages were still queued
    pub fn destroy(self) -> usize {
        let leftover: usize = MetricKind::ALL
            .into_iter()
            .map(|kind| self.pending(kind))
            .sum();
        if leftover > 0 {
            debug!("[METRICS] Destroying bus with {} undelivered messages", leftover);
        }
        leftover
    }
}

impl Default for MetricChannel {
    fn default() -> Self {
        Self::new()
    }
}
