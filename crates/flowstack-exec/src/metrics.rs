//! Task-level counters.
//!
//! Counters are atomics so a host thread can read them while the task runs;
//! the task itself only ever increments from one thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use flowstack_mem::{SpillCounters, SpillCountersSnapshot};

#[derive(Debug, Default)]
pub struct TaskCounters {
    records_read: AtomicU64,
    records_skipped: AtomicU64,
    source_diverted: AtomicU64,
    groups_reduced: AtomicU64,
    spill: Arc<SpillCounters>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCountersSnapshot {
    pub records_read: u64,
    /// Records the source turned into nothing.
    pub records_skipped: u64,
    pub source_diverted: u64,
    pub groups_reduced: u64,
    /// Records pushed into each chain, in chain order.
    pub chain_records: Vec<u64>,
    /// Records diverted by stage traps across all chains.
    pub diverted: u64,
    pub spill: SpillCountersSnapshot,
}

impl TaskCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared with every co-group buffer of the task.
    pub fn spill(&self) -> &Arc<SpillCounters> {
        &self.spill
    }

    pub fn record_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_diverted(&self) {
        self.source_diverted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_group(&self) {
        self.groups_reduced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_read(&self) -> u64 {
        self.records_read.load(Ordering::Relaxed)
    }

    pub fn groups_reduced(&self) -> u64 {
        self.groups_reduced.load(Ordering::Relaxed)
    }

    /// Task-wide counters; per-chain figures are filled in by the stacks.
    pub fn snapshot(&self) -> TaskCountersSnapshot {
        TaskCountersSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            source_diverted: self.source_diverted.load(Ordering::Relaxed),
            groups_reduced: self.groups_reduced.load(Ordering::Relaxed),
            chain_records: Vec::new(),
            diverted: 0,
            spill: self.spill.snapshot(),
        }
    }
}

impl TaskCountersSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
