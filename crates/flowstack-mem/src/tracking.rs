//! Spill counters and listener events.
//!
//! Counters are atomics so the host can read them while a task runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use flowstack_core::types::Tuple;

/// Emitted by a spillable list around segment I/O.
#[derive(Debug, Clone, Copy)]
pub enum SpillEvent<'a> {
    /// About to write a segment. `spill_count` includes this one.
    WriteBegin {
        spill_count: usize,
        size: usize,
        reason: &'static str,
        grouping: Option<&'a Tuple>,
    },
    /// About to replay a spilled segment.
    ReadBegin {
        spill_count: usize,
        size: usize,
        grouping: Option<&'a Tuple>,
    },
}

pub type SpillListener = Arc<dyn Fn(&SpillEvent<'_>) + Send + Sync>;

/// Box a closure as a [`SpillListener`].
pub fn spill_listener<F>(f: F) -> SpillListener
where
    F: Fn(&SpillEvent<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Default)]
pub struct SpillCounters {
    spills_written: AtomicU64,
    spills_read: AtomicU64,
    tuples_spilled: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpillCountersSnapshot {
    pub spills_written: u64,
    pub spills_read: u64,
    pub tuples_spilled: u64,
}

impl SpillCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: &SpillEvent<'_>) {
        match event {
            SpillEvent::WriteBegin { size, .. } => {
                self.spills_written.fetch_add(1, Ordering::Relaxed);
                self.tuples_spilled
                    .fetch_add(*size as u64, Ordering::Relaxed);
            }
            SpillEvent::ReadBegin { .. } => {
                self.spills_read.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> SpillCountersSnapshot {
        SpillCountersSnapshot {
            spills_written: self.spills_written.load(Ordering::Relaxed),
            spills_read: self.spills_read.load(Ordering::Relaxed),
            tuples_spilled: self.tuples_spilled.load(Ordering::Relaxed),
        }
    }
}
