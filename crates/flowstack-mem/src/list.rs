//! Append-only tuple list that spills to storage past a threshold.
//!
//! Iteration replays spilled segments first, in write order, then the
//! in-memory tail, so the caller always sees append order.

use std::sync::Arc;

use flowstack_core::id::SpillId;
use flowstack_core::types::Tuple;

use crate::error::Result;
use crate::spill::{SegmentMeta, SpillManager};
use crate::tracking::{SpillEvent, SpillListener};

pub struct SpillableList {
    manager: Arc<SpillManager>,
    spill_id: SpillId,
    threshold_tuples: usize,
    threshold_bytes: Option<usize>,
    current: Vec<Tuple>,
    current_bytes: usize,
    segments: Vec<SegmentMeta>,
    len: usize,
    grouping: Option<Tuple>,
    listener: Option<SpillListener>,
}

impl SpillableList {
    /// `threshold_tuples` is clamped to at least one.
    pub fn new(
        manager: Arc<SpillManager>,
        threshold_tuples: usize,
        threshold_bytes: Option<usize>,
    ) -> Self {
        let spill_id = manager.next_spill_id();
        Self {
            manager,
            spill_id,
            threshold_tuples: threshold_tuples.max(1),
            threshold_bytes,
            current: Vec::new(),
            current_bytes: 0,
            segments: Vec::new(),
            len: 0,
            grouping: None,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: SpillListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn spill_id(&self) -> SpillId {
        self.spill_id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of segments currently on storage.
    pub fn spill_count(&self) -> usize {
        self.segments.len()
    }

    pub fn in_memory(&self) -> usize {
        self.current.len()
    }

    /// Diagnostic tag reported with spill events.
    pub fn set_grouping(&mut self, grouping: Option<Tuple>) {
        self.grouping = grouping;
    }

    pub fn grouping(&self) -> Option<&Tuple> {
        self.grouping.as_ref()
    }

    pub fn add(&mut self, tuple: Tuple) -> Result<()> {
        self.current_bytes += tuple.estimated_bytes();
        self.current.push(tuple);
        self.len += 1;

        if let Some(reason) = self.spill_reason() {
            self.spill(reason)?;
        }
        Ok(())
    }

    fn spill_reason(&self) -> Option<&'static str> {
        if self.current.len() >= self.threshold_tuples {
            return Some("tuple count threshold");
        }
        match self.threshold_bytes {
            Some(limit) if self.current_bytes >= limit => Some("estimated bytes threshold"),
            _ => None,
        }
    }

    fn spill(&mut self, reason: &'static str) -> Result<()> {
        if let Some(listener) = &self.listener {
            listener(&SpillEvent::WriteBegin {
                spill_count: self.segments.len() + 1,
                size: self.current.len(),
                reason,
                grouping: self.grouping.as_ref(),
            });
        }

        let meta = self.manager.write_segment(&self.current, self.spill_id)?;
        self.segments.push(meta);
        self.current.clear();
        self.current_bytes = 0;
        Ok(())
    }

    /// Empty the list for reuse. Spilled segments are deleted; the in-memory
    /// allocation is kept.
    pub fn clear(&mut self) -> Result<()> {
        let mut first_err = None;
        for meta in self.segments.drain(..) {
            if let Err(e) = self.manager.delete_segment(&meta) {
                first_err.get_or_insert(e);
            }
        }
        self.current.clear();
        self.current_bytes = 0;
        self.len = 0;
        self.grouping = None;

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Replay every tuple in append order. Restartable; each call starts over.
    pub fn iter(&self) -> SpillableIter<'_> {
        SpillableIter {
            list: self,
            next_segment: 0,
            loaded: Vec::new().into_iter(),
            memory: self.current.iter(),
            failed: false,
        }
    }
}

impl Drop for SpillableList {
    fn drop(&mut self) {
        for meta in self.segments.drain(..) {
            if let Err(_e) = self.manager.delete_segment(&meta) {
                #[cfg(feature = "tracing")]
                tracing::warn!(segment = %meta.name.0, error = %_e, "failed to delete spill segment");
            }
        }
    }
}

pub struct SpillableIter<'a> {
    list: &'a SpillableList,
    next_segment: usize,
    loaded: std::vec::IntoIter<Tuple>,
    memory: std::slice::Iter<'a, Tuple>,
    failed: bool,
}

impl Iterator for SpillableIter<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(t) = self.loaded.next() {
                return Some(Ok(t));
            }
            let Some(meta) = self.list.segments.get(self.next_segment) else {
                break;
            };
            self.next_segment += 1;

            if let Some(listener) = &self.list.listener {
                listener(&SpillEvent::ReadBegin {
                    spill_count: self.next_segment,
                    size: meta.tuple_count as usize,
                    grouping: self.list.grouping.as_ref(),
                });
            }
            match self.list.manager.read_segment(meta) {
                Ok(tuples) => self.loaded = tuples.into_iter(),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        self.memory.next().cloned().map(Ok)
    }
}
