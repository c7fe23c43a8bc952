use std::cell::RefCell;
use std::sync::Arc;

use flowstack_core::schema::Fields;
use flowstack_core::types::{TaggedTuple, Tuple};
use flowstack_mem::{spill_listener, SpillCounters, SpillListener, TupleCollection, TupleCollectionFactory};

use super::{JoinerClosure, TupleIter};
use crate::error::{Result, StageError};

/// All tuples of one key, tagged by input position.
pub type GroupInput = Box<dyn Iterator<Item = TaggedTuple>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Position 0 without self-joins: read lazily from the live input.
    PassThrough,
    /// Handle into `buffers`. Self-join positions share one handle.
    Buffer(usize),
}

enum PassThrough {
    Empty,
    Pending { head: Tuple, rest: GroupInput },
    Consumed,
}

/// Per-key partitioning of tagged tuples into per-position collections.
///
/// Input 0 is never copied: the external sort delivers a key's input-0
/// tuples after every other input's, so once the first of them shows up the
/// remaining live iterator *is* position 0. Self-joins disable this, since all
/// positions replay the same buffer.
pub struct CoGroupClosure {
    name: String,
    slots: Vec<Slot>,
    key_arity: Vec<usize>,
    buffers: Vec<Box<dyn TupleCollection>>,
    pass_through: RefCell<PassThrough>,
    self_joins: usize,
}

impl CoGroupClosure {
    /// `key_fields` holds one entry per input; with self-joins only the first
    /// entry is used and the width is `num_self_joins + 1`.
    pub fn new(
        name: impl Into<String>,
        key_fields: &[Fields],
        num_self_joins: usize,
        factory: &dyn TupleCollectionFactory,
        counters: Arc<SpillCounters>,
    ) -> Result<Self> {
        let name = name.into();
        let Some(first) = key_fields.first() else {
            return Err(StageError::Config(format!(
                "group '{name}' declares no grouping fields"
            )));
        };

        let (slots, key_arity, buffer_count) = if num_self_joins > 0 {
            let width = num_self_joins + 1;
            (vec![Slot::Buffer(0); width], vec![first.size(); width], 1)
        } else {
            let width = key_fields.len();
            let slots = std::iter::once(Slot::PassThrough)
                .chain((0..width - 1).map(Slot::Buffer))
                .collect();
            (slots, key_fields.iter().map(Fields::size).collect(), width - 1)
        };

        let buffers = (0..buffer_count)
            .map(|i| {
                let listener = buffer_listener(format!("{name}[{i}]"), Arc::clone(&counters));
                factory.create(Some(listener))
            })
            .collect();

        Ok(Self {
            name,
            slots,
            key_arity,
            buffers,
            pass_through: RefCell::new(PassThrough::Empty),
            self_joins: num_self_joins,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load the tuples of the next key, discarding the previous key's.
    pub fn reset(&mut self, key: &Tuple, values: GroupInput) -> Result<()> {
        for buffer in self.buffers.iter_mut() {
            buffer.clear()?;
            buffer.set_grouping(Some(key.clone()));
        }
        *self.pass_through.get_mut() = PassThrough::Empty;

        let loaded = self.load(values);
        self.tag_groupings(key);
        loaded
    }

    fn load(&mut self, mut values: GroupInput) -> Result<()> {
        if self.self_joins > 0 {
            for tagged in values {
                self.buffers[0].add(tagged.tuple)?;
            }
            return Ok(());
        }

        while let Some(tagged) = values.next() {
            match self.slots.get(tagged.index) {
                Some(Slot::Buffer(handle)) => self.buffers[*handle].add(tagged.tuple)?,
                Some(Slot::PassThrough) => {
                    *self.pass_through.get_mut() = PassThrough::Pending {
                        head: tagged.tuple,
                        rest: values,
                    };
                    return Ok(());
                }
                None => {
                    return Err(StageError::Index {
                        position: tagged.index,
                        width: self.slots.len(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Each buffer's grouping is its position's share of `group_tuple`: the
    /// key, or nulls of the key arity when the position came up empty.
    fn tag_groupings(&mut self, key: &Tuple) {
        for (position, slot) in self.slots.iter().enumerate() {
            if let Slot::Buffer(handle) = *slot {
                let buffer = &mut self.buffers[handle];
                let grouping = if buffer.is_empty() {
                    Tuple::nulls(self.key_arity[position])
                } else {
                    key.clone()
                };
                buffer.set_grouping(Some(grouping));
            }
        }
    }

    /// Segments currently spilled across all buffers.
    pub fn spill_count(&self) -> usize {
        self.buffers.iter().map(|b| b.spill_count()).sum()
    }

    fn slot(&self, position: usize) -> Result<Slot> {
        self.slots.get(position).copied().ok_or(StageError::Index {
            position,
            width: self.slots.len(),
        })
    }
}

impl JoinerClosure for CoGroupClosure {
    fn width(&self) -> usize {
        self.slots.len()
    }

    fn iterator_for(&self, position: usize) -> Result<TupleIter<'_>> {
        match self.slot(position)? {
            Slot::Buffer(handle) => Ok(Box::new(
                self.buffers[handle].iter().map(|r| r.map_err(StageError::from)),
            )),
            Slot::PassThrough => {
                let mut state = self.pass_through.borrow_mut();
                match std::mem::replace(&mut *state, PassThrough::Consumed) {
                    PassThrough::Empty => {
                        *state = PassThrough::Empty;
                        Ok(Box::new(std::iter::empty()))
                    }
                    PassThrough::Consumed => Err(StageError::Protocol(format!(
                        "position 0 of '{}' can only be iterated once per key",
                        self.name
                    ))),
                    PassThrough::Pending { head, rest } => Ok(Box::new(PassThroughIter {
                        head: Some(head),
                        rest,
                        failed: false,
                    })),
                }
            }
        }
    }

    fn is_empty(&self, position: usize) -> Result<bool> {
        match self.slot(position)? {
            Slot::Buffer(handle) => Ok(self.buffers[handle].is_empty()),
            Slot::PassThrough => Ok(matches!(*self.pass_through.borrow(), PassThrough::Empty)),
        }
    }

    fn group_tuple(&self, key: &Tuple) -> Result<Tuple> {
        let mut out = Tuple::default();
        for position in 0..self.width() {
            if self.is_empty(position)? {
                out.extend_from(&Tuple::nulls(self.key_arity[position]));
            } else {
                out.extend_from(key);
            }
        }
        Ok(out)
    }
}

struct PassThroughIter {
    head: Option<Tuple>,
    rest: GroupInput,
    failed: bool,
}

impl Iterator for PassThroughIter {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(head) = self.head.take() {
            return Some(Ok(head));
        }
        if self.failed {
            return None;
        }
        match self.rest.next() {
            Some(tagged) if tagged.index == 0 => Some(Ok(tagged.tuple)),
            Some(tagged) => {
                self.failed = true;
                Some(Err(StageError::Protocol(format!(
                    "input {} tuple arrived after input 0 tuples of the same key",
                    tagged.index
                ))))
            }
            None => None,
        }
    }
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn buffer_listener(label: String, counters: Arc<SpillCounters>) -> SpillListener {
    spill_listener(move |event| {
        counters.record(event);
        #[cfg(feature = "tracing")]
        log_spill(&label, event);
    })
}

/// `spill_count` is 1-based; spills 1, 11, 21, ... are reported at info.
#[cfg(feature = "tracing")]
fn logged_at_info(spill_count: usize) -> bool {
    spill_count % 10 == 1
}

/// Every spill is logged at debug; the first of every ten at info.
#[cfg(feature = "tracing")]
fn log_spill(label: &str, event: &flowstack_mem::SpillEvent<'_>) {
    if let flowstack_mem::SpillEvent::WriteBegin {
        spill_count,
        size,
        reason,
        grouping,
    } = *event
    {
        if logged_at_info(spill_count) {
            tracing::info!(
                buffer = %label,
                spill_count,
                size,
                reason,
                grouping = %grouping.map(|g| g.to_string()).unwrap_or_default(),
                "spilling group"
            );
        }
        tracing::debug!(
            buffer = %label,
            "spilling {size} tuples in list to file number {spill_count}"
        );
    }
}
