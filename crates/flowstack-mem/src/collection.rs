//! Tuple collections handed out to per-key buffering consumers.

use std::sync::Arc;

use flowstack_core::config::TaskConfig;
use flowstack_core::types::Tuple;

use crate::error::Result;
use crate::list::SpillableList;
use crate::spill::SpillManager;
use crate::tracking::SpillListener;

/// Ordered, restartable tuple storage used by the co-group closure.
pub trait TupleCollection: Send {
    fn add(&mut self, tuple: Tuple) -> Result<()>;

    /// Empty for reuse with the next key.
    fn clear(&mut self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replay in append order; every call starts from the beginning.
    fn iter(&self) -> Box<dyn Iterator<Item = Result<Tuple>> + '_>;

    /// Label carried into spill events for diagnostics.
    fn set_grouping(&mut self, grouping: Option<Tuple>);

    fn grouping(&self) -> Option<&Tuple>;

    fn spill_count(&self) -> usize;
}

impl TupleCollection for SpillableList {
    fn add(&mut self, tuple: Tuple) -> Result<()> {
        SpillableList::add(self, tuple)
    }

    fn clear(&mut self) -> Result<()> {
        SpillableList::clear(self)
    }

    fn len(&self) -> usize {
        SpillableList::len(self)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Result<Tuple>> + '_> {
        Box::new(SpillableList::iter(self))
    }

    fn set_grouping(&mut self, grouping: Option<Tuple>) {
        SpillableList::set_grouping(self, grouping)
    }

    fn grouping(&self) -> Option<&Tuple> {
        SpillableList::grouping(self)
    }

    fn spill_count(&self) -> usize {
        SpillableList::spill_count(self)
    }
}

/// Creates collections; injected into the closure so tests can swap storage.
pub trait TupleCollectionFactory: Send + Sync {
    fn create(&self, listener: Option<SpillListener>) -> Box<dyn TupleCollection>;
}

pub struct SpillableListFactory {
    manager: Arc<SpillManager>,
    threshold_tuples: usize,
    threshold_bytes: Option<usize>,
}

impl SpillableListFactory {
    pub fn new(
        manager: Arc<SpillManager>,
        threshold_tuples: usize,
        threshold_bytes: Option<usize>,
    ) -> Self {
        Self {
            manager,
            threshold_tuples,
            threshold_bytes,
        }
    }

    pub fn from_config(manager: Arc<SpillManager>, config: &TaskConfig) -> Self {
        Self::new(
            manager,
            config.spill_threshold_tuples,
            config.spill_threshold_bytes,
        )
    }

    pub fn manager(&self) -> &Arc<SpillManager> {
        &self.manager
    }
}

impl TupleCollectionFactory for SpillableListFactory {
    fn create(&self, listener: Option<SpillListener>) -> Box<dyn TupleCollection> {
        let list = SpillableList::new(
            Arc::clone(&self.manager),
            self.threshold_tuples,
            self.threshold_bytes,
        );
        match listener {
            Some(l) => Box::new(list.with_listener(l)),
            None => Box::new(list),
        }
    }
}
