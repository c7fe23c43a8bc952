//! In-process shuffle for local runs and tests.
//!
//! Collects what mapper chains emit and hands it back the way the external
//! sort would: grouped by key in key order, and within a key the input with
//! the highest position first and input 0 last.

use std::sync::Mutex;

use flowstack_core::types::{TaggedTuple, Tuple};
use flowstack_operators::traits::OpResult;
use flowstack_operators::{OpError, ShuffleWriter};

use crate::error::{ExecError, Result};

/// One key and its tagged tuples in delivery order.
pub type Group = (Tuple, Vec<TaggedTuple>);

#[derive(Debug, Default)]
pub struct LocalShuffle {
    emitted: Mutex<Vec<(Tuple, TaggedTuple)>>,
}

impl LocalShuffle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.emitted.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take everything emitted so far as sorted groups.
    pub fn drain_groups(&self) -> Result<Vec<Group>> {
        let mut emitted = self
            .emitted
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .map_err(|_| ExecError::Invalid("shuffle lock poisoned".into()))?;

        // Stable: arrival order survives within one (key, position).
        emitted.sort_by(|(ka, va), (kb, vb)| ka.cmp(kb).then(vb.index.cmp(&va.index)));

        let mut groups: Vec<Group> = Vec::new();
        for (key, value) in emitted {
            match groups.last_mut() {
                Some((last, values)) if *last == key => values.push(value),
                _ => groups.push((key, vec![value])),
            }
        }
        Ok(groups)
    }
}

impl ShuffleWriter for LocalShuffle {
    fn emit(&self, key: Tuple, value: TaggedTuple) -> OpResult<()> {
        self.emitted
            .lock()
            .map_err(|_| OpError::failed("shuffle lock poisoned"))?
            .push((key, value));
        Ok(())
    }
}
