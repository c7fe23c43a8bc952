//! Reducer-side task runner: one chain, headed by the co-group stage, fed one
//! sorted key group at a time.

use std::sync::Arc;

use flowstack_core::id::{NodeId, TaskId};
use flowstack_core::types::{TaggedTuple, Tuple};
use flowstack_operators::join::GroupInput;
use flowstack_operators::{plan_reducer_chain, StageChain, StageError, StepGraph};

use crate::context::TaskContext;
use crate::error::Result;
use crate::metrics::{TaskCounters, TaskCountersSnapshot};

pub struct ReducerStack {
    task: TaskId,
    chain: StageChain,
    counters: Arc<TaskCounters>,
}

impl ReducerStack {
    pub fn build(ctx: &TaskContext, graph: &StepGraph, group: NodeId) -> Result<Self> {
        let plans = plan_reducer_chain(graph, group)?;
        let mut chain = StageChain::build(graph, &plans, &ctx.chain_resources(None))?;
        chain.open()?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            task = %ctx.id(),
            stages = ?chain.stage_names(),
            "reducer stack ready"
        );

        Ok(Self {
            task: ctx.id(),
            chain,
            counters: Arc::clone(ctx.counters()),
        })
    }

    /// Run one key. `values` must arrive in shuffle order, input 0 last.
    pub fn reduce(&mut self, key: &Tuple, values: GroupInput) -> Result<()> {
        if self.chain.is_closed() {
            return Err(StageError::Protocol("group reduced after close".into()).into());
        }
        self.counters.record_group();
        self.chain.push_group(key, values)?;
        Ok(())
    }

    /// Run a batch of already sorted groups.
    pub fn reduce_all<I>(&mut self, groups: I) -> Result<u64>
    where
        I: IntoIterator<Item = (Tuple, Vec<TaggedTuple>)>,
    {
        let mut count = 0;
        for (key, values) in groups {
            self.reduce(&key, Box::new(values.into_iter()))?;
            count += 1;
        }
        Ok(count)
    }

    pub fn close(&mut self) -> Result<()> {
        let result = self.chain.close();

        #[cfg(feature = "tracing")]
        {
            let snap = self.snapshot();
            tracing::info!(
                task = %self.task,
                groups = snap.groups_reduced,
                spills_written = snap.spill.spills_written,
                tuples_spilled = snap.spill.tuples_spilled,
                diverted = snap.diverted,
                "reducer stack closed"
            );
        }

        result.map_err(Into::into)
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn chain(&self) -> &StageChain {
        &self.chain
    }

    pub fn snapshot(&self) -> TaskCountersSnapshot {
        let mut snap = self.counters.snapshot();
        snap.chain_records = vec![self.chain.groups_in()];
        snap.diverted = self.chain.diverted();
        snap
    }
}
