//! Mapper-side task runner.
//!
//! One source node fans out into one chain per outgoing scope. Every raw
//! record is sourced once and the resulting tuple is pushed into each chain
//! in scope order.

use std::sync::Arc;

use flowstack_core::id::{NodeId, TaskId};
use flowstack_core::types::{Tuple, Value};
use flowstack_io::{MultiSplitReader, RecordReader, SplitSource};
use flowstack_operators::{
    plan_mapper_chains, NodeKind, ShuffleWriter, SinkWriter, Source, StageChain, StageError,
    StepGraph,
};

use crate::context::TaskContext;
use crate::error::{ExecError, Result};
use crate::metrics::{TaskCounters, TaskCountersSnapshot};

pub struct MapperStack {
    task: TaskId,
    source_name: String,
    source: Arc<dyn Source>,
    source_trap: Option<Box<dyn SinkWriter>>,
    chains: Vec<StageChain>,
    counters: Arc<TaskCounters>,
    closed: bool,
}

impl MapperStack {
    /// Plan, build and open every chain below `source`. `shuffle` receives the
    /// output of chains that end at a group boundary.
    pub fn build(
        ctx: &TaskContext,
        graph: &StepGraph,
        source: NodeId,
        shuffle: Option<Arc<dyn ShuffleWriter>>,
    ) -> Result<Self> {
        let node = graph.node(source)?;
        let NodeKind::Source { source: op } = &node.kind else {
            return Err(ExecError::Invalid(format!(
                "mapper must start at a source, '{}' is a {}",
                node.name,
                node.kind.label()
            )));
        };

        let resources = ctx.chain_resources(shuffle);
        let mut chains = plan_mapper_chains(graph, source)?
            .iter()
            .map(|plans| StageChain::build(graph, plans, &resources))
            .collect::<std::result::Result<Vec<_>, StageError>>()?;

        // All chains are open before the first record arrives. A chain that
        // fails to open, and every chain before it, is closed on drop.
        for chain in chains.iter_mut() {
            chain.open()?;
        }

        // Opened last so no later failure in `build` can leak it.
        let source_trap = match graph.error_target(&node.name) {
            Some(sink) => Some(sink.open().map_err(|source| StageError::Sink {
                stage: format!("trap of {}", node.name),
                source,
            })?),
            None => None,
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            task = %ctx.id(),
            source = %node.name,
            chains = chains.len(),
            "mapper stack ready"
        );

        Ok(Self {
            task: ctx.id(),
            source_name: node.name.clone(),
            source: Arc::clone(op),
            source_trap,
            chains,
            counters: Arc::clone(ctx.counters()),
            closed: false,
        })
    }

    /// Source one raw record and push the tuple through every chain.
    pub fn map(&mut self, key: Value, value: Value) -> Result<()> {
        if self.closed {
            return Err(StageError::Protocol("record mapped after close".into()).into());
        }
        self.counters.record_read();

        let tuple = match self.source.source(&key, &value) {
            Ok(Some(tuple)) => tuple,
            Ok(None) => {
                self.counters.record_skipped();
                return Ok(());
            }
            Err(cause) => return self.divert_raw(key, value, cause),
        };

        if let Some((last, rest)) = self.chains.split_last_mut() {
            for chain in rest {
                chain.push_record(tuple.clone())?;
            }
            last.push_record(tuple)?;
        }
        Ok(())
    }

    fn divert_raw(
        &mut self,
        key: Value,
        value: Value,
        cause: flowstack_operators::OpError,
    ) -> Result<()> {
        let Some(trap) = self.source_trap.as_mut() else {
            return Err(ExecError::Source {
                stage: self.source_name.clone(),
                source: cause,
            });
        };
        let record = Tuple::new(vec![key, value]);
        trap.divert(&record, &self.source_name, &cause)
            .map_err(|source| StageError::Sink {
                stage: format!("trap of {}", self.source_name),
                source,
            })?;
        self.counters.record_source_diverted();
        Ok(())
    }

    /// Drain every split through [`map`](Self::map). The split reader is
    /// closed whether or not mapping succeeds; the stack stays open.
    pub fn run_splits<S: SplitSource>(&mut self, splits: &mut MultiSplitReader<S>) -> Result<u64> {
        let mut count = 0u64;
        let outcome = (|| -> Result<()> {
            while splits.has_next()? {
                let reader = splits.next()?;
                while let Some((key, value)) = reader.next_record()? {
                    self.map(key, value)?;
                    count += 1;
                }
            }
            Ok(())
        })();
        let closed = splits.close().map_err(ExecError::from);
        outcome.and(closed).map(|_| count)
    }

    /// Close every chain and the source trap. Every writer is closed even if
    /// an earlier one fails; the first failure is returned.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_err: Option<ExecError> = None;
        for chain in self.chains.iter_mut() {
            if let Err(e) = chain.close() {
                first_err.get_or_insert(e.into());
            }
        }
        if let Some(mut trap) = self.source_trap.take() {
            if let Err(source) = trap.close() {
                first_err.get_or_insert(
                    StageError::Sink {
                        stage: format!("trap of {}", self.source_name),
                        source,
                    }
                    .into(),
                );
            }
        }

        #[cfg(feature = "tracing")]
        {
            let snap = self.snapshot();
            tracing::info!(
                task = %self.task,
                records = snap.records_read,
                skipped = snap.records_skipped,
                diverted = snap.diverted + snap.source_diverted,
                failed = first_err.is_some(),
                "mapper stack closed"
            );
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn chains(&self) -> &[StageChain] {
        &self.chains
    }

    pub fn snapshot(&self) -> TaskCountersSnapshot {
        let mut snap = self.counters.snapshot();
        snap.chain_records = self.chains.iter().map(StageChain::records_in).collect();
        snap.diverted = self.chains.iter().map(StageChain::diverted).sum();
        snap
    }
}

impl Drop for MapperStack {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(_e) = self.close() {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "closing mapper stack on drop failed");
            }
        }
    }
}
