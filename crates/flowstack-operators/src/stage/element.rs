//! Runtime stages and record dispatch.
//!
//! A chain is a `Vec<Stage>`; a stage hands its outputs to the rest of the
//! slice with `split_first_mut`, so every stage only ever sees what follows
//! it. An operation's outputs are collected before being forwarded, which
//! keeps a trap from ever catching a downstream failure and drops partial
//! outputs when the operation fails.

use std::borrow::Cow;
use std::sync::Arc;

use flowstack_core::types::{TaggedTuple, Tuple};

use crate::error::{OpError, Result, StageError};
use crate::join::{CoGroupClosure, Joiner, JoinerClosure};
use crate::step::{OutputMode, TransformOp};
use crate::traits::{Aggregator, Buffer, OpResult, ShuffleWriter, Sink, SinkWriter};

pub(crate) type Values<'a> = dyn Iterator<Item = Result<Tuple>> + 'a;

/// Diversion target of one operation.
pub(crate) struct Trap {
    sink: Arc<dyn Sink>,
    writer: Option<Box<dyn SinkWriter>>,
    diverted: u64,
}

impl Trap {
    pub(crate) fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            writer: None,
            diverted: 0,
        }
    }

    fn open(&mut self, stage: &str) -> Result<()> {
        if self.writer.is_none() {
            let writer = self.sink.open().map_err(|source| trap_error(stage, source))?;
            self.writer = Some(writer);
        }
        Ok(())
    }

    fn divert(&mut self, record: &Tuple, stage: &str, cause: &OpError) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            StageError::Protocol(format!("trap of '{stage}' used before the chain was opened"))
        })?;
        writer
            .divert(record, stage, cause)
            .map_err(|source| trap_error(stage, source))?;
        self.diverted += 1;
        Ok(())
    }

    fn close(&mut self, stage: &str) -> Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.close().map_err(|source| trap_error(stage, source)),
            None => Ok(()),
        }
    }
}

fn trap_error(stage: &str, source: OpError) -> StageError {
    StageError::Sink {
        stage: format!("trap of {stage}"),
        source,
    }
}

/// Pass an operation result through, diverting its failure when trapped.
/// `Ok(None)` means the record was diverted.
fn guard<T>(
    stage: &str,
    trap: &mut Option<Trap>,
    record: &Tuple,
    result: OpResult<T>,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(cause) => match trap {
            Some(trap) => {
                trap.divert(record, stage, &cause)?;
                Ok(None)
            }
            None => Err(StageError::Operation {
                stage: stage.to_string(),
                source: cause,
            }),
        },
    }
}

fn arguments_of<'t>(tuple: &'t Tuple, positions: &Option<Vec<usize>>) -> OpResult<Cow<'t, Tuple>> {
    match positions {
        None => Ok(Cow::Borrowed(tuple)),
        Some(p) => Ok(Cow::Owned(tuple.select(p)?)),
    }
}

pub(crate) struct EachStage {
    pub(crate) op: TransformOp,
    pub(crate) arguments: Option<Vec<usize>>,
    pub(crate) output: OutputMode,
}

impl EachStage {
    fn run(&self, tuple: &Tuple) -> OpResult<Vec<Tuple>> {
        let args = arguments_of(tuple, &self.arguments)?;
        match &self.op {
            TransformOp::Function(f) => {
                let mut results = Vec::new();
                f.operate(&args, &mut results)?;
                Ok(match self.output {
                    OutputMode::Results => results,
                    OutputMode::All => results
                        .iter()
                        .map(|r| Tuple::concat([tuple, r]))
                        .collect(),
                })
            }
            TransformOp::Filter(f) => {
                if f.is_remove(&args)? {
                    Ok(Vec::new())
                } else {
                    Ok(vec![tuple.clone()])
                }
            }
        }
    }
}

pub(crate) struct AggregateSlot {
    pub(crate) name: String,
    pub(crate) aggregator: Arc<dyn Aggregator>,
    pub(crate) arguments: Option<Vec<usize>>,
    pub(crate) trap: Option<Trap>,
}

impl AggregateSlot {
    fn aggregate(&self, context: &mut Tuple, value: &Tuple) -> OpResult<()> {
        let args = arguments_of(value, &self.arguments)?;
        self.aggregator.aggregate(context, &args)
    }

    fn finish(&self, context: Tuple) -> OpResult<Vec<Tuple>> {
        let mut out = Vec::new();
        self.aggregator.complete(context, &mut out)?;
        Ok(out)
    }
}

pub(crate) struct BufferStage {
    pub(crate) buffer: Arc<dyn Buffer>,
    pub(crate) arguments: Option<Vec<usize>>,
}

pub(crate) struct GroupEmitStage {
    pub(crate) key_positions: Vec<usize>,
    pub(crate) position: usize,
    pub(crate) shuffle: Arc<dyn ShuffleWriter>,
}

pub(crate) struct GroupJoinStage {
    pub(crate) closure: CoGroupClosure,
    pub(crate) joiner: Option<Arc<dyn Joiner>>,
}

pub(crate) struct SinkStage {
    pub(crate) sink: Arc<dyn Sink>,
    pub(crate) writer: Option<Box<dyn SinkWriter>>,
}

pub(crate) enum StageKind {
    Each(EachStage),
    Aggregate(Vec<AggregateSlot>),
    Buffer(BufferStage),
    GroupEmit(GroupEmitStage),
    GroupJoin(GroupJoinStage),
    Sink(SinkStage),
}

pub struct Stage {
    pub(crate) name: String,
    pub(crate) kind: StageKind,
    pub(crate) trap: Option<Trap>,
}

impl Stage {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records this stage diverted to its traps.
    pub fn diverted(&self) -> u64 {
        let own = self.trap.as_ref().map_or(0, |t| t.diverted);
        let slots = match &self.kind {
            StageKind::Aggregate(slots) => slots
                .iter()
                .filter_map(|s| s.trap.as_ref())
                .map(|t| t.diverted)
                .sum(),
            _ => 0,
        };
        own + slots
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        let Stage { name, kind, trap } = self;
        if let Some(trap) = trap {
            trap.open(name)?;
        }
        match kind {
            StageKind::Aggregate(slots) => {
                for slot in slots.iter_mut() {
                    if let Some(trap) = slot.trap.as_mut() {
                        trap.open(&slot.name)?;
                    }
                }
            }
            StageKind::Sink(sink) if sink.writer.is_none() => {
                let writer = sink.sink.open().map_err(|source| StageError::Sink {
                    stage: name.clone(),
                    source,
                })?;
                sink.writer = Some(writer);
            }
            _ => {}
        }
        Ok(())
    }

    /// Close every writer this stage opened. Keeps going after a failure and
    /// reports the first one.
    pub(crate) fn close(&mut self) -> Result<()> {
        let Stage { name, kind, trap } = self;
        let mut first_err = None;

        if let StageKind::Sink(sink) = kind {
            if let Some(mut writer) = sink.writer.take() {
                if let Err(source) = writer.close() {
                    first_err.get_or_insert(StageError::Sink {
                        stage: name.clone(),
                        source,
                    });
                }
            }
        }
        if let StageKind::Aggregate(slots) = kind {
            for slot in slots.iter_mut() {
                if let Some(trap) = slot.trap.as_mut() {
                    if let Err(e) = trap.close(&slot.name) {
                        first_err.get_or_insert(e);
                    }
                }
            }
        }
        if let Some(trap) = trap {
            if let Err(e) = trap.close(name) {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn accept(&mut self, tuple: Tuple, rest: &mut [Stage]) -> Result<()> {
        let Stage { name, kind, trap } = self;
        match kind {
            StageKind::Each(each) => {
                let result = each.run(&tuple);
                let Some(outputs) = guard(name, trap, &tuple, result)? else {
                    return Ok(());
                };
                for out in outputs {
                    push_record(rest, out)?;
                }
                Ok(())
            }
            StageKind::GroupEmit(emit) => {
                let result = tuple.select(&emit.key_positions).map_err(OpError::from);
                let Some(key) = guard(name, trap, &tuple, result)? else {
                    return Ok(());
                };
                emit.shuffle
                    .emit(key, TaggedTuple::new(emit.position, tuple))
                    .map_err(|source| StageError::Shuffle {
                        stage: name.clone(),
                        source,
                    })
            }
            StageKind::Sink(sink) => {
                let writer = sink.writer.as_mut().ok_or_else(|| {
                    StageError::Protocol(format!("sink '{name}' written before it was opened"))
                })?;
                writer.write(&tuple).map_err(|source| StageError::Sink {
                    stage: name.clone(),
                    source,
                })
            }
            StageKind::Aggregate(_) | StageKind::Buffer(_) | StageKind::GroupJoin(_) => Err(
                StageError::Protocol(format!("stage '{name}' only accepts grouped input")),
            ),
        }
    }

    fn accept_group(&mut self, key: &Tuple, values: &mut Values<'_>, rest: &mut [Stage]) -> Result<()> {
        if matches!(
            self.kind,
            StageKind::Each(_) | StageKind::GroupEmit(_) | StageKind::Sink(_)
        ) {
            for value in values {
                self.accept(value?, rest)?;
            }
            return Ok(());
        }

        let Stage { name, kind, trap } = self;
        match kind {
            StageKind::Aggregate(slots) => aggregate_group(slots, key, values, rest),
            StageKind::Buffer(buffer) => {
                let mut stream = ValueStream {
                    values,
                    arguments: buffer.arguments.as_deref(),
                    stage: name.as_str(),
                    error: None,
                };
                let mut out = Vec::new();
                let result = buffer.buffer.operate(key, &mut stream, &mut out);
                if let Some(e) = stream.error.take() {
                    return Err(e);
                }
                if guard(name, trap, key, result)?.is_none() {
                    return Ok(());
                }

                if matches!(rest.first().map(|s| &s.kind), Some(StageKind::Buffer(_))) {
                    push_group(rest, key, &mut out.into_iter().map(Ok::<Tuple, StageError>))
                } else {
                    for tuple in out {
                        push_record(rest, tuple)?;
                    }
                    Ok(())
                }
            }
            StageKind::GroupJoin(_) => Err(StageError::Protocol(format!(
                "group stage '{name}' must head its chain"
            ))),
            StageKind::Each(_) | StageKind::GroupEmit(_) | StageKind::Sink(_) => Ok(()),
        }
    }
}

/// One pass over the group feeding every aggregator, then
/// `key ++ r1 ++ ... ++ rk` for each combination of results.
fn aggregate_group(
    slots: &mut [AggregateSlot],
    key: &Tuple,
    values: &mut Values<'_>,
    rest: &mut [Stage],
) -> Result<()> {
    let mut contexts = Vec::with_capacity(slots.len());
    for slot in slots.iter_mut() {
        let started = slot.aggregator.start(key);
        contexts.push(guard(&slot.name, &mut slot.trap, key, started)?);
    }

    for value in values {
        let value = value?;
        for (slot, context) in slots.iter_mut().zip(contexts.iter_mut()) {
            if let Some(context) = context {
                let result = slot.aggregate(context, &value);
                guard(&slot.name, &mut slot.trap, &value, result)?;
            }
        }
    }

    let mut outputs = vec![key.clone()];
    for (slot, context) in slots.iter_mut().zip(contexts) {
        let results = match context {
            Some(context) => {
                let finished = slot.finish(context);
                guard(&slot.name, &mut slot.trap, key, finished)?.unwrap_or_default()
            }
            None => Vec::new(),
        };
        let mut next = Vec::with_capacity(outputs.len() * results.len());
        for left in &outputs {
            for right in &results {
                next.push(Tuple::concat([left, right]));
            }
        }
        outputs = next;
    }

    for out in outputs {
        push_record(rest, out)?;
    }
    Ok(())
}

/// Grouped values as plain tuples for a buffer; the first failure ends the
/// stream and is kept for the stage to report.
struct ValueStream<'a, 'v> {
    values: &'a mut Values<'v>,
    arguments: Option<&'a [usize]>,
    stage: &'a str,
    error: Option<StageError>,
}

impl Iterator for ValueStream<'_, '_> {
    type Item = Tuple;

    fn next(&mut self) -> Option<Tuple> {
        if self.error.is_some() {
            return None;
        }
        match self.values.next()? {
            Ok(tuple) => match self.arguments {
                None => Some(tuple),
                Some(positions) => match tuple.select(positions) {
                    Ok(args) => Some(args),
                    Err(e) => {
                        self.error = Some(StageError::Operation {
                            stage: self.stage.to_string(),
                            source: e.into(),
                        });
                        None
                    }
                },
            },
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }
}

pub(crate) fn push_record(stages: &mut [Stage], tuple: Tuple) -> Result<()> {
    match stages.split_first_mut() {
        Some((head, rest)) => head.accept(tuple, rest),
        None => Err(StageError::Protocol(
            "record forwarded past the end of the chain".into(),
        )),
    }
}

pub(crate) fn push_group(stages: &mut [Stage], key: &Tuple, values: &mut Values<'_>) -> Result<()> {
    match stages.split_first_mut() {
        Some((head, rest)) => head.accept_group(key, values, rest),
        None => Err(StageError::Protocol(
            "group forwarded past the end of the chain".into(),
        )),
    }
}

/// Entry point of a reducer chain: load the key into the closure, then hand
/// the joined (or single-input) tuples to the rest of the chain.
pub(crate) fn push_joined(
    stages: &mut [Stage],
    key: &Tuple,
    values: crate::join::GroupInput,
) -> Result<()> {
    let Some((head, rest)) = stages.split_first_mut() else {
        return Err(StageError::Protocol("group pushed into an empty chain".into()));
    };
    let Stage { name, kind, trap } = head;
    let StageKind::GroupJoin(join) = kind else {
        return Err(StageError::Protocol(format!(
            "stage '{name}' cannot start a grouped chain"
        )));
    };

    join.closure.reset(key, values)?;
    let group_key = join.closure.group_tuple(key)?;
    let joined = match &join.joiner {
        Some(joiner) => joiner.join(&join.closure),
        None => join.closure.iterator_for(0),
    };
    let mut joined = match joined {
        Ok(joined) => joined,
        // A joiner's own failure diverts the whole key.
        Err(StageError::Operation { source, .. }) if trap.is_some() => {
            if let Some(trap) = trap.as_mut() {
                trap.divert(key, name, &source)?;
            }
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    push_group(rest, &group_key, joined.as_mut())
}
