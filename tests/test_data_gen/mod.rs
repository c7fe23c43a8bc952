//! Shared fixtures for the integration tests: operations, sinks, joiners and
//! storage helpers. Not every test binary uses every fixture.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use flowstack_core::config::TaskConfig;
use flowstack_core::types::{TaggedTuple, Tuple, Value};
use flowstack_exec::TaskContext;
use flowstack_io::{FsStorage, MemoryStorage};
use flowstack_mem::{Codec, SpillManager, SpillableListFactory};
use flowstack_operators::join::TupleIter;
use flowstack_operators::traits::OpResult;
use flowstack_operators::{
    Aggregator, Function, Joiner, JoinerClosure, OpError, Sink, SinkWriter, Source,
};

pub fn create_temp_spill_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("temp dir")
}

pub fn fs_manager(dir: &tempfile::TempDir, codec: Codec) -> Arc<SpillManager> {
    let root = dir.path().join("spill").to_string_lossy().to_string();
    Arc::new(SpillManager::new(Box::new(FsStorage::new()), codec, root))
}

/// A manager over memory storage plus a handle to inspect that storage.
pub fn memory_manager() -> (Arc<SpillManager>, MemoryStorage) {
    let storage = MemoryStorage::new();
    let manager = SpillManager::new(Box::new(storage.clone()), Codec::None, "memory://tests");
    (Arc::new(manager), storage)
}

pub fn memory_factory(threshold: usize) -> SpillableListFactory {
    let (manager, _) = memory_manager();
    SpillableListFactory::new(manager, threshold, None)
}

/// Task context on memory storage spilling every `threshold` tuples.
pub fn memory_context(threshold: usize) -> (TaskContext, MemoryStorage) {
    let storage = MemoryStorage::new();
    let config = TaskConfig {
        spill_threshold_tuples: threshold,
        spill_uri: Some("memory://tasks".into()),
        ..TaskConfig::default()
    };
    let ctx = TaskContext::with_storage(config, Box::new(storage.clone())).expect("context");
    (ctx, storage)
}

pub fn numbered(prefix: &str, n: usize) -> Vec<Tuple> {
    (0..n)
        .map(|i| Tuple::new(vec![Value::from(prefix), Value::I64(i as i64)]))
        .collect()
}

pub fn tagged_all(index: usize, tuples: &[Tuple]) -> Vec<TaggedTuple> {
    tuples
        .iter()
        .cloned()
        .map(|t| TaggedTuple::new(index, t))
        .collect()
}

#[derive(Default)]
pub struct SinkLog {
    pub written: Vec<Tuple>,
    pub diverted: Vec<(Tuple, String, String)>,
    pub opens: usize,
    pub closes: usize,
}

/// Every writer of this sink appends to one shared log.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub log: Arc<Mutex<SinkLog>>,
}

impl MemorySink {
    pub fn written(&self) -> Vec<Tuple> {
        self.log.lock().unwrap().written.clone()
    }

    pub fn diverted(&self) -> Vec<(Tuple, String, String)> {
        self.log.lock().unwrap().diverted.clone()
    }

    pub fn opens_and_closes(&self) -> (usize, usize) {
        let log = self.log.lock().unwrap();
        (log.opens, log.closes)
    }
}

struct MemorySinkWriter {
    log: Arc<Mutex<SinkLog>>,
}

impl Sink for MemorySink {
    fn open(&self) -> OpResult<Box<dyn SinkWriter>> {
        self.log.lock().unwrap().opens += 1;
        Ok(Box::new(MemorySinkWriter {
            log: Arc::clone(&self.log),
        }))
    }
}

impl SinkWriter for MemorySinkWriter {
    fn write(&mut self, tuple: &Tuple) -> OpResult<()> {
        self.log.lock().unwrap().written.push(tuple.clone());
        Ok(())
    }

    fn divert(&mut self, record: &Tuple, stage: &str, cause: &OpError) -> OpResult<()> {
        self.log
            .lock()
            .unwrap()
            .diverted
            .push((record.clone(), stage.to_string(), cause.to_string()));
        Ok(())
    }

    fn close(&mut self) -> OpResult<()> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Comma-separated text lines into tuples of strings; blank lines skipped.
pub struct CsvLines;

impl Source for CsvLines {
    fn source(&self, _key: &Value, value: &Value) -> OpResult<Option<Tuple>> {
        let line = value
            .as_str()
            .ok_or_else(|| OpError::failed("expected a text line"))?;
        if line.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(line.split(',').map(|f| Value::from(f.trim())).collect()))
    }
}

/// Parses the second field as an integer, replacing it.
pub struct ParseCount;

impl Function for ParseCount {
    fn operate(&self, arguments: &Tuple, out: &mut Vec<Tuple>) -> OpResult<()> {
        let word = arguments
            .get(0)
            .cloned()
            .ok_or_else(|| OpError::failed("missing word"))?;
        let count = arguments
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| OpError::failed("missing count"))?
            .parse::<i64>()
            .map_err(|e| OpError::failed(format!("bad count: {e}")))?;
        out.push(Tuple::new(vec![word, Value::I64(count)]));
        Ok(())
    }
}

pub struct SumI64;

impl Aggregator for SumI64 {
    fn start(&self, _key: &Tuple) -> OpResult<Tuple> {
        Ok(Tuple::new(vec![Value::I64(0)]))
    }

    fn aggregate(&self, context: &mut Tuple, arguments: &Tuple) -> OpResult<()> {
        let acc = context.get(0).and_then(Value::as_i64).unwrap_or(0);
        let n = arguments
            .get(0)
            .and_then(Value::as_i64)
            .ok_or_else(|| OpError::failed("not an integer"))?;
        *context = Tuple::new(vec![Value::I64(acc + n)]);
        Ok(())
    }

    fn complete(&self, context: Tuple, out: &mut Vec<Tuple>) -> OpResult<()> {
        out.push(context);
        Ok(())
    }
}

pub struct CountValues;

impl Aggregator for CountValues {
    fn start(&self, _key: &Tuple) -> OpResult<Tuple> {
        Ok(Tuple::new(vec![Value::I64(0)]))
    }

    fn aggregate(&self, context: &mut Tuple, _arguments: &Tuple) -> OpResult<()> {
        let acc = context.get(0).and_then(Value::as_i64).unwrap_or(0);
        *context = Tuple::new(vec![Value::I64(acc + 1)]);
        Ok(())
    }

    fn complete(&self, context: Tuple, out: &mut Vec<Tuple>) -> OpResult<()> {
        out.push(context);
        Ok(())
    }
}

/// Cartesian product across every position; empty when any position is.
pub struct InnerJoin;

impl Joiner for InnerJoin {
    fn join<'a>(
        &self,
        closure: &'a dyn JoinerClosure,
    ) -> flowstack_operators::Result<TupleIter<'a>> {
        let mut product = vec![Tuple::default()];
        for pos in 0..closure.width() {
            let rows = closure.iter_rows(pos)?;
            let mut next = Vec::with_capacity(product.len() * rows.len());
            for left in &product {
                for right in &rows {
                    next.push(Tuple::concat([left, right]));
                }
            }
            product = next;
        }
        Ok(Box::new(
            product.into_iter().map(Ok::<Tuple, flowstack_operators::StageError>),
        ))
    }
}

/// Keeps every left row; right positions missing for a key become nulls.
pub struct LeftJoin {
    pub right_arity: usize,
}

impl Joiner for LeftJoin {
    fn join<'a>(
        &self,
        closure: &'a dyn JoinerClosure,
    ) -> flowstack_operators::Result<TupleIter<'a>> {
        let right = if closure.is_empty(1)? {
            vec![Tuple::nulls(self.right_arity)]
        } else {
            closure.iter_rows(1)?
        };
        let left = closure.iterator_for(0)?;
        Ok(Box::new(left.flat_map(
            move |l| -> Vec<flowstack_operators::Result<Tuple>> {
                match l {
                    Ok(l) => right.iter().map(|r| Ok(Tuple::concat([&l, r]))).collect(),
                    Err(e) => vec![Err(e)],
                }
            },
        )))
    }
}

/// Materialize one position of a closure.
pub trait ClosureRows {
    fn iter_rows(&self, pos: usize) -> flowstack_operators::Result<Vec<Tuple>>;
}

impl<T: JoinerClosure + ?Sized> ClosureRows for T {
    fn iter_rows(&self, pos: usize) -> flowstack_operators::Result<Vec<Tuple>> {
        self.iterator_for(pos)?.collect()
    }
}
