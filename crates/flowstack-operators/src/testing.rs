//! Fixtures shared by the unit tests of this crate.

use std::sync::{Arc, Mutex};

use flowstack_core::types::{TaggedTuple, Tuple, Value};
use flowstack_io::MemoryStorage;
use flowstack_mem::{Codec, SpillManager, SpillableListFactory, TupleCollectionFactory};

use crate::error::{OpError, Result};
use crate::join::{Joiner, JoinerClosure, TupleIter};
use crate::traits::{
    Aggregator, Buffer, Filter, Function, OpResult, ShuffleWriter, Sink, SinkWriter, Source,
};

pub fn memory_factory(threshold: usize) -> Arc<dyn TupleCollectionFactory> {
    let manager = Arc::new(SpillManager::new(
        Box::new(MemoryStorage::new()),
        Codec::None,
        "memory://unit",
    ));
    Arc::new(SpillableListFactory::new(manager, threshold, None))
}

pub fn tagged(index: usize, tuple: Tuple) -> TaggedTuple {
    TaggedTuple::new(index, tuple)
}

#[derive(Default)]
pub struct SinkLog {
    pub written: Vec<Tuple>,
    pub diverted: Vec<(Tuple, String)>,
    pub opens: usize,
    pub closes: usize,
}

/// Sink whose writers all append to one shared log.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub log: Arc<Mutex<SinkLog>>,
}

impl RecordingSink {
    pub fn written(&self) -> Vec<Tuple> {
        self.log.lock().unwrap().written.clone()
    }

    pub fn diverted(&self) -> Vec<Tuple> {
        self.log.lock().unwrap().diverted.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn opens_and_closes(&self) -> (usize, usize) {
        let log = self.log.lock().unwrap();
        (log.opens, log.closes)
    }
}

struct RecordingWriter {
    log: Arc<Mutex<SinkLog>>,
}

impl Sink for RecordingSink {
    fn open(&self) -> OpResult<Box<dyn SinkWriter>> {
        self.log.lock().unwrap().opens += 1;
        Ok(Box::new(RecordingWriter {
            log: Arc::clone(&self.log),
        }))
    }
}

impl SinkWriter for RecordingWriter {
    fn write(&mut self, tuple: &Tuple) -> OpResult<()> {
        self.log.lock().unwrap().written.push(tuple.clone());
        Ok(())
    }

    fn divert(&mut self, record: &Tuple, stage: &str, _cause: &OpError) -> OpResult<()> {
        self.log
            .lock()
            .unwrap()
            .diverted
            .push((record.clone(), stage.to_string()));
        Ok(())
    }

    fn close(&mut self) -> OpResult<()> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct CollectingShuffle {
    pub emitted: Mutex<Vec<(Tuple, TaggedTuple)>>,
}

impl ShuffleWriter for CollectingShuffle {
    fn emit(&self, key: Tuple, value: TaggedTuple) -> OpResult<()> {
        self.emitted.lock().unwrap().push((key, value));
        Ok(())
    }
}

/// Splits a line on commas; blank lines are skipped, "bad" fails.
pub struct CsvSource;

impl Source for CsvSource {
    fn source(&self, _key: &Value, value: &Value) -> OpResult<Option<Tuple>> {
        match value.as_str() {
            Some("") => Ok(None),
            Some("bad") => Err(OpError::failed("unparseable line")),
            Some(line) => Ok(Some(line.split(',').map(Value::from).collect())),
            None => Err(OpError::failed("expected a text line")),
        }
    }
}

/// Upper-cases the first argument; fails on the literal "boom".
pub struct Upper;

impl Function for Upper {
    fn operate(&self, arguments: &Tuple, out: &mut Vec<Tuple>) -> OpResult<()> {
        match arguments.get(0).and_then(Value::as_str) {
            Some("boom") => Err(OpError::failed("boom")),
            Some(s) => {
                out.push(Tuple::new(vec![Value::from(s.to_uppercase())]));
                Ok(())
            }
            None => Err(OpError::failed("expected a string")),
        }
    }
}

/// Drops tuples whose first value equals the configured one.
pub struct DropValue(pub Value);

impl Filter for DropValue {
    fn is_remove(&self, arguments: &Tuple) -> OpResult<bool> {
        Ok(arguments.get(0) == Some(&self.0))
    }
}

pub struct Count;

impl Aggregator for Count {
    fn start(&self, _key: &Tuple) -> OpResult<Tuple> {
        Ok(Tuple::new(vec![Value::I64(0)]))
    }

    fn aggregate(&self, context: &mut Tuple, _arguments: &Tuple) -> OpResult<()> {
        let n = context.get(0).and_then(Value::as_i64).unwrap_or(0);
        *context = Tuple::new(vec![Value::I64(n + 1)]);
        Ok(())
    }

    fn complete(&self, context: Tuple, out: &mut Vec<Tuple>) -> OpResult<()> {
        out.push(context);
        Ok(())
    }
}

/// Concatenates the first argument of every value, in order.
pub struct Concat;

impl Aggregator for Concat {
    fn start(&self, _key: &Tuple) -> OpResult<Tuple> {
        Ok(Tuple::new(vec![Value::from("")]))
    }

    fn aggregate(&self, context: &mut Tuple, arguments: &Tuple) -> OpResult<()> {
        let acc = context.get(0).and_then(Value::as_str).unwrap_or("").to_string();
        let next = match arguments.get(0) {
            Some(Value::Str(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        *context = Tuple::new(vec![Value::from(acc + &next)]);
        Ok(())
    }

    fn complete(&self, context: Tuple, out: &mut Vec<Tuple>) -> OpResult<()> {
        out.push(context);
        Ok(())
    }
}

/// Emits every value unchanged, followed by a marker tuple.
pub struct EchoWithMarker(pub &'static str);

impl Buffer for EchoWithMarker {
    fn operate(
        &self,
        _key: &Tuple,
        values: &mut dyn Iterator<Item = Tuple>,
        out: &mut Vec<Tuple>,
    ) -> OpResult<()> {
        out.extend(values);
        out.push(Tuple::new(vec![Value::from(self.0)]));
        Ok(())
    }
}

/// Materializes every position and emits the cartesian product, dropping
/// keys where any position is empty.
pub struct InnerJoin;

impl Joiner for InnerJoin {
    fn join<'a>(&self, closure: &'a dyn JoinerClosure) -> Result<TupleIter<'a>> {
        let mut product: Vec<Tuple> = vec![Tuple::default()];
        for pos in 0..closure.width() {
            let rows = closure.iterator_for(pos)?.collect::<Result<Vec<_>>>()?;
            let mut next = Vec::with_capacity(product.len() * rows.len());
            for left in &product {
                for right in &rows {
                    next.push(Tuple::concat([left, right]));
                }
            }
            product = next;
        }
        Ok(Box::new(product.into_iter().map(Ok::<Tuple, crate::error::StageError>)))
    }
}
