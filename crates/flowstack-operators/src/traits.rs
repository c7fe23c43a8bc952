//! Operation traits implemented by user code and host adapters.
//!
//! Operations are shared across stages and chains through `Arc`, so they take
//! `&self`. Anything that accumulates per group is carried in an explicit
//! context tuple (see [`Aggregator`]).

use flowstack_core::types::{TaggedTuple, Tuple, Value};

use crate::error::OpError;

pub type OpResult<T> = std::result::Result<T, OpError>;

/// Turns one argument tuple into zero or more result tuples.
pub trait Function: Send + Sync {
    fn operate(&self, arguments: &Tuple, out: &mut Vec<Tuple>) -> OpResult<()>;
}

pub trait Filter: Send + Sync {
    /// True drops the record.
    fn is_remove(&self, arguments: &Tuple) -> OpResult<bool>;
}

/// Folds the values of one group without holding them.
///
/// The context returned by `start` is threaded through every `aggregate` call
/// of the group and handed to `complete`.
pub trait Aggregator: Send + Sync {
    fn start(&self, key: &Tuple) -> OpResult<Tuple>;

    fn aggregate(&self, context: &mut Tuple, arguments: &Tuple) -> OpResult<()>;

    fn complete(&self, context: Tuple, out: &mut Vec<Tuple>) -> OpResult<()>;
}

/// Sees every value of a group at once, in arrival order.
pub trait Buffer: Send + Sync {
    fn operate(
        &self,
        key: &Tuple,
        values: &mut dyn Iterator<Item = Tuple>,
        out: &mut Vec<Tuple>,
    ) -> OpResult<()>;
}

/// Turns a raw `(key, value)` record into a tuple; `None` skips the record.
pub trait Source: Send + Sync {
    fn source(&self, key: &Value, value: &Value) -> OpResult<Option<Tuple>>;
}

pub trait Sink: Send + Sync {
    /// One writer per chain that ends here (or diverts here).
    fn open(&self) -> OpResult<Box<dyn SinkWriter>>;
}

pub trait SinkWriter {
    fn write(&mut self, tuple: &Tuple) -> OpResult<()>;

    /// Receive a record that failed at `stage`. Writes the record by default.
    fn divert(&mut self, record: &Tuple, stage: &str, cause: &OpError) -> OpResult<()> {
        let _ = (stage, cause);
        self.write(record)
    }

    fn close(&mut self) -> OpResult<()>;
}

/// Mapper-side output toward the external shuffle/sort.
pub trait ShuffleWriter: Send + Sync {
    fn emit(&self, key: Tuple, value: TaggedTuple) -> OpResult<()>;
}
