//! Co-grouping of several tagged input streams under one key.
//!
//! The closure partitions a key's tuples by input position; a pluggable
//! [`Joiner`] decides how positions combine (inner, outer, custom).

mod closure;

pub use closure::{CoGroupClosure, GroupInput};

use flowstack_core::types::Tuple;

use crate::error::Result;

pub type TupleIter<'a> = Box<dyn Iterator<Item = Result<Tuple>> + 'a>;

/// What a joiner sees of one key's tuples.
pub trait JoinerClosure {
    /// Number of logical input positions.
    fn width(&self) -> usize;

    /// A fresh iterator over one position's tuples, in arrival order.
    fn iterator_for(&self, position: usize) -> Result<TupleIter<'_>>;

    fn is_empty(&self, position: usize) -> Result<bool>;

    /// The key repeated per position, or nulls of the key arity where the
    /// position is empty, concatenated in position order.
    fn group_tuple(&self, key: &Tuple) -> Result<Tuple>;
}

pub trait Joiner: Send + Sync {
    fn join<'a>(&self, closure: &'a dyn JoinerClosure) -> Result<TupleIter<'a>>;
}
