//! Concrete split sources.

mod lines;
mod memory;

pub use lines::{LineReader, LineSplitSource};
pub use memory::{VecReader, VecSplitSource};
