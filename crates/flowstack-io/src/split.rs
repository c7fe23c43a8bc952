//! Sequential reading over every split of a source.
//!
//! `MultiSplitReader` opens one record reader per split, in split order, and
//! closes the previous reader before opening the next. At most one reader is
//! open at any time.

use std::fmt::Debug;

use flowstack_core::types::Value;

use crate::error::{Error, Result};

/// Reads `(key, value)` records from one split.
pub trait RecordReader {
    /// `Ok(None)` at the end of the split.
    fn next_record(&mut self) -> Result<Option<(Value, Value)>>;

    fn close(&mut self) -> Result<()>;
}

/// Something that can be partitioned into splits and opened per split.
pub trait SplitSource {
    type Split: Debug;
    type Reader: RecordReader;

    /// All splits, in read order. An empty list means nothing to read.
    fn splits(&self) -> Result<Vec<Self::Split>>;

    fn open(&self, split: &Self::Split) -> Result<Self::Reader>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    /// The last opened reader (if any) was handed out.
    Idle,
    /// A reader is open and waiting for `next()`.
    Ready,
    Exhausted,
}

pub struct MultiSplitReader<S: SplitSource> {
    source: S,
    splits: Vec<S::Split>,
    next_split: usize,
    current: Option<S::Reader>,
    state: ReaderState,
}

impl<S: SplitSource> MultiSplitReader<S> {
    pub fn new(source: S) -> Result<Self> {
        let splits = source.splits()?;
        let state = if splits.is_empty() {
            ReaderState::Exhausted
        } else {
            ReaderState::Idle
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(splits = splits.len(), "opened split reader");

        Ok(Self {
            source,
            splits,
            next_split: 0,
            current: None,
            state,
        })
    }

    pub fn split_count(&self) -> usize {
        self.splits.len()
    }

    fn advance(&mut self) -> Result<()> {
        if self.state != ReaderState::Idle {
            return Ok(());
        }
        let Some(split) = self.splits.get(self.next_split) else {
            self.state = ReaderState::Exhausted;
            return Ok(());
        };

        if let Some(mut last) = self.current.take() {
            last.close()?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(split = self.next_split, "reading split");

        self.current = Some(self.source.open(split)?);
        self.next_split += 1;
        self.state = ReaderState::Ready;
        Ok(())
    }

    /// Opens the next split if needed; false once every split was handed out.
    pub fn has_next(&mut self) -> Result<bool> {
        self.advance()?;
        Ok(self.state != ReaderState::Exhausted)
    }

    /// The reader for the next split. It stays open until the following
    /// `next()` or `close()`.
    pub fn next(&mut self) -> Result<&mut S::Reader> {
        if self.state == ReaderState::Exhausted {
            return Err(Error::Protocol("no more values".into()));
        }
        self.advance()?;
        if self.state == ReaderState::Exhausted {
            return Err(Error::Protocol("no more values".into()));
        }
        self.state = ReaderState::Idle;
        self.current
            .as_mut()
            .ok_or_else(|| Error::Protocol("split reader lost its current reader".into()))
    }

    /// Close the last opened reader. Later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        self.state = ReaderState::Exhausted;
        match self.current.take() {
            Some(mut last) => last.close(),
            None => Ok(()),
        }
    }

    /// Drive every record of every split through `f`, then close.
    pub fn for_each_record<F>(&mut self, mut f: F) -> Result<u64>
    where
        F: FnMut(Value, Value) -> Result<()>,
    {
        let mut count = 0u64;
        let outcome = (|| -> Result<()> {
            while self.has_next()? {
                let reader = self.next()?;
                while let Some((key, value)) = reader.next_record()? {
                    f(key, value)?;
                    count += 1;
                }
            }
            Ok(())
        })();
        let closed = self.close();
        outcome.and(closed).map(|_| count)
    }
}
