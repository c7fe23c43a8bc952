use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flowstack_core::types::Value;

use crate::error::{Error, Result};
use crate::split::{RecordReader, SplitSource};

/// One split per file. Records are `(byte offset, line)` with the line
/// terminator stripped.
#[derive(Debug, Clone)]
pub struct LineSplitSource {
    files: Vec<PathBuf>,
}

impl LineSplitSource {
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// Every regular file directly under `dir`, sorted by name. A missing
    /// directory yields no splits.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Self { files: Vec::new() });
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(Self { files })
    }
}

impl SplitSource for LineSplitSource {
    type Split = PathBuf;
    type Reader = LineReader;

    fn splits(&self) -> Result<Vec<PathBuf>> {
        Ok(self.files.clone())
    }

    fn open(&self, split: &PathBuf) -> Result<LineReader> {
        let file = File::open(split)
            .map_err(|e| Error::Split(format!("open {}: {e}", split.display())))?;
        Ok(LineReader {
            inner: Some(BufReader::new(file)),
            offset: 0,
            line: String::new(),
        })
    }
}

pub struct LineReader {
    inner: Option<BufReader<File>>,
    offset: u64,
    line: String,
}

impl RecordReader for LineReader {
    fn next_record(&mut self) -> Result<Option<(Value, Value)>> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(Error::Protocol("read from a closed line reader".into()));
        };
        self.line.clear();
        let n = inner.read_line(&mut self.line)?;
        if n == 0 {
            return Ok(None);
        }
        let start = self.offset;
        self.offset += n as u64;

        let text = self.line.trim_end_matches(['\n', '\r']);
        Ok(Some((Value::I64(start as i64), Value::from(text))))
    }

    fn close(&mut self) -> Result<()> {
        self.inner = None;
        Ok(())
    }
}
