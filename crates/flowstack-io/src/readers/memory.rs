use flowstack_core::types::Value;

use crate::error::Result;
use crate::split::{RecordReader, SplitSource};

/// Splits held in memory; each split is a list of `(key, value)` records.
#[derive(Debug, Clone, Default)]
pub struct VecSplitSource {
    splits: Vec<Vec<(Value, Value)>>,
}

impl VecSplitSource {
    pub fn new(splits: Vec<Vec<(Value, Value)>>) -> Self {
        Self { splits }
    }

    /// One split per entry, keyed by position within the split.
    pub fn from_values(splits: Vec<Vec<Value>>) -> Self {
        let splits = splits
            .into_iter()
            .map(|values| {
                values
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (Value::I64(i as i64), v))
                    .collect()
            })
            .collect();
        Self { splits }
    }
}

pub struct VecReader {
    records: std::vec::IntoIter<(Value, Value)>,
}

impl RecordReader for VecReader {
    fn next_record(&mut self) -> Result<Option<(Value, Value)>> {
        Ok(self.records.next())
    }

    fn close(&mut self) -> Result<()> {
        self.records = Vec::new().into_iter();
        Ok(())
    }
}

impl SplitSource for VecSplitSource {
    type Split = usize;
    type Reader = VecReader;

    fn splits(&self) -> Result<Vec<usize>> {
        Ok((0..self.splits.len()).collect())
    }

    fn open(&self, split: &usize) -> Result<VecReader> {
        let records = self
            .splits
            .get(*split)
            .cloned()
            .ok_or_else(|| crate::error::Error::Split(format!("no split {split}")))?;
        Ok(VecReader {
            records: records.into_iter(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::MultiSplitReader;

    #[test]
    fn test_reads_splits_in_order() {
        let source = VecSplitSource::from_values(vec![
            vec![Value::from("a"), Value::from("b")],
            vec![Value::from("c")],
        ]);
        let mut reader = MultiSplitReader::new(source).unwrap();
        let mut values = Vec::new();
        reader
            .for_each_record(|k, v| {
                values.push((k, v));
                Ok(())
            })
            .unwrap();

        assert_eq!(
            values,
            vec![
                (Value::I64(0), Value::from("a")),
                (Value::I64(1), Value::from("b")),
                (Value::I64(0), Value::from("c")),
            ]
        );
    }
}
