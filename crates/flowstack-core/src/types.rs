//! Values, tuples, and tagged tuples.
//!
//! A `Tuple` is a fixed-arity, positionally compared sequence of `Value`s. It
//! is treated as immutable once handed downstream; stages clone when they need
//! to keep one.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(v) => Some(i64::from(*v)),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I32(v) => Some(f64::from(*v)),
            Value::I64(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Rough in-memory footprint, used for byte-based spill thresholds.
    pub fn estimated_bytes(&self) -> usize {
        let payload = match self {
            Value::Str(s) => s.len(),
            Value::Bin(b) => b.len(),
            _ => 0,
        };
        std::mem::size_of::<Value>() + payload
    }
}

/// Total order over values: nulls first, NaN after every other float,
/// mixed types ordered by variant.
fn value_cmp(a: &Value, b: &Value) -> Ordering {
    use Value::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Bool(x), Bool(y)) => x.cmp(y),
        (I32(x), I32(y)) => x.cmp(y),
        (I64(x), I64(y)) => x.cmp(y),
        (F64(x), F64(y)) => {
            if x.is_nan() && y.is_nan() {
                Ordering::Equal
            } else if x.is_nan() {
                Ordering::Greater
            } else if y.is_nan() {
                Ordering::Less
            } else {
                x.partial_cmp(y).unwrap_or(Ordering::Equal)
            }
        }
        (Str(x), Str(y)) => x.cmp(y),
        (Bin(x), Bin(y)) => x.cmp(y),
        _ => type_order(a).cmp(&type_order(b)),
    }
}

fn type_order(v: &Value) -> u8 {
    use Value::*;
    match v {
        Null => 0,
        Bool(_) => 1,
        I32(_) => 2,
        I64(_) => 3,
        F64(_) => 4,
        Str(_) => 5,
        Bin(_) => 6,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        value_cmp(self, other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        value_cmp(self, other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "'{s}'"),
            Value::Bin(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

/// Ordered, fixed-arity record.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tuple(Vec<Value>);

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// All-null placeholder of the given arity.
    pub fn nulls(arity: usize) -> Self {
        Self(vec![Value::Null; arity])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&Value> {
        self.0.get(pos)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    /// Append every value of `other`.
    pub fn extend_from(&mut self, other: &Tuple) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Clear in place, keeping the allocation.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Copy out the values at `positions`, in that order.
    pub fn select(&self, positions: &[usize]) -> Result<Tuple> {
        let mut out = Vec::with_capacity(positions.len());
        for &pos in positions {
            let v = self.0.get(pos).ok_or_else(|| {
                Error::Fields(format!(
                    "position {pos} out of range for tuple of arity {}",
                    self.0.len()
                ))
            })?;
            out.push(v.clone());
        }
        Ok(Tuple(out))
    }

    /// Concatenate several tuples into one.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a Tuple>) -> Tuple {
        let mut out = Tuple::default();
        for part in parts {
            out.extend_from(part);
        }
        out
    }

    pub fn estimated_bytes(&self) -> usize {
        std::mem::size_of::<Tuple>() + self.0.iter().map(Value::estimated_bytes).sum::<usize>()
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple(values)
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Tuple(iter.into_iter().collect())
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

/// Build a `Tuple` from anything convertible into `Value`.
///
/// ```
/// use flowstack_core::{tuple, Value};
/// let t = tuple!["K1", 3i64];
/// assert_eq!(t.get(1), Some(&Value::I64(3)));
/// ```
#[macro_export]
macro_rules! tuple {
    () => { $crate::types::Tuple::default() };
    ($($v:expr),+ $(,)?) => {
        $crate::types::Tuple::new(vec![$($crate::types::Value::from($v)),+])
    };
}

/// A tuple tagged with the index of the logical input stream that produced it.
///
/// Only appears on a grouping boundary, where several streams are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedTuple {
    pub index: usize,
    pub tuple: Tuple,
}

impl TaggedTuple {
    pub fn new(index: usize, tuple: Tuple) -> Self {
        Self { index, tuple }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_ordering() {
        assert!(Value::Null < Value::I64(0));
        assert!(Value::F64(1.0) < Value::F64(f64::NAN));
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
        assert!(Value::from("a") < Value::from("b"));
        // mixed types order by variant
        assert!(Value::I64(100) < Value::from("0"));
    }

    #[test]
    fn test_tuple_positional_ordering() {
        let a = tuple!["K1", 1i64];
        let b = tuple!["K1", 2i64];
        let c = tuple!["K2", 0i64];
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a, tuple!["K1", 1i64]);
    }

    #[test]
    fn test_select_and_concat() {
        let t = tuple!["a", "b", "c"];
        assert_eq!(t.select(&[2, 0]).unwrap(), tuple!["c", "a"]);
        assert!(t.select(&[3]).is_err());

        let joined = Tuple::concat([&tuple!["x"], &Tuple::nulls(2)]);
        assert_eq!(joined.len(), 3);
        assert!(joined.get(2).unwrap().is_null());
    }

    #[test]
    fn test_display() {
        assert_eq!(tuple!["K1", 3i64].to_string(), "['K1', 3]");
        assert_eq!(Tuple::nulls(1).to_string(), "[null]");
    }

    #[test]
    fn test_serde_roundtrip_preserves_order() {
        let t = tuple!["k", 1i32, 2.5f64, true];
        let bytes = serde_json::to_vec(&t).unwrap();
        let back: Tuple = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, t);
    }
}
