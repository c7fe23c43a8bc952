//! Field lists and argument selectors.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An ordered list of field names describing the positions of a tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fields {
    names: Vec<String>,
}

impl Fields {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Resolve every name of `subset` to a position in `self`.
    pub fn positions_of(&self, subset: &Fields) -> Result<Vec<usize>> {
        subset
            .names
            .iter()
            .map(|name| {
                self.index_of(name).ok_or_else(|| {
                    Error::Fields(format!("field '{name}' not found in {:?}", self.names))
                })
            })
            .collect()
    }

    /// Concatenate two field lists, rejecting duplicates.
    pub fn append(&self, other: &Fields) -> Result<Fields> {
        let mut names = self.names.clone();
        for name in &other.names {
            if names.contains(name) {
                return Err(Error::Fields(format!("duplicate field '{name}'")));
            }
            names.push(name.clone());
        }
        Ok(Fields { names })
    }
}

impl<S: Into<String>> FromIterator<S> for Fields {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Fields::new(iter)
    }
}

/// Which fields of an incoming tuple an operation sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    #[default]
    All,
    Fields(Fields),
}

impl Selector {
    /// Positions selected from a tuple described by `fields`; `None` means the whole tuple.
    pub fn resolve(&self, fields: &Fields) -> Result<Option<Vec<usize>>> {
        match self {
            Selector::All => Ok(None),
            Selector::Fields(f) => fields.positions_of(f).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_of() {
        let f = Fields::new(["key", "lhs", "rhs"]);
        assert_eq!(f.positions_of(&Fields::new(["rhs", "key"])).unwrap(), vec![2, 0]);
        assert!(f.positions_of(&Fields::new(["missing"])).is_err());
    }

    #[test]
    fn test_append_rejects_duplicates() {
        let a = Fields::new(["k", "v"]);
        assert_eq!(a.append(&Fields::new(["w"])).unwrap().size(), 3);
        assert!(a.append(&Fields::new(["v"])).is_err());
    }

    #[test]
    fn test_selector_resolve() {
        let f = Fields::new(["a", "b"]);
        assert_eq!(Selector::All.resolve(&f).unwrap(), None);
        assert_eq!(
            Selector::Fields(Fields::new(["b"])).resolve(&f).unwrap(),
            Some(vec![1])
        );
        assert!(Selector::Fields(Fields::new(["c"])).resolve(&f).is_err());
    }
}
