//! Strongly-typed identifiers used across the engine.
//!
//! Downstream crates (exec, operators, mem, etc.) should *not* use raw integers for IDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

new_id!(NodeId);
new_id!(SpillId);

/// Identity of one unit of work (a single mapper or reducer invocation).
///
/// Unlike the counters above this must be unique across processes, since
/// concurrent tasks share a spill root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(NodeId::new(3).to_string(), "NodeId(3)");
        assert_eq!(SpillId::new(7).get(), 7);
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskId::random();
        let b = TaskId::random();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("task-"));
    }
}
