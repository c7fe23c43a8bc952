use thiserror::Error;

use flowstack_operators::{OpError, StageError};

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Io(#[from] flowstack_io::Error),

    #[error(transparent)]
    Spill(#[from] flowstack_mem::Error),

    /// The source could not turn a raw record into a tuple and has no trap.
    #[error("source '{stage}' failed: {source}")]
    Source { stage: String, source: OpError },

    #[error("invalid task: {0}")]
    Invalid(String),
}
