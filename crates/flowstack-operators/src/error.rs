use thiserror::Error;

/// Result type for stage construction and execution.
pub type Result<T> = std::result::Result<T, StageError>;

/// Failure reported by a user operation, source, sink, or shuffle writer.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Fields(#[from] flowstack_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OpError {
    pub fn failed(msg: impl Into<String>) -> Self {
        OpError::Failed(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    /// Malformed step graph; raised before any record is processed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An operation failed on a record and the stage had no trap.
    #[error("stage '{stage}' failed: {source}")]
    Operation { stage: String, source: OpError },

    #[error("spill io error: {0}")]
    Spill(#[from] flowstack_mem::Error),

    #[error("position {position} out of range for width {width}")]
    Index { position: usize, width: usize },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("sink '{stage}' failed: {source}")]
    Sink { stage: String, source: OpError },

    #[error("shuffle write from '{stage}' failed: {source}")]
    Shuffle { stage: String, source: OpError },
}

impl From<flowstack_core::Error> for StageError {
    fn from(e: flowstack_core::Error) -> Self {
        StageError::Config(e.to_string())
    }
}
