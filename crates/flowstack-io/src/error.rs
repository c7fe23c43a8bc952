use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("storage configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("split error: {0}")]
    Split(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Mem(#[from] flowstack_mem::Error),
}
