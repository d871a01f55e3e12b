//! Common error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The udev monitor could not be opened; fatal to detection, not to the
    /// host process
    #[error("monitor error: {0}")]
    Monitor(String),

    #[error("bridge error: {0}")]
    Channel(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
