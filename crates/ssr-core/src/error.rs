//! Error taxonomy shared by every crate in the engine.

use thiserror::Error;

/// Top-level error type.
///
/// Construction-time variants (`Configuration`, `Resource`) propagate out
/// of constructors and are reported to the caller. `Capacity` is logged
/// and retried by the producer; it should never actually surface in a
/// correctly sized deployment.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command queue inbound fifo full")]
    Capacity,
}

pub type Result<T> = std::result::Result<T, Error>;
