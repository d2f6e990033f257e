//! Error types for polyphon-synth.

use thiserror::Error;

/// Result type alias for polyphon-synth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in polyphon-synth.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid configuration parameter.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A voice or sound index past the end of the pool.
    #[error("{kind} index {index} out of range (pool holds {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },
}
