//! Error types shared by Ember binaries and tools.

use thiserror::Error;

/// Top-level error type for Ember operations outside the simulation core.
///
/// The gameplay crate reports its own typed conditions; this enum covers the
/// surrounding plumbing: configuration and I/O.
#[derive(Debug, Error)]
pub enum EmberError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ember operations.
pub type EmberResult<T> = Result<T, EmberError>;
