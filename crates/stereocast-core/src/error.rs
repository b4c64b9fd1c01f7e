//! Error types for the renderer.

use thiserror::Error;

use crate::types::Eye;

/// Renderer-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Degenerate or inconsistent configuration, fatal at setup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A tile draw failed and the whole sweep was dropped
    #[error("Sweep {sweep} for {eye} eye aborted: {reason}")]
    SweepAborted {
        eye: Eye,
        sweep: u64,
        reason: String,
    },

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Out of bounds access
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// GPU error
    #[error("GPU error: {0}")]
    Gpu(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
