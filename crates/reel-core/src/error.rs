//! Error types for Reel.

use thiserror::Error;

/// Error type shared by the foundation crates.
#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Frame size mismatch: expected {expected} bytes, got {got}")]
    FrameSize { expected: usize, got: usize },
}

/// Result type alias for Reel operations.
pub type Result<T> = std::result::Result<T, ReelError>;
