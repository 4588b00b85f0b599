//! Color subsystem errors.

use reel_core::FrameLayout;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColorError {
    #[error("frame layout mismatch: expected {expected:?}, got {got:?}")]
    LayoutMismatch {
        expected: FrameLayout,
        got: FrameLayout,
    },
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("unsupported conversion: {0}")]
    Unsupported(String),
}
