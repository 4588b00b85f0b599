//! Reel Core - Foundation types for the transcoder
//!
//! This crate provides the fundamental types used throughout Reel:
//! - Timebases, frame rates and timestamp rescaling
//! - Color tags (transfer, primaries, matrix, range)
//! - Frame buffers and pixel formats
//! - The shared error type

pub mod color;
pub mod error;
pub mod frame;
pub mod time;

pub use color::{ColorPrimaries, ColorRange, ColorTags, MatrixCoefficients, TransferCharacteristic};
pub use error::{ReelError, Result};
pub use frame::{DecodedFrame, FrameBuffer, FrameLayout, FramePlane, PictureType, PixelFormat};
pub use time::{FrameRate, Timebase};
