//! Error types for opening assets and running transcodes.

use crate::capability::CodecId;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to open a source asset.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("cannot open {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },
    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),
}

/// No decode capability satisfies the policy for a codec.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("no decoder available for {0}")]
    NoDecoderAvailable(CodecId),
}

/// Errors raised by an individual stage (source, decoder, chain, encoder,
/// muxer).
///
/// The `MidStream*` variants describe a single unit or frame and are
/// tolerated by the transcode loop; the rest are fatal where they occur.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("decode error: {0}")]
    MidStreamDecode(String),
    #[error("encode error: {0}")]
    MidStreamEncode(String),
    #[error("filter error: {0}")]
    MidStreamFilter(String),
    #[error("pipeline init failed: {0}")]
    PipelineInit(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StageError {
    /// Whether the error concerns one unit or frame only.
    pub fn is_mid_stream(&self) -> bool {
        matches!(
            self,
            Self::MidStreamDecode(_) | Self::MidStreamEncode(_) | Self::MidStreamFilter(_)
        )
    }
}

impl From<reel_color::ColorError> for StageError {
    fn from(e: reel_color::ColorError) -> Self {
        Self::PipelineInit(e.to_string())
    }
}

/// Failure of a whole transcode run.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("media handle is closed")]
    Closed,
    #[error("decoder init failed: {0}")]
    DecoderInit(String),
    #[error("encoder init failed: {0}")]
    EncoderInit(String),
    #[error("cannot open output {path}: {reason}")]
    OutputOpen { path: PathBuf, reason: String },
    #[error("header write failed: {0}")]
    HeaderWrite(String),
    #[error("trailer write failed: {0}")]
    TrailerWrite(String),
    #[error("stream error: {0}")]
    Stream(#[from] StageError),
}

impl From<NegotiationError> for TranscodeError {
    fn from(e: NegotiationError) -> Self {
        Self::DecoderInit(e.to_string())
    }
}
