//! Reel Media - transcode orchestration over pluggable media backends.
//!
//! A [`MediaHandle`] opens one asset and renders trimmed, re-encoded HEVC
//! QuickTime files from it. The heavy lifting is delegated to a
//! [`Backend`]: the FFmpeg sidecar for real files, or the in-memory
//! backend for deterministic runs.

pub mod asset;
pub mod backend;
pub mod capability;
pub mod error;
pub mod handle;
pub mod negotiate;
pub mod pipeline;
pub mod progress;
pub mod request;
pub mod scope;

pub use asset::{AssetInfo, AssetProbe, MediaAsset};
pub use backend::{
    Backend, EncodedUnit, EncoderConfig, FilterChain, FrameDecoder, FrameEncoder, HevcProfile,
    MediaSource, MemoryBackend, OutputMuxer, OutputProfile, OutputStream, SidecarBackend,
    SourceUnit,
};
pub use capability::{Capability, CodecClass, CodecId, DecoderCandidate, EncoderCandidate};
pub use error::{NegotiationError, OpenError, StageError, TranscodeError};
pub use handle::MediaHandle;
pub use negotiate::{DecoderChoice, DecoderConfig, DecoderInventory, DecoderNegotiator};
pub use pipeline::{Decimator, RunState, ScaleContext, TranscodePipeline, TranscodeSummary};
pub use progress::{progress_at, window_duration, ProgressReporter};
pub use request::{EncoderKnobs, RenditionProfile, TranscodeRequest};
pub use scope::{Release, Scoped};

use std::sync::OnceLock;
use tracing::info;

static INIT: OnceLock<()> = OnceLock::new();

/// One-time process setup. Runs on first open; later calls are no-ops.
pub fn init() {
    INIT.get_or_init(|| {
        info!("Reel media initialized");
    });
}
