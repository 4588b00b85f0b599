//! FFmpeg backend built on `ffmpeg-sidecar`.
//!
//! Each stage is an ffmpeg child process talking over pipes:
//!
//! - reader: demux + decode the source, raw pictures on stdout
//! - filter: one zscale/tonemap graph per plan, raw in and out
//! - encoder: raw in, NUT-wrapped bitstream out
//! - muxer: NUT in, stream-copied into the QuickTime output
//!
//! The decoder choice is applied to the reader, so the decoder stage only
//! unpacks pictures.

pub mod encoder;
pub mod filter;
pub mod inventory;
pub mod muxer;
mod pipe;
pub mod probe;
pub mod reader;

use crate::asset::AssetInfo;
use crate::backend::{Backend, EncoderConfig, OutputProfile};
use crate::capability::{CodecId, EncoderCandidate};
use crate::error::{OpenError, StageError};
use crate::negotiate::{DecoderChoice, DecoderInventory};
use reel_color::PipelinePlan;
use reel_core::FrameRate;
use std::path::Path;
use std::sync::OnceLock;

pub use encoder::SidecarEncoder;
pub use filter::{filter_expression, SidecarChain};
pub use inventory::Inventory;
pub use muxer::SidecarMuxer;
pub use reader::{RawPicture, SidecarDecoder, SidecarSource};

static INVENTORY: OnceLock<Inventory> = OnceLock::new();

/// Backend driving the system ffmpeg binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarBackend;

impl SidecarBackend {
    pub fn new() -> Self {
        Self
    }

    /// Codec inventory of the local ffmpeg build, queried once per process.
    pub fn inventory(&self) -> &'static Inventory {
        INVENTORY.get_or_init(Inventory::query)
    }

    /// True when ffmpeg can be found on this machine.
    pub fn is_available() -> bool {
        ffmpeg_sidecar::command::ffmpeg_is_installed()
    }
}

impl Backend for SidecarBackend {
    type Packet = RawPicture;
    type Source = SidecarSource;
    type Decoder = SidecarDecoder;
    type Chain = SidecarChain;
    type Encoder = SidecarEncoder;
    type Muxer = SidecarMuxer;

    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn probe(&self, path: &Path) -> Result<AssetInfo, OpenError> {
        probe::probe(path)
    }

    fn open_source(&self, asset: &AssetInfo) -> Result<SidecarSource, OpenError> {
        Ok(SidecarSource::new(asset.clone()))
    }

    fn decoder_inventory(&self, codec: &CodecId) -> DecoderInventory {
        self.inventory().decoders_for(codec)
    }

    fn open_decoder(
        &self,
        source: &mut SidecarSource,
        choice: &DecoderChoice,
    ) -> Result<SidecarDecoder, StageError> {
        source.configure(choice);
        Ok(SidecarDecoder::new(source.info().clone()))
    }

    fn find_encoder(&self, name: &str) -> Option<EncoderCandidate> {
        self.inventory().encoder(name)
    }

    fn default_encoder(&self, codec: &CodecId) -> Option<EncoderCandidate> {
        self.inventory().default_encoder(codec)
    }

    fn open_encoder(
        &self,
        candidate: &EncoderCandidate,
        config: &EncoderConfig,
    ) -> Result<SidecarEncoder, StageError> {
        SidecarEncoder::spawn(candidate, config)
    }

    fn build_chain(&self, plan: &PipelinePlan) -> Result<SidecarChain, StageError> {
        // Frames keep their own timestamps; the input rate only has to be valid.
        SidecarChain::spawn(plan, FrameRate::default())
    }

    fn create_output(
        &self,
        path: &Path,
        profile: &OutputProfile,
    ) -> Result<SidecarMuxer, StageError> {
        SidecarMuxer::create(path, profile)
    }
}
