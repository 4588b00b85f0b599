//! Backend abstraction over demux, decode, filter, encode and mux.
//!
//! The transcode pipeline only talks to these traits. Stages follow
//! send/receive semantics: `send(None)` signals end of stream and
//! `receive()` returning `Ok(None)` means nothing more is available right
//! now (or ever, once end of stream was sent and everything was drained).

pub mod memory;
pub mod sidecar;

use crate::asset::AssetInfo;
use crate::capability::{CodecId, EncoderCandidate};
use crate::error::{OpenError, StageError};
use crate::negotiate::{DecoderChoice, DecoderInventory};
use crate::request::EncoderKnobs;
use crate::scope::Release;
use reel_color::PipelinePlan;
use reel_core::{ColorTags, DecodedFrame, FrameLayout, FrameRate, Timebase};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use memory::MemoryBackend;
pub use sidecar::SidecarBackend;

/// A unit read from the source container.
#[derive(Debug)]
pub enum SourceUnit<P> {
    /// A unit of the selected video stream
    Video(P),
    /// A unit of any other stream; discarded by the transcode loop
    Other { stream_index: usize },
}

/// A compressed unit produced by an encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    pub data: Vec<u8>,
    /// Presentation timestamp (encoder timebase until rescaled)
    pub pts: i64,
    /// Decode timestamp (encoder timebase until rescaled)
    pub dts: i64,
    pub key: bool,
    pub stream_index: usize,
}

impl EncodedUnit {
    /// Move both timestamps from `from` into `to`.
    pub fn rescale(&mut self, from: Timebase, to: Timebase) {
        self.pts = from.rescale(self.pts, to);
        self.dts = from.rescale(self.dts, to);
    }
}

/// HEVC profile requested from an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HevcProfile {
    Main,
    Main10,
}

impl HevcProfile {
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Main10 => "main10",
        }
    }
}

/// Everything an encoder needs at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub layout: FrameLayout,
    pub frame_rate: FrameRate,
    /// Inverse of the frame rate
    pub time_base: Timebase,
    pub profile: HevcProfile,
    /// Tags written into the bitstream
    pub color: ColorTags,
    /// Knobs already filtered for the encoder's capability
    pub knobs: EncoderKnobs,
}

/// Fixed output container profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputProfile {
    pub container: String,
    pub codec_tag: String,
    /// Track timescale; 0 lets the container follow the encoder timebase
    pub timescale: u32,
}

impl OutputProfile {
    /// QuickTime with the `hvc1` sample entry.
    pub fn quicktime_hvc1(timescale: u32) -> Self {
        Self {
            container: "mov".into(),
            codec_tag: "hvc1".into(),
            timescale,
        }
    }

    /// Stream timebase for a given encoder timebase.
    pub fn stream_time_base(&self, encoder: Timebase) -> Timebase {
        if self.timescale > 0 {
            Timebase::new(1, self.timescale as i64)
        } else {
            encoder
        }
    }
}

/// Description of the single output video stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputStream {
    pub codec: CodecId,
    pub layout: FrameLayout,
    pub frame_rate: FrameRate,
    pub encoder_time_base: Timebase,
    pub color: ColorTags,
}

/// Reads units from an opened source.
pub trait MediaSource: Release + Send {
    type Packet: Send;

    /// Next unit in container order; `Ok(None)` at end of file.
    fn read(&mut self) -> Result<Option<SourceUnit<Self::Packet>>, StageError>;

    /// Reposition to the keyframe at or before `ts` (stream timebase).
    fn seek(&mut self, ts: i64) -> Result<(), StageError>;

    /// Stop reading ahead and drop anything buffered. A later `read`
    /// resumes from the last seek position.
    fn suspend(&mut self);
}

/// Turns packets into frames.
pub trait FrameDecoder: Release + Send {
    type Packet: Send;

    fn send(&mut self, packet: Option<Self::Packet>) -> Result<(), StageError>;
    fn receive(&mut self) -> Result<Option<DecodedFrame>, StageError>;

    /// Drop buffered frames and reference history, e.g. after a seek.
    fn flush(&mut self);
}

/// Executes a `PipelinePlan`.
pub trait FilterChain: Release + Send {
    fn send(&mut self, frame: Option<DecodedFrame>) -> Result<(), StageError>;
    fn receive(&mut self) -> Result<Option<DecodedFrame>, StageError>;
}

/// Turns frames into encoded units.
pub trait FrameEncoder: Release + Send {
    fn time_base(&self) -> Timebase;
    fn send(&mut self, frame: Option<DecodedFrame>) -> Result<(), StageError>;
    fn receive(&mut self) -> Result<Option<EncodedUnit>, StageError>;
}

/// Writes the output container.
pub trait OutputMuxer: Release + Send {
    /// Write the container header; returns the stream timebase units must
    /// be rescaled to.
    fn write_header(&mut self, stream: &OutputStream) -> Result<Timebase, StageError>;
    fn write_unit(&mut self, unit: EncodedUnit) -> Result<(), StageError>;
    fn write_trailer(&mut self) -> Result<(), StageError>;
}

/// A media toolkit the pipeline can drive.
pub trait Backend: Send {
    type Packet: Send;
    type Source: MediaSource<Packet = Self::Packet>;
    type Decoder: FrameDecoder<Packet = Self::Packet>;
    type Chain: FilterChain;
    type Encoder: FrameEncoder;
    type Muxer: OutputMuxer;

    fn name(&self) -> &'static str;

    /// Describe the first video stream of `path`.
    fn probe(&self, path: &Path) -> Result<AssetInfo, OpenError>;

    fn open_source(&self, asset: &AssetInfo) -> Result<Self::Source, OpenError>;

    /// Decoders able to handle `codec`, tagged by capability.
    fn decoder_inventory(&self, codec: &CodecId) -> DecoderInventory;

    fn open_decoder(
        &self,
        source: &mut Self::Source,
        choice: &DecoderChoice,
    ) -> Result<Self::Decoder, StageError>;

    /// Look up an encoder by implementation name.
    fn find_encoder(&self, name: &str) -> Option<EncoderCandidate>;

    /// The encoder used when a request names none.
    fn default_encoder(&self, codec: &CodecId) -> Option<EncoderCandidate>;

    fn open_encoder(
        &self,
        candidate: &EncoderCandidate,
        config: &EncoderConfig,
    ) -> Result<Self::Encoder, StageError>;

    fn build_chain(&self, plan: &PipelinePlan) -> Result<Self::Chain, StageError>;

    /// Open `path` for writing with the fixed container profile.
    fn create_output(&self, path: &Path, profile: &OutputProfile)
        -> Result<Self::Muxer, StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_rescale_to_track_timescale() {
        let mut unit = EncodedUnit {
            data: vec![],
            pts: 3,
            dts: 2,
            key: false,
            stream_index: 0,
        };
        unit.rescale(FrameRate::FPS_30.frame_timebase(), Timebase::new(1, 240_000));
        assert_eq!(unit.pts, 24_000);
        assert_eq!(unit.dts, 16_000);
    }

    #[test]
    fn test_zero_timescale_follows_encoder() {
        let enc = FrameRate::FPS_60.frame_timebase();
        assert_eq!(OutputProfile::quicktime_hvc1(0).stream_time_base(enc), enc);
        assert_eq!(
            OutputProfile::quicktime_hvc1(240_000).stream_time_base(enc),
            Timebase::new(1, 240_000)
        );
    }
}
