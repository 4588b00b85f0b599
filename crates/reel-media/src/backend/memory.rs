//! Deterministic in-memory backend.
//!
//! Sources are synthetic: frames are generated from a description rather
//! than read from disk. Decoders and encoders model delay lines, the filter
//! chain runs the pure-Rust `PlanExecutor`, and the muxer records everything
//! it is given. A shared `ResourceLedger` tracks every acquisition and
//! release so tests can check for leaks and release order.

use super::{
    Backend, EncodedUnit, EncoderConfig, FilterChain, FrameDecoder, FrameEncoder, MediaSource,
    OutputMuxer, OutputProfile, OutputStream, SourceUnit,
};
use crate::asset::AssetInfo;
use crate::capability::{Capability, CodecId, DecoderCandidate, EncoderCandidate};
use crate::error::{OpenError, StageError};
use crate::negotiate::{DecoderChoice, DecoderInventory};
use crate::scope::Release;
use parking_lot::Mutex;
use reel_color::{PipelinePlan, PlanExecutor};
use reel_core::{
    ColorTags, DecodedFrame, FrameBuffer, FrameLayout, FrameRate, PictureType, Timebase,
};
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Keyframe interval of the synthetic encoder.
const ENCODER_KEYINT: u64 = 240;

// ── Synthetic assets ─────────────────────────────────────────────

/// Description of a synthetic source.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticAsset {
    pub codec: CodecId,
    pub layout: FrameLayout,
    pub frame_rate: FrameRate,
    pub time_base: Timebase,
    pub frame_count: u64,
    /// Keyframe interval in frames
    pub gop: u64,
    pub color: ColorTags,
    /// Emit a non-video unit before every n-th video unit
    pub audio_every: Option<u64>,
    /// Frames whose units fail to decode
    pub corrupt_frames: Vec<u64>,
    /// Frames whose units carry no timestamp
    pub missing_pts: Vec<u64>,
    pub has_video: bool,
}

impl SyntheticAsset {
    /// `seconds` of video at `frame_rate`, in a 1/90000 timebase.
    pub fn new(codec: CodecId, layout: FrameLayout, frame_rate: FrameRate, seconds: f64) -> Self {
        Self {
            codec,
            layout,
            frame_rate,
            time_base: Timebase::new(1, 90_000),
            frame_count: (seconds * frame_rate.to_fps_f64()).round() as u64,
            gop: 30,
            color: ColorTags::SDR_BT709,
            audio_every: None,
            corrupt_frames: Vec::new(),
            missing_pts: Vec::new(),
            has_video: true,
        }
    }

    pub fn with_color(mut self, color: ColorTags) -> Self {
        self.color = color;
        self
    }

    pub fn with_gop(mut self, gop: u64) -> Self {
        self.gop = gop.max(1);
        self
    }

    pub fn with_time_base(mut self, time_base: Timebase) -> Self {
        self.time_base = time_base;
        self
    }

    pub fn with_audio_every(mut self, every: u64) -> Self {
        self.audio_every = Some(every.max(1));
        self
    }

    pub fn with_corrupt_frames(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.corrupt_frames = frames.into_iter().collect();
        self
    }

    pub fn with_missing_pts(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.missing_pts = frames.into_iter().collect();
        self
    }

    /// A container with no video track.
    pub fn without_video(mut self) -> Self {
        self.has_video = false;
        self
    }

    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.frame_rate.to_fps_f64()
    }

    fn frame_duration(&self) -> i64 {
        self.frame_rate.frame_duration_in(self.time_base)
    }

    fn frame_pts(&self, index: u64) -> i64 {
        index as i64 * self.frame_duration()
    }

    fn info(&self, path: &Path) -> AssetInfo {
        AssetInfo {
            path: path.to_path_buf(),
            duration: self.duration(),
            stream_index: if self.audio_every.is_some() { 1 } else { 0 },
            width: self.layout.width,
            height: self.layout.height,
            codec: self.codec.clone(),
            pixel_format_name: self.layout.format.ffmpeg_name().to_string(),
            pixel_format: self.layout.format,
            bit_depth: self.layout.format.bit_depth(),
            color: self.color,
            time_base: self.time_base,
            real_frame_rate: Some(self.frame_rate),
            average_frame_rate: Some(self.frame_rate),
        }
    }
}

// ── Ledger ───────────────────────────────────────────────────────

/// One acquisition or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEvent {
    Acquired { kind: &'static str, id: u64 },
    Released { kind: &'static str, id: u64 },
    /// A source stopped reading ahead
    Suspended { kind: &'static str, id: u64 },
}

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u64,
    events: Vec<LedgerEvent>,
}

/// Shared record of resource lifetimes.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl ResourceLedger {
    fn acquire(&self, kind: &'static str) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.events.push(LedgerEvent::Acquired { kind, id });
        id
    }

    fn release(&self, kind: &'static str, id: u64) {
        self.state
            .lock()
            .events
            .push(LedgerEvent::Released { kind, id });
    }

    fn suspend(&self, kind: &'static str, id: u64) {
        self.state
            .lock()
            .events
            .push(LedgerEvent::Suspended { kind, id });
    }

    /// Every event so far, in order.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.state.lock().events.clone()
    }

    /// Resources acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        let events = self.events();
        let acquired = events
            .iter()
            .filter(|e| matches!(e, LedgerEvent::Acquired { .. }))
            .count();
        let released: std::collections::HashSet<u64> = events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::Released { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        acquired - released.len()
    }

    /// Number of resources released more than once.
    pub fn double_releases(&self) -> usize {
        let mut counts: HashMap<u64, usize> = HashMap::new();
        for e in self.events() {
            if let LedgerEvent::Released { id, .. } = e {
                *counts.entry(id).or_default() += 1;
            }
        }
        counts.values().filter(|&&n| n > 1).count()
    }

    /// Kinds in acquisition order.
    pub fn acquired_kinds(&self) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LedgerEvent::Acquired { kind, .. } => Some(kind),
                _ => None,
            })
            .collect()
    }

    /// How often a source was told to stop reading ahead.
    pub fn suspensions(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, LedgerEvent::Suspended { .. }))
            .count()
    }

    /// Kinds in release order.
    pub fn released_kinds(&self) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LedgerEvent::Released { kind, .. } => Some(kind),
                _ => None,
            })
            .collect()
    }
}

// ── Recorded output ──────────────────────────────────────────────

/// What a muxer was given.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryOutput {
    pub path: PathBuf,
    pub profile: OutputProfile,
    pub stream: Option<OutputStream>,
    pub stream_time_base: Option<Timebase>,
    pub units: Vec<EncodedUnit>,
    pub trailer_written: bool,
}

/// A frame as it reached the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFrameRecord {
    pub pts: Option<i64>,
    pub picture_type: PictureType,
    pub layout: FrameLayout,
    pub color: ColorTags,
}

/// Scripted failures.
///
/// The `*_at` points fail fatally on the n-th call (counted from zero) of
/// the stage, in the middle of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePoints {
    pub decoder_open: bool,
    pub chain_build: bool,
    pub header: bool,
    pub trailer: bool,
    /// Source read of the n-th video unit
    pub read_at: Option<u64>,
    /// Filter chain send of the n-th frame
    pub chain_send_at: Option<u64>,
    /// Muxer write of the n-th unit
    pub write_unit_at: Option<u64>,
}

// ── Backend ──────────────────────────────────────────────────────

/// In-memory backend. Clones share the ledger and recorded outputs.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    assets: HashMap<PathBuf, SyntheticAsset>,
    decoders: Vec<DecoderCandidate>,
    encoders: Vec<EncoderCandidate>,
    default_hevc_encoder: Option<String>,
    decoder_delay: usize,
    encoder_delay: usize,
    chain_latency: usize,
    failures: FailurePoints,
    ledger: ResourceLedger,
    outputs: Arc<Mutex<HashMap<PathBuf, MemoryOutput>>>,
    encoded: Arc<Mutex<Vec<EncodedFrameRecord>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Software decoders for the common codecs (plus libdav1d for AV1) and
    /// software HEVC/H.264 encoders. No hardware.
    pub fn new() -> Self {
        let mut decoders: Vec<_> = [
            CodecId::H264,
            CodecId::Hevc,
            CodecId::Vp9,
            CodecId::Av1,
            CodecId::ProRes,
        ]
        .into_iter()
        .map(|c| DecoderCandidate::new(c.name().to_string(), Capability::SoftwareGeneric(c)))
        .collect();
        decoders.push(DecoderCandidate::new(
            "libdav1d",
            Capability::SoftwarePrecise(CodecId::Av1),
        ));

        Self {
            assets: HashMap::new(),
            decoders,
            encoders: vec![
                EncoderCandidate::new("libx265", Capability::SoftwareGeneric(CodecId::Hevc)),
                EncoderCandidate::new("libx264", Capability::SoftwareGeneric(CodecId::H264)),
            ],
            default_hevc_encoder: Some("libx265".into()),
            decoder_delay: 0,
            encoder_delay: 0,
            chain_latency: 0,
            failures: FailurePoints::default(),
            ledger: ResourceLedger::default(),
            outputs: Arc::new(Mutex::new(HashMap::new())),
            encoded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add hardware decoders and the hardware HEVC encoder.
    pub fn with_hardware(mut self) -> Self {
        for codec in [CodecId::H264, CodecId::Hevc, CodecId::Vp9, CodecId::Av1] {
            self.decoders.insert(
                0,
                DecoderCandidate::new(codec.name().to_string(), Capability::Hardware(codec))
                    .with_hwaccel("memory"),
            );
        }
        self.encoders.push(EncoderCandidate::new(
            "hevc_videotoolbox",
            Capability::Hardware(CodecId::Hevc),
        ));
        self
    }

    pub fn with_asset(mut self, path: impl Into<PathBuf>, asset: SyntheticAsset) -> Self {
        self.assets.insert(path.into(), asset);
        self
    }

    pub fn without_decoder(mut self, name: &str) -> Self {
        self.decoders.retain(|d| d.name != name);
        self
    }

    pub fn without_encoder(mut self, name: &str) -> Self {
        self.encoders.retain(|e| e.name != name);
        if self.default_hevc_encoder.as_deref() == Some(name) {
            self.default_hevc_encoder = None;
        }
        self
    }

    pub fn with_decoder_delay(mut self, frames: usize) -> Self {
        self.decoder_delay = frames;
        self
    }

    pub fn with_encoder_delay(mut self, frames: usize) -> Self {
        self.encoder_delay = frames;
        self
    }

    pub fn with_chain_latency(mut self, frames: usize) -> Self {
        self.chain_latency = frames;
        self
    }

    pub fn with_failures(mut self, failures: FailurePoints) -> Self {
        self.failures = failures;
        self
    }

    pub fn ledger(&self) -> ResourceLedger {
        self.ledger.clone()
    }

    /// Recorded output for `path`, if a muxer was created for it.
    pub fn output(&self, path: &Path) -> Option<MemoryOutput> {
        self.outputs.lock().get(path).cloned()
    }

    /// Every frame handed to an encoder so far.
    pub fn encoded_frames(&self) -> Vec<EncodedFrameRecord> {
        self.encoded.lock().clone()
    }
}

impl Backend for MemoryBackend {
    type Packet = MemoryPacket;
    type Source = MemorySource;
    type Decoder = MemoryDecoder;
    type Chain = MemoryChain;
    type Encoder = MemoryEncoder;
    type Muxer = MemoryMuxer;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn probe(&self, path: &Path) -> Result<AssetInfo, OpenError> {
        let asset = self.assets.get(path).ok_or_else(|| OpenError::OpenFailed {
            path: path.to_path_buf(),
            reason: "no such asset".into(),
        })?;
        if !asset.has_video {
            return Err(OpenError::NoVideoStream(path.to_path_buf()));
        }
        Ok(asset.info(path))
    }

    fn open_source(&self, info: &AssetInfo) -> Result<MemorySource, OpenError> {
        let asset = self
            .assets
            .get(&info.path)
            .cloned()
            .ok_or_else(|| OpenError::OpenFailed {
                path: info.path.clone(),
                reason: "no such asset".into(),
            })?;
        Ok(MemorySource {
            asset,
            next: 0,
            other_sent: false,
            fail_read_at: self.failures.read_at,
            id: self.ledger.acquire("source"),
            ledger: self.ledger.clone(),
        })
    }

    fn decoder_inventory(&self, codec: &CodecId) -> DecoderInventory {
        let candidates: Vec<_> = self
            .decoders
            .iter()
            .filter(|d| d.capability.codec() == codec)
            .cloned()
            .collect();
        let default = candidates
            .iter()
            .find(|d| !d.capability.is_hardware() && d.name == codec.name())
            .or_else(|| candidates.iter().find(|d| !d.capability.is_hardware()))
            .cloned();
        DecoderInventory {
            candidates,
            default,
        }
    }

    fn open_decoder(
        &self,
        source: &mut MemorySource,
        choice: &DecoderChoice,
    ) -> Result<MemoryDecoder, StageError> {
        if self.failures.decoder_open {
            return Err(StageError::Unavailable(format!(
                "decoder {} failed to open",
                choice.candidate.name
            )));
        }
        Ok(MemoryDecoder {
            asset: source.asset.clone(),
            delay: self.decoder_delay,
            queue: VecDeque::new(),
            eof: false,
            id: self.ledger.acquire("decoder"),
            ledger: self.ledger.clone(),
        })
    }

    fn find_encoder(&self, name: &str) -> Option<EncoderCandidate> {
        self.encoders.iter().find(|e| e.name == name).cloned()
    }

    fn default_encoder(&self, codec: &CodecId) -> Option<EncoderCandidate> {
        match codec {
            CodecId::Hevc => self
                .default_hevc_encoder
                .as_deref()
                .and_then(|name| self.find_encoder(name)),
            other => self
                .encoders
                .iter()
                .find(|e| e.capability.codec() == other)
                .cloned(),
        }
    }

    fn open_encoder(
        &self,
        candidate: &EncoderCandidate,
        config: &EncoderConfig,
    ) -> Result<MemoryEncoder, StageError> {
        if self.find_encoder(&candidate.name).is_none() {
            return Err(StageError::Unavailable(format!(
                "encoder {} is not available",
                candidate.name
            )));
        }
        Ok(MemoryEncoder {
            config: config.clone(),
            delay: self.encoder_delay,
            queue: VecDeque::new(),
            produced: 0,
            eof: false,
            log: Arc::clone(&self.encoded),
            id: self.ledger.acquire("encoder"),
            ledger: self.ledger.clone(),
        })
    }

    fn build_chain(&self, plan: &PipelinePlan) -> Result<MemoryChain, StageError> {
        if self.failures.chain_build {
            return Err(StageError::PipelineInit("filter graph rejected".into()));
        }
        let executor = PlanExecutor::new(plan)?;
        Ok(MemoryChain {
            executor,
            output_tags: plan.output_tags(),
            latency: self.chain_latency,
            queue: VecDeque::new(),
            sent: 0,
            fail_send_at: self.failures.chain_send_at,
            eof: false,
            id: self.ledger.acquire("chain"),
            ledger: self.ledger.clone(),
        })
    }

    fn create_output(
        &self,
        path: &Path,
        profile: &OutputProfile,
    ) -> Result<MemoryMuxer, StageError> {
        let file = File::create(path)?;
        self.outputs.lock().insert(
            path.to_path_buf(),
            MemoryOutput {
                path: path.to_path_buf(),
                profile: profile.clone(),
                stream: None,
                stream_time_base: None,
                units: Vec::new(),
                trailer_written: false,
            },
        );
        Ok(MemoryMuxer {
            path: path.to_path_buf(),
            profile: profile.clone(),
            file: Some(BufWriter::new(file)),
            header_written: false,
            units_written: 0,
            failures: self.failures,
            outputs: Arc::clone(&self.outputs),
            id: self.ledger.acquire("muxer"),
            ledger: self.ledger.clone(),
        })
    }
}

// ── Source ───────────────────────────────────────────────────────

/// A synthetic compressed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPacket {
    pub index: u64,
    pub pts: Option<i64>,
    pub key: bool,
    pub corrupt: bool,
}

pub struct MemorySource {
    asset: SyntheticAsset,
    next: u64,
    /// The non-video unit preceding `next` was already emitted
    other_sent: bool,
    fail_read_at: Option<u64>,
    id: u64,
    ledger: ResourceLedger,
}

impl MediaSource for MemorySource {
    type Packet = MemoryPacket;

    fn read(&mut self) -> Result<Option<SourceUnit<MemoryPacket>>, StageError> {
        if self.next >= self.asset.frame_count {
            return Ok(None);
        }
        if let Some(every) = self.asset.audio_every {
            if !self.other_sent && self.next % every == 0 {
                self.other_sent = true;
                return Ok(Some(SourceUnit::Other { stream_index: 0 }));
            }
        }

        let index = self.next;
        if self.fail_read_at == Some(index) {
            return Err(StageError::Unavailable(format!("read error at unit {}", index)));
        }
        self.next += 1;
        self.other_sent = false;
        Ok(Some(SourceUnit::Video(MemoryPacket {
            index,
            pts: (!self.asset.missing_pts.contains(&index)).then(|| self.asset.frame_pts(index)),
            key: index % self.asset.gop == 0,
            corrupt: self.asset.corrupt_frames.contains(&index),
        })))
    }

    fn seek(&mut self, ts: i64) -> Result<(), StageError> {
        let target = (ts.max(0) / self.asset.frame_duration()) as u64;
        let target = target.min(self.asset.frame_count.saturating_sub(1));
        self.next = target / self.asset.gop * self.asset.gop;
        self.other_sent = false;
        Ok(())
    }

    /// Synthetic units are generated on demand, so there is nothing to stop;
    /// the call is only recorded.
    fn suspend(&mut self) {
        self.ledger.suspend("source", self.id);
    }
}

impl Release for MemorySource {
    fn kind(&self) -> &'static str {
        "source"
    }

    fn release(&mut self) {
        self.ledger.release("source", self.id);
    }
}

// ── Decoder ──────────────────────────────────────────────────────

pub struct MemoryDecoder {
    asset: SyntheticAsset,
    delay: usize,
    queue: VecDeque<MemoryPacket>,
    eof: bool,
    id: u64,
    ledger: ResourceLedger,
}

impl MemoryDecoder {
    fn picture(&self, packet: MemoryPacket) -> DecodedFrame {
        let buffer = FrameBuffer::test_pattern(self.asset.layout, packet.index as u32);
        let mut frame = DecodedFrame::new(buffer, packet.pts, self.asset.time_base);
        frame.key_frame = packet.key;
        frame.picture_type = if packet.key {
            PictureType::I
        } else {
            PictureType::P
        };
        frame.color = self.asset.color;
        frame
    }
}

impl FrameDecoder for MemoryDecoder {
    type Packet = MemoryPacket;

    fn send(&mut self, packet: Option<MemoryPacket>) -> Result<(), StageError> {
        match packet {
            Some(p) if p.corrupt => Err(StageError::MidStreamDecode(format!(
                "invalid data in unit {}",
                p.index
            ))),
            Some(p) => {
                self.queue.push_back(p);
                Ok(())
            }
            None => {
                self.eof = true;
                Ok(())
            }
        }
    }

    fn receive(&mut self) -> Result<Option<DecodedFrame>, StageError> {
        if self.queue.len() > self.delay || self.eof {
            Ok(self.queue.pop_front().map(|p| self.picture(p)))
        } else {
            Ok(None)
        }
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.eof = false;
    }
}

impl Release for MemoryDecoder {
    fn kind(&self) -> &'static str {
        "decoder"
    }

    fn release(&mut self) {
        self.ledger.release("decoder", self.id);
    }
}

// ── Filter chain ─────────────────────────────────────────────────

pub struct MemoryChain {
    executor: PlanExecutor,
    output_tags: Option<ColorTags>,
    latency: usize,
    queue: VecDeque<DecodedFrame>,
    sent: u64,
    fail_send_at: Option<u64>,
    eof: bool,
    id: u64,
    ledger: ResourceLedger,
}

impl FilterChain for MemoryChain {
    fn send(&mut self, frame: Option<DecodedFrame>) -> Result<(), StageError> {
        let Some(mut frame) = frame else {
            self.eof = true;
            return Ok(());
        };
        let index = self.sent;
        self.sent += 1;
        if self.fail_send_at == Some(index) {
            return Err(StageError::Unavailable("filter graph terminated".into()));
        }
        frame.buffer = self
            .executor
            .process(&frame.buffer)
            .map_err(|e| StageError::MidStreamFilter(e.to_string()))?;
        if let Some(tags) = self.output_tags {
            frame.color = tags;
        }
        self.queue.push_back(frame);
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<DecodedFrame>, StageError> {
        if self.queue.len() > self.latency || self.eof {
            Ok(self.queue.pop_front())
        } else {
            Ok(None)
        }
    }
}

impl Release for MemoryChain {
    fn kind(&self) -> &'static str {
        "chain"
    }

    fn release(&mut self) {
        self.queue.clear();
        self.ledger.release("chain", self.id);
    }
}

// ── Encoder ──────────────────────────────────────────────────────

pub struct MemoryEncoder {
    config: EncoderConfig,
    delay: usize,
    queue: VecDeque<i64>,
    produced: u64,
    eof: bool,
    log: Arc<Mutex<Vec<EncodedFrameRecord>>>,
    id: u64,
    ledger: ResourceLedger,
}

impl FrameEncoder for MemoryEncoder {
    fn time_base(&self) -> Timebase {
        self.config.time_base
    }

    fn send(&mut self, frame: Option<DecodedFrame>) -> Result<(), StageError> {
        let Some(frame) = frame else {
            self.eof = true;
            return Ok(());
        };
        if frame.layout() != self.config.layout {
            return Err(StageError::MidStreamEncode(format!(
                "frame layout {:?} does not match encoder layout {:?}",
                frame.layout(),
                self.config.layout
            )));
        }
        let pts = frame.pts.ok_or_else(|| {
            StageError::MidStreamEncode("frame without timestamp".to_string())
        })?;
        self.log.lock().push(EncodedFrameRecord {
            pts: frame.pts,
            picture_type: frame.picture_type,
            layout: frame.layout(),
            color: frame.color,
        });
        self.queue.push_back(pts);
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<EncodedUnit>, StageError> {
        if !(self.queue.len() > self.delay || self.eof) {
            return Ok(None);
        }
        let Some(pts) = self.queue.pop_front() else {
            return Ok(None);
        };
        let key = self.produced % ENCODER_KEYINT == 0;
        self.produced += 1;
        Ok(Some(EncodedUnit {
            data: pts.to_le_bytes().to_vec(),
            pts,
            dts: pts,
            key,
            stream_index: 0,
        }))
    }
}

impl Release for MemoryEncoder {
    fn kind(&self) -> &'static str {
        "encoder"
    }

    fn release(&mut self) {
        self.queue.clear();
        self.ledger.release("encoder", self.id);
    }
}

// ── Muxer ────────────────────────────────────────────────────────

pub struct MemoryMuxer {
    path: PathBuf,
    profile: OutputProfile,
    file: Option<BufWriter<File>>,
    header_written: bool,
    units_written: u64,
    failures: FailurePoints,
    outputs: Arc<Mutex<HashMap<PathBuf, MemoryOutput>>>,
    id: u64,
    ledger: ResourceLedger,
}

impl MemoryMuxer {
    fn record(&self, f: impl FnOnce(&mut MemoryOutput)) {
        if let Some(out) = self.outputs.lock().get_mut(&self.path) {
            f(out);
        }
    }

    fn file(&mut self) -> Result<&mut BufWriter<File>, StageError> {
        self.file
            .as_mut()
            .ok_or_else(|| StageError::Unavailable("output already closed".into()))
    }
}

impl OutputMuxer for MemoryMuxer {
    fn write_header(&mut self, stream: &OutputStream) -> Result<Timebase, StageError> {
        if self.failures.header {
            return Err(StageError::Unavailable("header rejected".into()));
        }
        let time_base = self.profile.stream_time_base(stream.encoder_time_base);
        let header = format!(
            "{} {} {}x{} {}\n",
            self.profile.container,
            self.profile.codec_tag,
            stream.layout.width,
            stream.layout.height,
            time_base
        );
        self.file()?.write_all(header.as_bytes())?;
        self.header_written = true;
        self.record(|out| {
            out.stream = Some(stream.clone());
            out.stream_time_base = Some(time_base);
        });
        Ok(time_base)
    }

    fn write_unit(&mut self, unit: EncodedUnit) -> Result<(), StageError> {
        if !self.header_written {
            return Err(StageError::Unavailable("unit written before header".into()));
        }
        let index = self.units_written;
        self.units_written += 1;
        if self.failures.write_unit_at == Some(index) {
            return Err(StageError::Unavailable("no space left on device".into()));
        }
        self.file()?.write_all(&unit.data)?;
        self.record(|out| out.units.push(unit));
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), StageError> {
        if self.failures.trailer {
            return Err(StageError::Unavailable("trailer rejected".into()));
        }
        self.file()?.flush()?;
        self.record(|out| out.trailer_written = true);
        Ok(())
    }
}

impl Release for MemoryMuxer {
    fn kind(&self) -> &'static str {
        "muxer"
    }

    fn release(&mut self) {
        self.file = None;
        self.ledger.release("muxer", self.id);
    }
}
