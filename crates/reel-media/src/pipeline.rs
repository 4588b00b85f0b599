//! The transcode orchestrator.
//!
//! One run reads the shared source from the start of the trim window,
//! decodes, trims, decimates, applies the color/scale plan, encodes and
//! muxes into the fixed output profile. Per-run resources are released in
//! reverse acquisition order on every exit path, and the shared source is
//! suspended so nothing keeps decoding between runs.

use crate::asset::AssetInfo;
use crate::backend::{
    Backend, EncoderConfig, FilterChain, FrameDecoder, FrameEncoder, HevcProfile, MediaSource,
    OutputMuxer, OutputProfile, OutputStream, SourceUnit,
};
use crate::capability::{CodecId, EncoderCandidate};
use crate::error::{StageError, TranscodeError};
use crate::negotiate::select_encoder;
use crate::progress::{window_duration, ProgressReporter};
use crate::request::TranscodeRequest;
use crate::scope::{Release, Scoped};
use reel_color::{
    ColorError, ColorPipelinePlanner, PipelinePlan, PlanFlags, ScaleKernel, Scaler,
    SourceCharacteristics,
};
use reel_core::{
    ColorTags, DecodedFrame, FrameLayout, FrameRate, PictureType, PixelFormat, Timebase,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Init,
    HeaderWritten,
    Seeking,
    Decoding,
    FlushPipeline,
    FlushEncoder,
    TrailerWritten,
    Closed,
    Failed,
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeSummary {
    /// Frames produced by the decoder
    pub frames_decoded: u64,
    /// Frames dropped by the trim window or decimation
    pub frames_skipped: u64,
    /// Frames accepted by the encoder
    pub frames_encoded: u64,
    /// Units handed to the muxer; raw stdout chunks on the sidecar backend
    pub units_written: u64,
    /// `None` when no frame reached the plan stage
    pub plan: Option<PipelinePlan>,
    pub state: RunState,
}

impl TranscodeSummary {
    fn new() -> Self {
        Self {
            frames_decoded: 0,
            frames_skipped: 0,
            frames_encoded: 0,
            units_written: 0,
            plan: None,
            state: RunState::Init,
        }
    }
}

// ── Rate and geometry ────────────────────────────────────────────

/// Keeps every n-th frame when the source rate exceeds the target.
#[derive(Debug, Clone)]
pub struct Decimator {
    stride: u64,
    index: u64,
}

impl Decimator {
    /// `stride = floor(source / target)` when the target is lower, else 1.
    pub fn new(source_fps: f64, target_fps: f64) -> Self {
        let stride = if target_fps > 0.0 && source_fps > target_fps {
            ((source_fps / target_fps).floor() as u64).max(1)
        } else {
            1
        };
        Self { stride, index: 0 }
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Decide for the next frame. Every call advances the index.
    pub fn keep(&mut self) -> bool {
        let keep = self.index % self.stride == 0;
        self.index += 1;
        keep
    }
}

/// Requested rate if positive and below the source estimate, else the
/// estimate.
pub fn target_frame_rate(source: FrameRate, requested_fps: f64) -> FrameRate {
    if requested_fps <= 0.0 || requested_fps >= source.to_fps_f64() {
        return source;
    }
    let rate = FrameRate::from_fps_f64(requested_fps);
    if rate.is_valid() {
        rate
    } else {
        source
    }
}

/// Output size: a smaller requested height scales the width in
/// proportion, rounded down to even; otherwise the source size.
pub fn target_dimensions(width: u32, height: u32, requested_height: u32) -> (u32, u32) {
    if requested_height > 0 && requested_height < height {
        let width = (width as u64 * requested_height as u64 / height as u64) as u32;
        (width & !1, requested_height)
    } else {
        (width, height)
    }
}

/// Pixel format and HEVC profile for an encoder.
///
/// Hardware encoders take NV12. Software encoders go 10-bit when asked to,
/// or when the source is high bit depth or HDR.
pub fn encoder_format(
    candidate: &EncoderCandidate,
    asset: &AssetInfo,
    ten_bit: bool,
) -> (PixelFormat, HevcProfile) {
    if candidate.capability.is_hardware() {
        (PixelFormat::Nv12, HevcProfile::Main)
    } else if ten_bit || asset.is_high_bit_depth() || asset.color.is_hdr() {
        (PixelFormat::Yuv420P10, HevcProfile::Main10)
    } else {
        (PixelFormat::Yuv420P, HevcProfile::Main)
    }
}

// ── Scale context ────────────────────────────────────────────────

/// Software scaler used when no filter chain runs.
///
/// It owns only heap memory, so release is a no-op and backends never see
/// it; it is still scoped so it drops with the other per-run stages.
pub struct ScaleContext {
    scaler: Scaler,
}

impl ScaleContext {
    pub fn new(src: FrameLayout, dst: FrameLayout, kernel: ScaleKernel) -> Result<Self, ColorError> {
        Ok(Self {
            scaler: Scaler::new(src, dst, kernel)?,
        })
    }

    pub fn source_layout(&self) -> FrameLayout {
        self.scaler.source_layout()
    }

    pub fn convert(&self, mut frame: DecodedFrame) -> Result<DecodedFrame, ColorError> {
        frame.buffer = self.scaler.scale(&frame.buffer)?;
        Ok(frame)
    }
}

impl Release for ScaleContext {
    fn kind(&self) -> &'static str {
        "scaler"
    }

    fn release(&mut self) {}
}

// ── Per-run stages ───────────────────────────────────────────────

/// Resources and counters of one run.
///
/// Fields drop in declaration order, so the most recently acquired
/// resource comes first.
struct Stages<B: Backend> {
    scaler: Option<Scoped<ScaleContext>>,
    chain: Option<Scoped<B::Chain>>,
    encoder: Scoped<B::Encoder>,
    muxer: Scoped<B::Muxer>,
    target: FrameLayout,
    kernel: ScaleKernel,
    encoder_time_base: Timebase,
    stream_time_base: Timebase,
    next_pts: i64,
    summary: TranscodeSummary,
}

impl<B: Backend> Stages<B> {
    /// Fix the plan from the first kept frame.
    fn plan(&mut self, backend: &B, frame: &DecodedFrame, request: &TranscodeRequest) {
        let passthrough = PipelinePlan::Passthrough {
            target: self.target,
        };
        let plan = if request.filter_chain {
            let source = SourceCharacteristics {
                layout: frame.layout(),
                tags: frame.color,
            };
            let flags = PlanFlags {
                tonemap: request.tonemap,
            };
            let plan = ColorPipelinePlanner::decide(source, self.target, flags);
            if plan.is_passthrough() {
                plan
            } else {
                match backend.build_chain(&plan) {
                    Ok(chain) => {
                        self.chain = Some(Scoped::new(chain));
                        plan
                    }
                    Err(e) => {
                        warn!("Filter graph failed ({}), using scale context", e);
                        passthrough
                    }
                }
            }
        } else {
            passthrough
        };
        info!("Pipeline plan: {}", plan.name());
        self.summary.plan = Some(plan);
    }

    /// Bring a frame to the encoder layout with the scale context.
    fn convert(&mut self, frame: DecodedFrame) -> Result<DecodedFrame, StageError> {
        let layout = frame.layout();
        if layout == self.target {
            return Ok(frame);
        }
        let stale = self
            .scaler
            .as_ref()
            .map_or(true, |s| s.source_layout() != layout);
        if stale {
            // Drop the previous context before building its replacement.
            self.scaler = None;
            self.scaler = Some(Scoped::new(ScaleContext::new(
                layout,
                self.target,
                self.kernel,
            )?));
        }
        match self.scaler.as_ref() {
            Some(scaler) => Ok(scaler.convert(frame)?),
            None => Err(StageError::PipelineInit("scale context missing".into())),
        }
    }

    /// Run a kept frame through the chain (or the scale context) and encode
    /// whatever comes out.
    fn process(&mut self, frame: DecodedFrame) -> Result<(), TranscodeError> {
        if self.chain.is_none() {
            return self.encode_converted(frame);
        }
        if let Some(chain) = self.chain.as_mut() {
            match chain.send(Some(frame)) {
                Ok(()) => {}
                Err(e) if e.is_mid_stream() => {
                    warn!("Filter chain rejected frame: {}", e);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.drain_chain()
    }

    fn drain_chain(&mut self) -> Result<(), TranscodeError> {
        loop {
            let Some(chain) = self.chain.as_mut() else {
                return Ok(());
            };
            match chain.receive() {
                Ok(Some(frame)) => self.encode_converted(frame)?,
                Ok(None) => return Ok(()),
                Err(e) if e.is_mid_stream() => {
                    warn!("Filter chain error: {}", e);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn encode_converted(&mut self, frame: DecodedFrame) -> Result<(), TranscodeError> {
        match self.convert(frame) {
            Ok(frame) => self.encode(frame),
            Err(e) => {
                warn!("Scale failed, dropping frame: {}", e);
                Ok(())
            }
        }
    }

    fn encode(&mut self, mut frame: DecodedFrame) -> Result<(), TranscodeError> {
        frame.pts = Some(self.next_pts);
        frame.time_base = self.encoder_time_base;
        frame.picture_type = PictureType::None;
        frame.color = ColorTags::SDR_BT709;
        match self.encoder.send(Some(frame)) {
            Ok(()) => {
                self.next_pts += 1;
                self.summary.frames_encoded += 1;
            }
            Err(e @ StageError::MidStreamEncode(_)) => {
                warn!("{}", e);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.drain_encoder()
    }

    fn drain_encoder(&mut self) -> Result<(), TranscodeError> {
        loop {
            match self.encoder.receive() {
                Ok(Some(mut unit)) => {
                    unit.rescale(self.encoder_time_base, self.stream_time_base);
                    unit.stream_index = 0;
                    self.muxer.write_unit(unit)?;
                    self.summary.units_written += 1;
                }
                Ok(None) => return Ok(()),
                Err(e @ StageError::MidStreamEncode(_)) => {
                    warn!("{}", e);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn flush_chain(&mut self) -> Result<(), TranscodeError> {
        if let Some(chain) = self.chain.as_mut() {
            chain.send(None)?;
        }
        self.drain_chain()
    }

    fn flush_encoder(&mut self) -> Result<(), TranscodeError> {
        self.encoder.send(None)?;
        self.drain_encoder()
    }
}

// ── Orchestrator ─────────────────────────────────────────────────

/// Drives one transcode over a handle's shared source and decoder.
pub struct TranscodePipeline<'a, B: Backend> {
    backend: &'a B,
    asset: &'a AssetInfo,
    source: &'a mut B::Source,
    decoder: &'a mut B::Decoder,
    source_dirty: bool,
    state: RunState,
}

impl<'a, B: Backend> TranscodePipeline<'a, B> {
    pub fn new(
        backend: &'a B,
        asset: &'a AssetInfo,
        source: &'a mut B::Source,
        decoder: &'a mut B::Decoder,
    ) -> Self {
        Self {
            backend,
            asset,
            source,
            decoder,
            source_dirty: false,
            state: RunState::Init,
        }
    }

    /// The source was read before, so the run must reposition it even when
    /// the window starts at zero.
    pub fn with_dirty_source(mut self, dirty: bool) -> Self {
        self.source_dirty = dirty;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "Transcode state");
        self.state = next;
    }

    /// Run the request to completion or failure.
    pub fn run(
        mut self,
        request: &TranscodeRequest,
        progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<TranscodeSummary, TranscodeError> {
        let result = self.execute(request, progress);
        self.source.suspend();
        match result {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.transition(RunState::Failed);
                error!("Transcode to {} failed: {}", request.output.display(), e);
                Err(e)
            }
        }
    }

    fn execute(
        &mut self,
        request: &TranscodeRequest,
        progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<TranscodeSummary, TranscodeError> {
        let asset = self.asset;
        let backend = self.backend;

        let profile = OutputProfile::quicktime_hvc1(request.timescale);
        let muxer = backend
            .create_output(&request.output, &profile)
            .map_err(|e| TranscodeError::OutputOpen {
                path: request.output.clone(),
                reason: e.to_string(),
            })?;
        let mut muxer = Scoped::new(muxer);

        let candidate = select_encoder(backend, request.encoder.as_deref())?;
        let source_rate = asset.frame_rate();
        let rate = target_frame_rate(source_rate, request.target_fps);
        let (format, hevc_profile) = encoder_format(&candidate, asset, request.ten_bit);
        let (width, height) = target_dimensions(asset.width, asset.height, request.target_height);
        let target = FrameLayout::new(format, width, height);
        let config = EncoderConfig {
            layout: target,
            frame_rate: rate,
            time_base: rate.frame_timebase(),
            profile: hevc_profile,
            color: ColorTags::SDR_BT709,
            knobs: request.knobs.for_capability(&candidate.capability),
        };
        let encoder = backend
            .open_encoder(&candidate, &config)
            .map_err(|e| TranscodeError::EncoderInit(e.to_string()))?;
        let encoder = Scoped::new(encoder);
        let encoder_time_base = encoder.time_base();

        let stream = OutputStream {
            codec: CodecId::Hevc,
            layout: target,
            frame_rate: rate,
            encoder_time_base,
            color: ColorTags::SDR_BT709,
        };
        let stream_time_base = muxer
            .write_header(&stream)
            .map_err(|e| TranscodeError::HeaderWrite(e.to_string()))?;
        self.transition(RunState::HeaderWritten);
        info!(
            "Encoding {}x{} {} at {} fps to {}",
            width,
            height,
            format.ffmpeg_name(),
            rate,
            request.output.display()
        );

        let mut stages: Stages<B> = Stages {
            scaler: None,
            chain: None,
            encoder,
            muxer,
            target,
            kernel: request.scale_kernel,
            encoder_time_base,
            stream_time_base,
            next_pts: 0,
            summary: TranscodeSummary::new(),
        };

        if request.start > 0.0 || self.source_dirty {
            self.transition(RunState::Seeking);
            let ts = asset.time_base.from_seconds(request.start.max(0.0));
            self.source.seek(ts)?;
            self.decoder.flush();
        }

        self.transition(RunState::Decoding);
        let window = window_duration(request.start, request.end, asset.duration);
        let mut reporter = ProgressReporter::new(progress, request.start, window);
        let mut decimator = Decimator::new(source_rate.to_fps_f64(), rate.to_fps_f64());
        let frame_duration = asset.frame_duration();
        let mut last_pts: Option<i64> = None;

        'read: loop {
            let end_of_file = match self.source.read() {
                Ok(Some(SourceUnit::Video(packet))) => {
                    if let Err(e) = self.decoder.send(Some(packet)) {
                        warn!("Skipping unit: {}", e);
                        continue;
                    }
                    false
                }
                Ok(Some(SourceUnit::Other { .. })) => continue,
                Ok(None) => {
                    self.decoder.send(None)?;
                    true
                }
                Err(e @ StageError::MidStreamDecode(_)) => {
                    warn!("Skipping unit: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            loop {
                let mut frame = match self.decoder.receive() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e @ StageError::MidStreamDecode(_)) => {
                        warn!("Skipping frame: {}", e);
                        break;
                    }
                    Err(e) => return Err(e.into()),
                };
                stages.summary.frames_decoded += 1;

                let pts = frame
                    .pts
                    .or_else(|| last_pts.map(|p| p + frame_duration))
                    .unwrap_or(0);
                frame.pts = Some(pts);
                last_pts = Some(pts);

                let t = frame.time_base.seconds(pts);
                match Self::admit(t, request, &mut decimator) {
                    Admit::Skip => {
                        stages.summary.frames_skipped += 1;
                        continue;
                    }
                    Admit::Stop => {
                        stages.summary.frames_skipped += 1;
                        break 'read;
                    }
                    Admit::Keep => {}
                }

                if stages.summary.plan.is_none() {
                    stages.plan(backend, &frame, request);
                }
                stages.process(frame)?;
                reporter.report(t);
            }

            if end_of_file {
                break;
            }
        }

        self.transition(RunState::FlushPipeline);
        stages.flush_chain()?;
        self.transition(RunState::FlushEncoder);
        stages.flush_encoder()?;

        stages
            .muxer
            .write_trailer()
            .map_err(|e| TranscodeError::TrailerWrite(e.to_string()))?;
        self.transition(RunState::TrailerWritten);

        let mut summary = stages.summary.clone();
        drop(stages);
        self.transition(RunState::Closed);
        summary.state = self.state;
        info!(
            "Wrote {} frames ({} units) to {}",
            summary.frames_encoded,
            summary.units_written,
            request.output.display()
        );
        Ok(summary)
    }

    /// Trim window and decimation for a frame at `t` seconds.
    fn admit(t: f64, request: &TranscodeRequest, decimator: &mut Decimator) -> Admit {
        if t < request.start {
            Admit::Skip
        } else if request.end > 0.0 && t > request.end {
            Admit::Stop
        } else if decimator.keep() {
            Admit::Keep
        } else {
            Admit::Skip
        }
    }
}

enum Admit {
    Keep,
    Skip,
    Stop,
}
