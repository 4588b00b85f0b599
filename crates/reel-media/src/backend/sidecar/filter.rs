//! Filter process: runs a `PipelinePlan` as an ffmpeg filter graph.

use super::pipe::{Chunking, Sidecar};
use crate::backend::FilterChain;
use crate::error::StageError;
use crate::scope::Release;
use reel_color::{DitherMode, PipelinePlan};
use reel_core::{
    ColorPrimaries, ColorRange, ColorTags, DecodedFrame, FrameBuffer, FrameLayout, FrameRate,
    MatrixCoefficients, PictureType, Timebase, TransferCharacteristic,
};
use std::collections::VecDeque;

fn zscale_transfer(t: TransferCharacteristic) -> &'static str {
    match t {
        TransferCharacteristic::Smpte2084 => "smpte2084",
        TransferCharacteristic::AribStdB67 => "arib-std-b67",
        TransferCharacteristic::Linear => "linear",
        TransferCharacteristic::Srgb => "iec61966-2-1",
        TransferCharacteristic::Bt709 | TransferCharacteristic::Unspecified => "709",
    }
}

fn zscale_primaries(p: ColorPrimaries) -> &'static str {
    match p {
        ColorPrimaries::Bt2020 => "2020",
        ColorPrimaries::DisplayP3 => "smpte432",
        ColorPrimaries::Bt601 => "170m",
        ColorPrimaries::Bt709 | ColorPrimaries::Unspecified => "709",
    }
}

fn zscale_matrix(m: MatrixCoefficients) -> &'static str {
    match m {
        MatrixCoefficients::Bt2020Ncl => "2020_ncl",
        MatrixCoefficients::Bt601 => "170m",
        MatrixCoefficients::Bt709 | MatrixCoefficients::Unspecified => "709",
    }
}

fn zscale_range(r: ColorRange) -> &'static str {
    if r.is_full() {
        "full"
    } else {
        "limited"
    }
}

/// Input tags for the first `zscale`; raw frames carry none of their own.
fn input_tags(tags: &ColorTags) -> String {
    format!(
        "tin={}:pin={}:min={}:rin={}",
        zscale_transfer(tags.transfer),
        zscale_primaries(tags.primaries),
        zscale_matrix(tags.matrix),
        zscale_range(tags.range)
    )
}

fn size(source: &FrameLayout, target: &FrameLayout, filter: &str) -> String {
    if source.same_size(target) {
        String::new()
    } else {
        format!(":w={}:h={}:f={}", target.width, target.height, filter)
    }
}

/// Filter graph text for a plan; `None` for passthrough.
pub fn filter_expression(plan: &PipelinePlan) -> Option<String> {
    match plan {
        PipelinePlan::Passthrough { .. } => None,
        PipelinePlan::ToneMap(p) => Some(format!(
            "zscale={}:t=linear:npl={},format=gbrpf32le,zscale=p=709,\
             tonemap=tonemap={}:desat=0,zscale=t=709:m=709:r=limited{},format={}",
            input_tags(&p.source.tags),
            p.nominal_peak_nits,
            p.operator.ffmpeg_name(),
            size(&p.source.layout, &p.target, p.kernel.zscale_name()),
            p.target.format.ffmpeg_name()
        )),
        PipelinePlan::ScaleAndConvert(p) => Some(format!(
            "zscale={}:t=709:p=709:m=709:r=limited{}:d={},format={}",
            input_tags(&p.source.tags),
            size(&p.source.layout, &p.target, p.kernel.zscale_name()),
            match p.dither {
                DitherMode::ErrorDiffusion => "error_diffusion",
                DitherMode::None => "none",
            },
            p.target.format.ffmpeg_name()
        )),
    }
}

/// Timing of a frame while its pixels are inside the filter process.
#[derive(Debug, Clone, Copy)]
struct Pending {
    pts: Option<i64>,
    time_base: Timebase,
    key_frame: bool,
    picture_type: PictureType,
}

/// Filter process for one plan. Timing metadata stays in-process and is
/// re-attached in order, since `rawvideo` carries none.
pub struct SidecarChain {
    process: Sidecar,
    source: FrameLayout,
    target: FrameLayout,
    output_tags: ColorTags,
    pending: VecDeque<Pending>,
    eof: bool,
}

impl SidecarChain {
    pub(crate) fn spawn(plan: &PipelinePlan, rate: FrameRate) -> Result<Self, StageError> {
        let (source, tags) = match plan {
            PipelinePlan::ToneMap(p) => (p.source.layout, p.output_tags),
            PipelinePlan::ScaleAndConvert(p) => (p.source.layout, p.output_tags),
            PipelinePlan::Passthrough { .. } => {
                return Err(StageError::PipelineInit(
                    "passthrough needs no filter graph".into(),
                ))
            }
        };
        let graph = filter_expression(plan)
            .ok_or_else(|| StageError::PipelineInit("empty filter graph".into()))?;
        let target = plan.target();
        let args = chain_args(&source, &target, rate, &graph);
        let process = Sidecar::spawn(
            "filter",
            &args,
            Some(Chunking::Fixed(
                target.format.packed_size(target.width, target.height),
            )),
            None,
        )?;
        Ok(Self {
            process,
            source,
            target,
            output_tags: tags,
            pending: VecDeque::new(),
            eof: false,
        })
    }

    fn frame(&mut self, data: Vec<u8>) -> Result<Option<DecodedFrame>, StageError> {
        let Some(meta) = self.pending.pop_front() else {
            return Err(StageError::PipelineInit(
                "filter produced an unexpected frame".into(),
            ));
        };
        let buffer = FrameBuffer::from_packed(self.target, &data)
            .map_err(|e| StageError::PipelineInit(e.to_string()))?;
        let mut frame = DecodedFrame::new(buffer, meta.pts, meta.time_base);
        frame.key_frame = meta.key_frame;
        frame.picture_type = meta.picture_type;
        frame.color = self.output_tags;
        Ok(Some(frame))
    }
}

fn chain_args(
    source: &FrameLayout,
    target: &FrameLayout,
    rate: FrameRate,
    graph: &str,
) -> Vec<String> {
    vec![
        "-nostats".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        source.format.ffmpeg_name().into(),
        "-s".into(),
        format!("{}x{}", source.width, source.height),
        "-r".into(),
        format!("{}/{}", rate.numerator, rate.denominator),
        "-i".into(),
        "pipe:0".into(),
        "-vf".into(),
        graph.into(),
        "-fps_mode".into(),
        "passthrough".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        target.format.ffmpeg_name().into(),
        "pipe:1".into(),
    ]
}

impl FilterChain for SidecarChain {
    fn send(&mut self, frame: Option<DecodedFrame>) -> Result<(), StageError> {
        let Some(frame) = frame else {
            self.eof = true;
            self.process.close_input();
            return Ok(());
        };
        if frame.layout() != self.source {
            return Err(StageError::MidStreamFilter(format!(
                "filter expects {:?}, got {:?}",
                self.source,
                frame.layout()
            )));
        }
        let mut bytes = Vec::new();
        frame.buffer.write_packed(&mut bytes);
        self.process.write(&bytes)?;
        self.pending.push_back(Pending {
            pts: frame.pts,
            time_base: frame.time_base,
            key_frame: frame.key_frame,
            picture_type: frame.picture_type,
        });
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<DecodedFrame>, StageError> {
        let chunk = if self.eof {
            self.process.recv()
        } else {
            self.process.try_recv()
        };
        match chunk {
            Some(data) => self.frame(data),
            None if self.eof => {
                self.process.finish()?;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

impl Release for SidecarChain {
    fn kind(&self) -> &'static str {
        "chain"
    }

    fn release(&mut self) {
        self.process.kill();
        self.pending.clear();
    }
}
