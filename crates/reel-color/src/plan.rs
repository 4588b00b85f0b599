//! Per-run color/scale pipeline decision.
//!
//! The plan is a tagged value. Backends translate it privately: the sidecar
//! backend into a `zscale`/`tonemap` filter graph, the in-memory backend
//! into a `PlanExecutor`.

use crate::scale::{DitherMode, ScaleKernel};
use crate::tonemapping::ToneMapOperator;
use reel_core::{ColorTags, FrameLayout};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Nominal peak luminance linear light is normalized against when
/// tone mapping.
pub const NOMINAL_PEAK_NITS: f32 = 100.0;

/// What the planner knows about the decoded frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCharacteristics {
    pub layout: FrameLayout,
    pub tags: ColorTags,
}

/// Caller choices that influence the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanFlags {
    /// Tone-map even when the source is not tagged HDR.
    pub tonemap: bool,
}

/// HDR → SDR conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneMapParams {
    pub source: SourceCharacteristics,
    pub operator: ToneMapOperator,
    pub nominal_peak_nits: f32,
    pub kernel: ScaleKernel,
    pub target: FrameLayout,
    pub output_tags: ColorTags,
}

impl ToneMapParams {
    /// True when the tone-mapped picture also changes size.
    pub fn resizes(&self) -> bool {
        !self.source.layout.same_size(&self.target)
    }
}

/// Resize and/or format conversion with BT.709 normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    pub source: SourceCharacteristics,
    pub kernel: ScaleKernel,
    pub dither: DitherMode,
    pub target: FrameLayout,
    pub output_tags: ColorTags,
}

impl ScaleParams {
    pub fn resizes(&self) -> bool {
        !self.source.layout.same_size(&self.target)
    }
}

/// The color/scale work applied to every kept frame of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PipelinePlan {
    Passthrough { target: FrameLayout },
    ToneMap(ToneMapParams),
    ScaleAndConvert(ScaleParams),
}

impl PipelinePlan {
    /// Layout of the frames the plan produces.
    pub fn target(&self) -> FrameLayout {
        match self {
            Self::Passthrough { target } => *target,
            Self::ToneMap(p) => p.target,
            Self::ScaleAndConvert(p) => p.target,
        }
    }

    /// Color tags of the produced frames, when the plan sets them.
    pub fn output_tags(&self) -> Option<ColorTags> {
        match self {
            Self::Passthrough { .. } => None,
            Self::ToneMap(p) => Some(p.output_tags),
            Self::ScaleAndConvert(p) => Some(p.output_tags),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Passthrough { .. } => "passthrough",
            Self::ToneMap(_) => "tonemap",
            Self::ScaleAndConvert(_) => "scale-and-convert",
        }
    }
}

/// Chooses the plan for a run.
pub struct ColorPipelinePlanner;

impl ColorPipelinePlanner {
    /// Decide between tone mapping, scale-and-convert and passthrough.
    ///
    /// HDR sources (PQ or HLG) and explicit requests tone-map; otherwise any
    /// difference in size or format scales; identical layouts pass through.
    pub fn decide(
        source: SourceCharacteristics,
        target: FrameLayout,
        flags: PlanFlags,
    ) -> PipelinePlan {
        let plan = if source.tags.is_hdr() || flags.tonemap {
            PipelinePlan::ToneMap(ToneMapParams {
                source,
                operator: ToneMapOperator::Hable,
                nominal_peak_nits: NOMINAL_PEAK_NITS,
                kernel: ScaleKernel::Spline36,
                target,
                output_tags: ColorTags::SDR_BT709,
            })
        } else if source.layout != target {
            let dither = if target.format.bit_depth() > source.layout.format.bit_depth() {
                DitherMode::ErrorDiffusion
            } else {
                DitherMode::None
            };
            PipelinePlan::ScaleAndConvert(ScaleParams {
                source,
                kernel: ScaleKernel::Spline36,
                dither,
                target,
                output_tags: ColorTags::SDR_BT709,
            })
        } else {
            PipelinePlan::Passthrough { target }
        };

        info!(
            plan = plan.name(),
            source = ?source.layout,
            target = ?target,
            "Color pipeline decided"
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_core::{PixelFormat, TransferCharacteristic};

    fn source(format: PixelFormat, w: u32, h: u32, tags: ColorTags) -> SourceCharacteristics {
        SourceCharacteristics {
            layout: FrameLayout::new(format, w, h),
            tags,
        }
    }

    #[test]
    fn test_pq_source_tonemaps() {
        let src = source(PixelFormat::Yuv420P10, 3840, 2160, ColorTags::HDR10);
        let target = FrameLayout::new(PixelFormat::Yuv420P10, 3840, 2160);
        let plan = ColorPipelinePlanner::decide(src, target, PlanFlags::default());
        match plan {
            PipelinePlan::ToneMap(p) => {
                assert_eq!(p.operator, ToneMapOperator::Hable);
                assert_eq!(p.nominal_peak_nits, 100.0);
                assert_eq!(p.output_tags, ColorTags::SDR_BT709);
                assert!(!p.resizes());
            }
            other => panic!("expected tonemap, got {:?}", other),
        }
    }

    #[test]
    fn test_hlg_source_tonemaps() {
        let tags = ColorTags {
            transfer: TransferCharacteristic::AribStdB67,
            ..ColorTags::HDR10
        };
        let src = source(PixelFormat::Yuv420P10, 1920, 1080, tags);
        let target = FrameLayout::new(PixelFormat::Yuv420P10, 1280, 720);
        let plan = ColorPipelinePlanner::decide(src, target, PlanFlags::default());
        assert!(matches!(plan, PipelinePlan::ToneMap(p) if p.resizes()));
    }

    #[test]
    fn test_forced_tonemap_on_sdr() {
        let src = source(PixelFormat::Yuv420P, 64, 64, ColorTags::SDR_BT709);
        let target = src.layout;
        let plan = ColorPipelinePlanner::decide(src, target, PlanFlags { tonemap: true });
        assert_eq!(plan.name(), "tonemap");
    }

    #[test]
    fn test_format_change_scales_with_dither() {
        let src = source(PixelFormat::Yuv420P, 1920, 1080, ColorTags::SDR_BT709);
        let target = FrameLayout::new(PixelFormat::Yuv420P10, 1920, 1080);
        let plan = ColorPipelinePlanner::decide(src, target, PlanFlags::default());
        match plan {
            PipelinePlan::ScaleAndConvert(p) => {
                assert_eq!(p.kernel, ScaleKernel::Spline36);
                assert_eq!(p.dither, DitherMode::ErrorDiffusion);
                assert!(!p.resizes());
            }
            other => panic!("expected scale-and-convert, got {:?}", other),
        }
    }

    #[test]
    fn test_downscale_without_depth_change_does_not_dither() {
        let src = source(PixelFormat::Yuv420P, 1920, 1080, ColorTags::default());
        let target = FrameLayout::new(PixelFormat::Yuv420P, 1280, 720);
        let plan = ColorPipelinePlanner::decide(src, target, PlanFlags::default());
        assert!(matches!(
            plan,
            PipelinePlan::ScaleAndConvert(ScaleParams {
                dither: DitherMode::None,
                ..
            })
        ));
        assert_eq!(plan.output_tags(), Some(ColorTags::SDR_BT709));
    }

    #[test]
    fn test_identical_layout_passes_through() {
        let src = source(PixelFormat::Yuv420P, 1280, 720, ColorTags::SDR_BT709);
        let plan = ColorPipelinePlanner::decide(src, src.layout, PlanFlags::default());
        assert_eq!(plan, PipelinePlan::Passthrough { target: src.layout });
        assert!(plan.output_tags().is_none());
    }
}
