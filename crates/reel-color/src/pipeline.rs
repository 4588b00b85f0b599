//! Color transform pipeline and the CPU executor for a `PipelinePlan`.

use crate::color_space::{mat3_mul, Gamut, YCbCrMatrix};
use crate::error::ColorError;
use crate::plan::{PipelinePlan, ScaleParams, SourceCharacteristics, ToneMapParams};
use crate::scale::{DitherMode, PlaneSet, Resampler};
use crate::tonemapping::ToneMapOperator;
use crate::transfer::TransferFunction;
use rayon::prelude::*;
use reel_core::{ColorTags, FrameBuffer, FrameLayout};

/// A single color operation in the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorOp {
    MatrixTransform([[f32; 3]; 3]),
    TransferToLinear(TransferFunction),
    TransferFromLinear(TransferFunction),
    /// Multiply linear light, used to express it relative to a nominal peak
    Gain(f32),
    ToneMap { operator: ToneMapOperator, peak: f32 },
}

/// An ordered chain of color operations on R'G'B' triplets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorPipeline {
    pub ops: Vec<ColorOp>,
}

impl ColorPipeline {
    /// HDR (or forced) source → SDR BT.709.
    pub fn tone_map(source: ColorTags, operator: ToneMapOperator, nominal_peak_nits: f32) -> Self {
        let transfer = TransferFunction::for_characteristic(source.transfer);
        let gain = transfer
            .reference_peak_nits()
            .map(|peak| peak / nominal_peak_nits)
            .unwrap_or(1.0);
        let gamut = Gamut::for_primaries(source.primaries);

        let mut ops = vec![ColorOp::TransferToLinear(transfer)];
        if gain != 1.0 {
            ops.push(ColorOp::Gain(gain));
        }
        if gamut != Gamut::Rec709 {
            ops.push(ColorOp::MatrixTransform(
                gamut.conversion_matrix(Gamut::Rec709),
            ));
        }
        ops.push(ColorOp::ToneMap {
            operator,
            peak: gain,
        });
        ops.push(ColorOp::TransferFromLinear(TransferFunction::Rec709));
        Self { ops }
    }

    /// SDR source → BT.709 primaries and transfer. Empty when the source is
    /// already BT.709.
    pub fn normalize_sdr(source: ColorTags) -> Self {
        let gamut = Gamut::for_primaries(source.primaries);
        if gamut == Gamut::Rec709 {
            return Self::default();
        }
        let transfer = TransferFunction::for_characteristic(source.transfer);
        Self {
            ops: vec![
                ColorOp::TransferToLinear(transfer),
                ColorOp::MatrixTransform(gamut.conversion_matrix(Gamut::Rec709)),
                ColorOp::TransferFromLinear(TransferFunction::Rec709),
            ],
        }
    }

    pub fn is_identity(&self) -> bool {
        self.ops.is_empty()
    }

    /// Process a single pixel through the pipeline.
    pub fn process_pixel(&self, mut rgb: [f32; 3]) -> [f32; 3] {
        for op in &self.ops {
            rgb = match op {
                ColorOp::MatrixTransform(m) => mat3_mul(m, rgb),
                ColorOp::TransferToLinear(tf) => [
                    tf.to_linear(rgb[0]),
                    tf.to_linear(rgb[1]),
                    tf.to_linear(rgb[2]),
                ],
                ColorOp::TransferFromLinear(tf) => [
                    tf.from_linear(rgb[0].max(0.0)),
                    tf.from_linear(rgb[1].max(0.0)),
                    tf.from_linear(rgb[2].max(0.0)),
                ],
                ColorOp::Gain(g) => [rgb[0] * g, rgb[1] * g, rgb[2] * g],
                ColorOp::ToneMap { operator, peak } => operator.apply(rgb, *peak),
            };
        }
        rgb
    }
}

/// Y'CbCr in, color chain, Y'CbCr out, one 2x2 block at a time.
#[derive(Debug, Clone)]
struct BlockConverter {
    input: YCbCrMatrix,
    output: YCbCrMatrix,
    colors: ColorPipeline,
}

impl BlockConverter {
    fn new(source: ColorTags, colors: ColorPipeline) -> Self {
        Self {
            input: YCbCrMatrix::new(source.matrix, source.range),
            output: YCbCrMatrix::bt709_limited(),
            colors,
        }
    }

    /// True when the conversion would not change any sample.
    fn is_noop(&self) -> bool {
        self.colors.is_identity() && self.input == self.output
    }

    fn convert(&self, src: &PlaneSet) -> PlaneSet {
        let mut out = src.clone();
        let w = src.luma.width as usize;
        let cw = src.cb.width as usize;
        if w == 0 || cw == 0 {
            return out;
        }

        out.luma
            .data
            .par_chunks_mut(2 * w)
            .zip(out.cb.data.par_chunks_mut(cw))
            .zip(out.cr.data.par_chunks_mut(cw))
            .enumerate()
            .for_each(|(cy, ((luma_rows, cb_row), cr_row))| {
                let rows = luma_rows.len() / w;
                for cx in 0..cw {
                    let cb = src.cb.data[cy * cw + cx];
                    let cr = src.cr.data[cy * cw + cx];
                    let mut sum = [0.0f32; 2];
                    let mut count = 0.0f32;
                    for dy in 0..rows {
                        for dx in 0..2 {
                            let x = cx * 2 + dx;
                            if x >= w {
                                continue;
                            }
                            let y = src.luma.data[(cy * 2 + dy) * w + x];
                            let rgb = self.input.to_rgb(y, cb, cr);
                            let yuv = self.output.from_rgb(self.colors.process_pixel(rgb));
                            luma_rows[dy * w + x] = yuv[0];
                            sum[0] += yuv[1];
                            sum[1] += yuv[2];
                            count += 1.0;
                        }
                    }
                    if count > 0.0 {
                        cb_row[cx] = sum[0] / count;
                        cr_row[cx] = sum[1] / count;
                    }
                }
            });
        out
    }
}

/// Executes a `PipelinePlan` on CPU frames.
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    source: Option<FrameLayout>,
    target: FrameLayout,
    converter: Option<BlockConverter>,
    resampler: Option<Resampler>,
    dither: DitherMode,
}

impl PlanExecutor {
    /// Prepare colour tables and resampling weights for `plan`.
    pub fn new(plan: &PipelinePlan) -> Result<Self, ColorError> {
        match plan {
            PipelinePlan::Passthrough { target } => Ok(Self {
                source: None,
                target: *target,
                converter: None,
                resampler: None,
                dither: DitherMode::None,
            }),
            PipelinePlan::ToneMap(ToneMapParams {
                source,
                operator,
                nominal_peak_nits,
                kernel,
                target,
                ..
            }) => {
                let colors = ColorPipeline::tone_map(source.tags, *operator, *nominal_peak_nits);
                Self::build(*source, *target, Some(colors), *kernel, DitherMode::None)
            }
            PipelinePlan::ScaleAndConvert(ScaleParams {
                source,
                kernel,
                dither,
                target,
                ..
            }) => {
                let colors = ColorPipeline::normalize_sdr(source.tags);
                Self::build(*source, *target, Some(colors), *kernel, *dither)
            }
        }
    }

    fn build(
        source: SourceCharacteristics,
        target: FrameLayout,
        colors: Option<ColorPipeline>,
        kernel: crate::scale::ScaleKernel,
        dither: DitherMode,
    ) -> Result<Self, ColorError> {
        let converter = colors
            .map(|c| BlockConverter::new(source.tags, c))
            .filter(|c| !c.is_noop());
        let resampler = if source.layout.same_size(&target) {
            None
        } else {
            Some(Resampler::new(
                (source.layout.width, source.layout.height),
                (target.width, target.height),
                kernel,
            )?)
        };
        Ok(Self {
            source: Some(source.layout),
            target,
            converter,
            resampler,
            dither,
        })
    }

    pub fn target(&self) -> FrameLayout {
        self.target
    }

    /// Run one frame through the plan.
    pub fn process(&self, frame: &FrameBuffer) -> Result<FrameBuffer, ColorError> {
        let expected = self.source.unwrap_or(self.target);
        if frame.layout() != expected {
            return Err(ColorError::LayoutMismatch {
                expected,
                got: frame.layout(),
            });
        }
        if self.source.is_none() || (self.converter.is_none() && expected == self.target) {
            return Ok(frame.clone());
        }

        let mut planes = PlaneSet::from_frame(frame);
        if let Some(converter) = &self.converter {
            planes = converter.convert(&planes);
        }
        if let Some(resampler) = &self.resampler {
            planes = resampler.resample(&planes);
        }
        Ok(planes.to_frame(self.target.format, self.dither))
    }
}
