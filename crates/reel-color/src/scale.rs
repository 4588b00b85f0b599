//! CPU scaling and pixel-format conversion.
//!
//! Frames are unpacked into normalized float planes (`code / 2^depth`),
//! resampled with a separable kernel and quantized back into the target
//! format. Weight tables are computed once per `Scaler`, so a scaler is
//! built lazily on the first frame of a run and reused for the rest.

use crate::error::ColorError;
use rayon::prelude::*;
use reel_core::{FrameBuffer, FrameLayout, PixelFormat};
use serde::{Deserialize, Serialize};

/// Resampling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScaleKernel {
    /// Nearest neighbour; the fast path
    Point,
    Bilinear,
    /// Keys cubic, a = -0.6
    #[default]
    Bicubic,
    Spline36,
}

impl ScaleKernel {
    /// Kernel radius in source pixels at unity scale.
    pub fn support(self) -> f32 {
        match self {
            Self::Point => 0.5,
            Self::Bilinear => 1.0,
            Self::Bicubic => 2.0,
            Self::Spline36 => 3.0,
        }
    }

    /// Kernel weight at distance `x` (in source pixels).
    pub fn weight(self, x: f32) -> f32 {
        let x = x.abs();
        match self {
            Self::Point => {
                if x <= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Bilinear => (1.0 - x).max(0.0),
            Self::Bicubic => {
                let a = -0.6;
                if x < 1.0 {
                    ((a + 2.0) * x - (a + 3.0)) * x * x + 1.0
                } else if x < 2.0 {
                    ((a * x - 5.0 * a) * x + 8.0 * a) * x - 4.0 * a
                } else {
                    0.0
                }
            }
            Self::Spline36 => {
                if x < 1.0 {
                    ((13.0 / 11.0 * x - 453.0 / 209.0) * x - 3.0 / 209.0) * x + 1.0
                } else if x < 2.0 {
                    let t = x - 1.0;
                    ((-6.0 / 11.0 * t + 270.0 / 209.0) * t - 156.0 / 209.0) * t
                } else if x < 3.0 {
                    let t = x - 2.0;
                    ((1.0 / 11.0 * t - 45.0 / 209.0) * t + 26.0 / 209.0) * t
                } else {
                    0.0
                }
            }
        }
    }

    /// `zscale` filter name.
    pub fn zscale_name(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Bilinear => "bilinear",
            Self::Bicubic => "bicubic",
            Self::Spline36 => "spline36",
        }
    }

    /// libswscale flag name.
    pub fn sws_flags(self) -> &'static str {
        match self {
            Self::Point => "neighbor",
            Self::Bilinear => "bilinear",
            Self::Bicubic => "bicubic",
            Self::Spline36 => "spline",
        }
    }
}

/// Quantization behaviour when packing float samples into code values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DitherMode {
    #[default]
    None,
    /// Floyd–Steinberg error diffusion
    ErrorDiffusion,
}

/// One plane of normalized samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl SamplePlane {
    /// A plane filled with `value`.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, v: f32) {
        let w = self.width as usize;
        self.data[y as usize * w + x as usize] = v;
    }
}

/// Luma and both chroma planes of a 4:2:0 picture in normalized form.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneSet {
    pub luma: SamplePlane,
    pub cb: SamplePlane,
    pub cr: SamplePlane,
}

impl PlaneSet {
    /// Unpack a frame into normalized planes.
    pub fn from_frame(frame: &FrameBuffer) -> Self {
        let scale = 1.0 / (1u32 << frame.format.bit_depth()) as f32;
        let (cw, ch) = frame.format.chroma_size(frame.width, frame.height);
        let mut luma = SamplePlane::filled(frame.width, frame.height, 0.0);
        let mut cb = SamplePlane::filled(cw, ch, 0.5);
        let mut cr = SamplePlane::filled(cw, ch, 0.5);

        let bps = frame.format.bytes_per_sample();
        unpack_plane(&frame.planes[0], bps, 1, 0, scale, &mut luma);
        match frame.format {
            PixelFormat::Nv12 => {
                unpack_plane(&frame.planes[1], 1, 2, 0, scale, &mut cb);
                unpack_plane(&frame.planes[1], 1, 2, 1, scale, &mut cr);
            }
            PixelFormat::Yuv420P | PixelFormat::Yuv420P10 => {
                unpack_plane(&frame.planes[1], bps, 1, 0, scale, &mut cb);
                unpack_plane(&frame.planes[2], bps, 1, 0, scale, &mut cr);
            }
        }
        Self { luma, cb, cr }
    }

    /// Quantize into a frame of `format`.
    pub fn to_frame(&self, format: PixelFormat, dither: DitherMode) -> FrameBuffer {
        let mut frame = FrameBuffer::new(self.luma.width, self.luma.height, format);
        let levels = (1u32 << format.bit_depth()) as f32;
        let max = format.max_value() as f32;
        let bps = format.bytes_per_sample();

        let y = quantize(&self.luma, levels, max, dither);
        let u = quantize(&self.cb, levels, max, dither);
        let v = quantize(&self.cr, levels, max, dither);

        pack_plane(&mut frame.planes[0], &y, self.luma.width, bps, 1, 0);
        match format {
            PixelFormat::Nv12 => {
                pack_plane(&mut frame.planes[1], &u, self.cb.width, 1, 2, 0);
                pack_plane(&mut frame.planes[1], &v, self.cr.width, 1, 2, 1);
            }
            PixelFormat::Yuv420P | PixelFormat::Yuv420P10 => {
                pack_plane(&mut frame.planes[1], &u, self.cb.width, bps, 1, 0);
                pack_plane(&mut frame.planes[2], &v, self.cr.width, bps, 1, 0);
            }
        }
        frame
    }
}

fn unpack_plane(
    plane: &reel_core::FramePlane,
    bps: usize,
    step: usize,
    offset: usize,
    scale: f32,
    out: &mut SamplePlane,
) {
    let width = out.width as usize;
    out.data
        .par_chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row_out)| {
            let row = plane.row(y as u32);
            for (x, sample) in row_out.iter_mut().enumerate() {
                let i = x * step + offset;
                let code = if bps == 2 {
                    u16::from_le_bytes([row[i * 2], row[i * 2 + 1]]) as f32
                } else {
                    row[i] as f32
                };
                *sample = code * scale;
            }
        });
}

fn pack_plane(
    plane: &mut reel_core::FramePlane,
    codes: &[u16],
    width: u32,
    bps: usize,
    step: usize,
    offset: usize,
) {
    let width = width as usize;
    for y in 0..plane.height {
        let row = plane.row_mut(y);
        let src = &codes[y as usize * width..(y as usize + 1) * width];
        for (x, &code) in src.iter().enumerate() {
            let i = x * step + offset;
            if bps == 2 {
                row[i * 2..i * 2 + 2].copy_from_slice(&code.to_le_bytes());
            } else {
                row[i] = code.min(255) as u8;
            }
        }
    }
}

fn quantize(plane: &SamplePlane, levels: f32, max: f32, dither: DitherMode) -> Vec<u16> {
    match dither {
        DitherMode::None => plane
            .data
            .par_iter()
            .map(|&v| (v * levels).round().clamp(0.0, max) as u16)
            .collect(),
        DitherMode::ErrorDiffusion => floyd_steinberg(plane, levels, max),
    }
}

/// Serpentine-free Floyd–Steinberg: 7/16 right, 3/16 down-left,
/// 5/16 down, 1/16 down-right.
fn floyd_steinberg(plane: &SamplePlane, levels: f32, max: f32) -> Vec<u16> {
    let w = plane.width as usize;
    let h = plane.height as usize;
    let mut out = Vec::with_capacity(w * h);
    let mut cur = vec![0.0f32; w + 2];
    let mut next = vec![0.0f32; w + 2];

    for y in 0..h {
        for x in 0..w {
            let wanted = plane.data[y * w + x] * levels + cur[x + 1];
            let code = wanted.round().clamp(0.0, max);
            let err = wanted - code;
            out.push(code as u16);

            cur[x + 2] += err * 7.0 / 16.0;
            next[x] += err * 3.0 / 16.0;
            next[x + 1] += err * 5.0 / 16.0;
            next[x + 2] += err / 16.0;
        }
        std::mem::swap(&mut cur, &mut next);
        next.iter_mut().for_each(|e| *e = 0.0);
    }
    out
}

/// Precomputed filter taps for one axis.
#[derive(Debug, Clone)]
struct WeightTable {
    starts: Vec<usize>,
    weights: Vec<Vec<f32>>,
}

impl WeightTable {
    fn new(src: u32, dst: u32, kernel: ScaleKernel) -> Self {
        let ratio = src as f32 / dst as f32;
        let src_max = src as i64 - 1;
        let mut starts = Vec::with_capacity(dst as usize);
        let mut weights = Vec::with_capacity(dst as usize);

        if kernel == ScaleKernel::Point {
            for i in 0..dst {
                let nearest = (((i as f32 + 0.5) * ratio) as i64).clamp(0, src_max);
                starts.push(nearest as usize);
                weights.push(vec![1.0]);
            }
            return Self { starts, weights };
        }

        // Widen the kernel when shrinking so every source pixel contributes.
        let filter_scale = ratio.max(1.0);
        let support = kernel.support() * filter_scale;
        for i in 0..dst {
            let center = (i as f32 + 0.5) * ratio - 0.5;
            let first = (center - support).ceil() as i64;
            let last = (center + support).floor() as i64;
            let lo = first.clamp(0, src_max);
            let hi = last.clamp(0, src_max);

            let mut taps = vec![0.0f32; (hi - lo + 1) as usize];
            for j in first..=last {
                let w = kernel.weight((j as f32 - center) / filter_scale);
                let idx = (j.clamp(0, src_max) - lo) as usize;
                taps[idx] += w;
            }
            let sum: f32 = taps.iter().sum();
            if sum.abs() > 1e-6 {
                taps.iter_mut().for_each(|t| *t /= sum);
            }
            starts.push(lo as usize);
            weights.push(taps);
        }
        Self { starts, weights }
    }

    #[inline]
    fn apply(&self, i: usize, line: impl Fn(usize) -> f32) -> f32 {
        let start = self.starts[i];
        self.weights[i]
            .iter()
            .enumerate()
            .map(|(k, w)| w * line(start + k))
            .sum()
    }
}

/// Separable resampler for one plane geometry.
#[derive(Debug, Clone)]
struct PlaneResampler {
    dst_width: u32,
    dst_height: u32,
    horizontal: WeightTable,
    vertical: WeightTable,
}

impl PlaneResampler {
    fn new(src: (u32, u32), dst: (u32, u32), kernel: ScaleKernel) -> Self {
        Self {
            dst_width: dst.0,
            dst_height: dst.1,
            horizontal: WeightTable::new(src.0, dst.0, kernel),
            vertical: WeightTable::new(src.1, dst.1, kernel),
        }
    }

    fn resample(&self, plane: &SamplePlane) -> SamplePlane {
        let sw = plane.width as usize;
        let dw = self.dst_width as usize;
        let dh = self.dst_height as usize;

        let mut tmp = vec![0.0f32; dw * plane.height as usize];
        tmp.par_chunks_mut(dw).enumerate().for_each(|(y, row)| {
            let src = &plane.data[y * sw..(y + 1) * sw];
            for (x, out) in row.iter_mut().enumerate() {
                *out = self.horizontal.apply(x, |i| src[i]);
            }
        });

        let mut data = vec![0.0f32; dw * dh];
        data.par_chunks_mut(dw).enumerate().for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                *out = self.vertical.apply(y, |i| tmp[i * dw + x]);
            }
        });

        SamplePlane {
            width: self.dst_width,
            height: self.dst_height,
            data,
        }
    }
}

/// Resizes all three planes of a `PlaneSet`.
#[derive(Debug, Clone)]
pub struct Resampler {
    luma: PlaneResampler,
    chroma: PlaneResampler,
}

impl Resampler {
    /// Build weight tables for `src` → `dst` dimensions.
    pub fn new(src: (u32, u32), dst: (u32, u32), kernel: ScaleKernel) -> Result<Self, ColorError> {
        for (width, height) in [src, dst] {
            if width == 0 || height == 0 {
                return Err(ColorError::InvalidDimensions { width, height });
            }
        }
        let half = |(w, h): (u32, u32)| (w.div_ceil(2), h.div_ceil(2));
        Ok(Self {
            luma: PlaneResampler::new(src, dst, kernel),
            chroma: PlaneResampler::new(half(src), half(dst), kernel),
        })
    }

    pub fn resample(&self, planes: &PlaneSet) -> PlaneSet {
        PlaneSet {
            luma: self.luma.resample(&planes.luma),
            cb: self.chroma.resample(&planes.cb),
            cr: self.chroma.resample(&planes.cr),
        }
    }
}

/// Reusable frame scaler: resize plus pixel-format conversion.
#[derive(Debug, Clone)]
pub struct Scaler {
    src: FrameLayout,
    dst: FrameLayout,
    resampler: Option<Resampler>,
    dither: DitherMode,
}

impl Scaler {
    /// Create a scaler for frames of layout `src`.
    pub fn new(src: FrameLayout, dst: FrameLayout, kernel: ScaleKernel) -> Result<Self, ColorError> {
        let resampler = if src.same_size(&dst) {
            None
        } else {
            Some(Resampler::new(
                (src.width, src.height),
                (dst.width, dst.height),
                kernel,
            )?)
        };
        Ok(Self {
            src,
            dst,
            resampler,
            dither: DitherMode::None,
        })
    }

    /// Use `dither` when quantizing.
    pub fn with_dither(mut self, dither: DitherMode) -> Self {
        self.dither = dither;
        self
    }

    pub fn source_layout(&self) -> FrameLayout {
        self.src
    }

    pub fn target_layout(&self) -> FrameLayout {
        self.dst
    }

    /// Scale one frame. The frame must match the layout the scaler was
    /// built for.
    pub fn scale(&self, frame: &FrameBuffer) -> Result<FrameBuffer, ColorError> {
        if frame.layout() != self.src {
            return Err(ColorError::LayoutMismatch {
                expected: self.src,
                got: frame.layout(),
            });
        }
        if self.src == self.dst {
            return Ok(frame.clone());
        }
        let planes = PlaneSet::from_frame(frame);
        let planes = match &self.resampler {
            Some(r) => r.resample(&planes),
            None => planes,
        };
        Ok(planes.to_frame(self.dst.format, self.dither))
    }
}
