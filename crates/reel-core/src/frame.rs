//! Frame buffer types for video frames in CPU memory.
//!
//! Planes are stored with 64-byte aligned strides. The packed form used on
//! pipes (`rawvideo`) has no padding and rounds chroma dimensions up.

use crate::color::ColorTags;
use crate::error::{ReelError, Result};
use crate::time::Timebase;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Pixel format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// YUV 4:2:0 planar, 8-bit
    #[default]
    Yuv420P,
    /// YUV 4:2:0 planar, 10-bit little-endian in 16-bit words
    Yuv420P10,
    /// NV12: Y plane + interleaved UV plane (hardware encoder native)
    Nv12,
}

impl PixelFormat {
    /// Significant bits per sample.
    #[inline]
    pub fn bit_depth(self) -> u32 {
        match self {
            Self::Yuv420P | Self::Nv12 => 8,
            Self::Yuv420P10 => 10,
        }
    }

    /// Storage bytes per sample.
    #[inline]
    pub fn bytes_per_sample(self) -> usize {
        if self.bit_depth() > 8 {
            2
        } else {
            1
        }
    }

    /// Largest code value of a sample.
    #[inline]
    pub fn max_value(self) -> u32 {
        (1 << self.bit_depth()) - 1
    }

    /// Number of planes for this format.
    pub fn plane_count(self) -> usize {
        match self {
            Self::Nv12 => 2,
            Self::Yuv420P | Self::Yuv420P10 => 3,
        }
    }

    /// Chroma plane dimensions for a frame of `width` x `height`.
    #[inline]
    pub fn chroma_size(self, width: u32, height: u32) -> (u32, u32) {
        (width.div_ceil(2), height.div_ceil(2))
    }

    /// Size of one unpadded frame as carried on a `rawvideo` pipe.
    pub fn packed_size(self, width: u32, height: u32) -> usize {
        let bps = self.bytes_per_sample();
        let (cw, ch) = self.chroma_size(width, height);
        let luma = width as usize * height as usize * bps;
        let chroma = cw as usize * ch as usize * bps;
        luma + 2 * chroma
    }

    /// ffmpeg `pix_fmt` identifier.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Yuv420P => "yuv420p",
            Self::Yuv420P10 => "yuv420p10le",
            Self::Nv12 => "nv12",
        }
    }

    /// Parse an ffmpeg `pix_fmt` identifier.
    pub fn from_ffmpeg_name(name: &str) -> Option<Self> {
        match name {
            "yuv420p" | "yuvj420p" => Some(Self::Yuv420P),
            "yuv420p10le" | "yuv420p10" => Some(Self::Yuv420P10),
            "nv12" => Some(Self::Nv12),
            _ => None,
        }
    }
}

/// Format and dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameLayout {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

impl FrameLayout {
    /// Create a new layout.
    #[inline]
    pub const fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }

    /// True when only the pixel format differs from `other`.
    #[inline]
    pub fn same_size(&self, other: &FrameLayout) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// A plane of pixel data with stride information.
#[derive(Debug, Clone)]
pub struct FramePlane {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Bytes per row (may include padding)
    pub stride: usize,
    /// Width in pixels of this plane
    pub width: u32,
    /// Height in pixels of this plane
    pub height: u32,
    /// Bytes per pixel of this plane (2 for interleaved UV or 16-bit samples)
    pub bytes_per_pixel: usize,
}

impl FramePlane {
    /// Create a new zeroed frame plane with the given dimensions.
    pub fn new(width: u32, height: u32, bytes_per_pixel: usize) -> Self {
        // Align stride to 64 bytes for SIMD friendliness
        let min_stride = (width as usize) * bytes_per_pixel;
        let stride = (min_stride + 63) & !63;
        let data = vec![0u8; stride * height as usize];
        Self {
            data,
            stride,
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Bytes of payload per row, without padding.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let end = start + self.row_bytes();
        &mut self.data[start..end]
    }
}

/// A video frame in CPU memory.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Pixel format
    pub format: PixelFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel data planes (2-3 depending on format)
    pub planes: SmallVec<[FramePlane; 3]>,
}

impl FrameBuffer {
    /// Create a new zeroed frame buffer with the given dimensions and format.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let bps = format.bytes_per_sample();
        let (cw, ch) = format.chroma_size(width, height);
        let planes = match format {
            PixelFormat::Nv12 => smallvec::smallvec![
                FramePlane::new(width, height, 1), // Y
                FramePlane::new(cw, ch, 2),        // UV interleaved
            ],
            PixelFormat::Yuv420P | PixelFormat::Yuv420P10 => smallvec::smallvec![
                FramePlane::new(width, height, bps), // Y
                FramePlane::new(cw, ch, bps),        // U
                FramePlane::new(cw, ch, bps),        // V
            ],
        };

        Self {
            format,
            width,
            height,
            planes,
        }
    }

    /// Format and dimensions.
    #[inline]
    pub fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.format, self.width, self.height)
    }

    /// Total memory usage of this frame in bytes.
    pub fn memory_size(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }

    /// Build a frame from the unpadded bytes of a `rawvideo` pipe.
    pub fn from_packed(layout: FrameLayout, bytes: &[u8]) -> Result<Self> {
        let expected = layout.format.packed_size(layout.width, layout.height);
        if bytes.len() != expected {
            return Err(ReelError::FrameSize {
                expected,
                got: bytes.len(),
            });
        }
        let mut frame = Self::new(layout.width, layout.height, layout.format);
        let mut offset = 0;
        for plane in frame.planes.iter_mut() {
            let row_bytes = plane.row_bytes();
            for y in 0..plane.height {
                plane
                    .row_mut(y)
                    .copy_from_slice(&bytes[offset..offset + row_bytes]);
                offset += row_bytes;
            }
        }
        Ok(frame)
    }

    /// Append the unpadded `rawvideo` form of this frame to `out`.
    pub fn write_packed(&self, out: &mut Vec<u8>) {
        out.reserve(self.format.packed_size(self.width, self.height));
        for plane in &self.planes {
            for y in 0..plane.height {
                out.extend_from_slice(plane.row(y));
            }
        }
    }

    /// Create a test pattern frame: vertical luma bars shifted by `phase`,
    /// neutral chroma.
    pub fn test_pattern(layout: FrameLayout, phase: u32) -> Self {
        let mut frame = Self::new(layout.width, layout.height, layout.format);
        let max = layout.format.max_value();
        let bps = layout.format.bytes_per_sample();
        let width = layout.width.max(1);

        let luma = &mut frame.planes[0];
        for y in 0..luma.height {
            let row = luma.row_mut(y);
            for x in 0..layout.width {
                let bar = ((x * 8 / width) + phase) % 8;
                let value = (16 + bar * 219 / 7) * max / 255;
                write_sample(row, x as usize, bps, value as u16);
            }
        }

        let neutral = ((max + 1) / 2) as u16;
        for plane in frame.planes.iter_mut().skip(1) {
            let samples = plane.row_bytes() / bps;
            for y in 0..plane.height {
                let row = plane.row_mut(y);
                for i in 0..samples {
                    write_sample(row, i, bps, neutral);
                }
            }
        }
        frame
    }
}

#[inline]
fn write_sample(row: &mut [u8], index: usize, bytes_per_sample: usize, value: u16) {
    if bytes_per_sample == 2 {
        row[index * 2..index * 2 + 2].copy_from_slice(&value.to_le_bytes());
    } else {
        row[index] = value.min(255) as u8;
    }
}

/// Picture-type hint attached to a frame by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PictureType {
    #[default]
    None,
    I,
    P,
    B,
}

/// A decoded video frame with timing and color metadata.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Pixel planes
    pub buffer: FrameBuffer,
    /// Presentation timestamp in `time_base` ticks
    pub pts: Option<i64>,
    /// Timebase of `pts`
    pub time_base: Timebase,
    /// Whether the frame was coded as a key frame
    pub key_frame: bool,
    /// Picture-type hint; encoders may honor it, so it is cleared before encoding
    pub picture_type: PictureType,
    /// Color tags of the pixel data
    pub color: ColorTags,
}

impl DecodedFrame {
    /// Wrap a buffer with timing metadata.
    pub fn new(buffer: FrameBuffer, pts: Option<i64>, time_base: Timebase) -> Self {
        Self {
            buffer,
            pts,
            time_base,
            key_frame: false,
            picture_type: PictureType::None,
            color: ColorTags::default(),
        }
    }

    /// Format and dimensions.
    #[inline]
    pub fn layout(&self) -> FrameLayout {
        self.buffer.layout()
    }

    /// Presentation time in seconds.
    pub fn seconds(&self) -> Option<f64> {
        self.pts.map(|pts| self.time_base.seconds(pts))
    }

    /// Presentation time in nanoseconds.
    pub fn timestamp_ns(&self) -> Option<i64> {
        self.pts
            .map(|pts| self.time_base.rescale(pts, Timebase::NANOSECONDS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuv420p_planes() {
        let frame = FrameBuffer::new(1920, 1080, PixelFormat::Yuv420P);
        assert_eq!(frame.planes.len(), 3);
        assert_eq!(frame.planes[0].width, 1920);
        assert_eq!(frame.planes[1].width, 960);
        assert_eq!(frame.planes[2].width, 960);
    }

    #[test]
    fn test_odd_dimensions_round_chroma_up() {
        let frame = FrameBuffer::new(5, 3, PixelFormat::Nv12);
        assert_eq!(frame.planes[1].width, 3);
        assert_eq!(frame.planes[1].height, 2);
        assert_eq!(PixelFormat::Nv12.packed_size(5, 3), 15 + 12);
    }

    #[test]
    fn test_packed_roundtrip_keeps_payload() {
        let layout = FrameLayout::new(PixelFormat::Yuv420P10, 6, 4);
        let frame = FrameBuffer::test_pattern(layout, 3);
        let mut packed = Vec::new();
        frame.write_packed(&mut packed);
        assert_eq!(packed.len(), PixelFormat::Yuv420P10.packed_size(6, 4));

        let back = FrameBuffer::from_packed(layout, &packed).unwrap();
        for (a, b) in frame.planes.iter().zip(back.planes.iter()) {
            for y in 0..a.height {
                assert_eq!(a.row(y), b.row(y));
            }
        }
    }

    #[test]
    fn test_from_packed_rejects_short_input() {
        let layout = FrameLayout::new(PixelFormat::Yuv420P, 4, 4);
        let err = FrameBuffer::from_packed(layout, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, ReelError::FrameSize { expected: 24, got: 10 }));
    }

    #[test]
    fn test_timestamp_ns() {
        let frame = DecodedFrame::new(
            FrameBuffer::new(2, 2, PixelFormat::Yuv420P),
            Some(3),
            Timebase::new(1, 30),
        );
        assert_eq!(frame.timestamp_ns(), Some(100_000_000));
        assert!((frame.seconds().unwrap() - 0.1).abs() < 1e-9);
    }
}
