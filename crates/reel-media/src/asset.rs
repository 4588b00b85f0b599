//! Asset probing: open a source and describe its first video stream.

use crate::backend::Backend;
use crate::capability::CodecId;
use crate::error::OpenError;
use reel_core::{ColorTags, FrameLayout, FrameRate, PixelFormat, Timebase};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Metadata of the selected video stream and its container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub path: PathBuf,
    /// Container duration in seconds
    pub duration: f64,
    /// Index of the video stream inside the container
    pub stream_index: usize,
    pub width: u32,
    pub height: u32,
    pub codec: CodecId,
    /// Pixel format name as reported by the container
    pub pixel_format_name: String,
    /// Format decoded frames are delivered in
    pub pixel_format: PixelFormat,
    /// Significant bits per sample of the coded stream
    pub bit_depth: u32,
    pub color: ColorTags,
    pub time_base: Timebase,
    /// Lowest rate that represents all timestamps exactly (`r_frame_rate`)
    pub real_frame_rate: Option<FrameRate>,
    /// Average rate over the stream (`avg_frame_rate`)
    pub average_frame_rate: Option<FrameRate>,
}

impl AssetInfo {
    /// Best estimate of the display rate; 60 fps when nothing is known.
    pub fn frame_rate(&self) -> FrameRate {
        FrameRate::guess(self.real_frame_rate, self.average_frame_rate).unwrap_or_default()
    }

    /// Layout of decoded frames.
    pub fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.pixel_format, self.width, self.height)
    }

    /// Duration of one frame in stream ticks.
    pub fn frame_duration(&self) -> i64 {
        self.frame_rate().frame_duration_in(self.time_base)
    }

    /// True for sources coded with more than 8 bits per sample.
    pub fn is_high_bit_depth(&self) -> bool {
        self.bit_depth > 8
    }
}

/// An opened, probed asset. Immutable after open.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    info: AssetInfo,
}

impl MediaAsset {
    pub fn info(&self) -> &AssetInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    pub fn duration(&self) -> f64 {
        self.info.duration
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn codec(&self) -> &CodecId {
        &self.info.codec
    }

    pub fn codec_name(&self) -> &str {
        self.info.codec.name()
    }
}

/// Opens assets through a backend.
pub struct AssetProbe;

impl AssetProbe {
    /// Probe `path` and select its first video stream.
    pub fn open<B: Backend>(backend: &B, path: &Path) -> Result<MediaAsset, OpenError> {
        crate::init();
        let info = backend.probe(path)?;
        info!(
            "Opened {} [{}]: {}x{} {}, {:.3}s, {}",
            path.display(),
            backend.name(),
            info.width,
            info.height,
            info.codec,
            info.duration,
            info.frame_rate()
        );
        Ok(MediaAsset { info })
    }
}
