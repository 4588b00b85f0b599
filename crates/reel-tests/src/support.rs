//! Shared fixtures.

use reel_core::{ColorTags, FrameLayout, FrameRate, PixelFormat};
use reel_media::backend::memory::SyntheticAsset;
use reel_media::{CodecId, MediaHandle, MemoryBackend};
use std::path::PathBuf;
use tempfile::TempDir;

pub const SOURCE: &str = "source.mov";

/// Small 8-bit SDR clip.
pub fn sdr_clip(rate: FrameRate, seconds: f64) -> SyntheticAsset {
    SyntheticAsset::new(
        CodecId::H264,
        FrameLayout::new(PixelFormat::Yuv420P, 32, 18),
        rate,
        seconds,
    )
}

/// Small 10-bit PQ clip.
pub fn hdr_clip(seconds: f64) -> SyntheticAsset {
    SyntheticAsset::new(
        CodecId::Hevc,
        FrameLayout::new(PixelFormat::Yuv420P10, 32, 18),
        FrameRate::FPS_30,
        seconds,
    )
    .with_color(ColorTags::HDR10)
}

pub fn open(backend: &MemoryBackend) -> MediaHandle<MemoryBackend> {
    MediaHandle::open_with(backend.clone(), SOURCE).expect("synthetic asset opens")
}

/// Scratch directory for output files.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
