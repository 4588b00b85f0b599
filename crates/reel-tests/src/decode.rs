//! Frame pulling through the shared decoder and decoder negotiation.

use crate::support::{open, sdr_clip, Scratch, SOURCE};
use reel_core::{FrameLayout, FrameRate, PictureType, PixelFormat};
use reel_media::backend::memory::SyntheticAsset;
use reel_media::{Capability, CodecId, MemoryBackend, TranscodeError};

fn clip(codec: CodecId) -> SyntheticAsset {
    SyntheticAsset::new(
        codec,
        FrameLayout::new(PixelFormat::Yuv420P, 16, 8),
        FrameRate::FPS_30,
        0.5,
    )
}

#[test]
fn decode_next_drains_delayed_frames() {
    let backend = MemoryBackend::new()
        .with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 1.0))
        .with_decoder_delay(3);
    let mut handle = open(&backend);

    let mut frames = Vec::new();
    while let Some(frame) = handle.decode_next() {
        frames.push(frame);
    }
    assert_eq!(frames.len(), 30);
    assert_eq!(frames[0].picture_type, PictureType::I);
    assert!(frames[0].key_frame);
    assert!(frames.windows(2).all(|w| w[1].pts > w[0].pts));
    // Stays at end of stream.
    assert!(handle.decode_next().is_none());
}

#[test]
fn decode_next_skips_corrupt_units() {
    let clip = sdr_clip(FrameRate::FPS_30, 1.0).with_corrupt_frames([1]);
    let backend = MemoryBackend::new().with_asset(SOURCE, clip);
    let mut handle = open(&backend);

    let count = std::iter::from_fn(|| handle.decode_next()).count();
    assert_eq!(count, 29);
}

#[test]
fn export_after_decoding_rewinds_the_source() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 2.0));
    let mut handle = open(&backend);

    for _ in 0..40 {
        assert!(handle.decode_next().is_some());
    }
    let summary = handle
        .export(scratch.path("rewind.mov"), 0.0, 1.0, None)
        .unwrap();
    assert_eq!(summary.frames_encoded, 31);
}

#[test]
fn repeated_exports_cover_the_same_window() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 2.0));
    let mut handle = open(&backend);

    let first = handle
        .export(scratch.path("a.mov"), 0.0, 1.0, None)
        .unwrap();
    let second = handle
        .export(scratch.path("b.mov"), 0.0, 1.0, None)
        .unwrap();
    assert_eq!(first.frames_encoded, 31);
    assert_eq!(second.frames_encoded, first.frames_encoded);
}

// ── Negotiation through the handle ─────────────────────────────

fn chosen(backend: MemoryBackend) -> (String, Capability) {
    let mut handle = open(&backend);
    assert!(handle.decode_next().is_some());
    let choice = handle.decoder_choice().cloned().unwrap();
    (choice.candidate.name, choice.candidate.capability)
}

#[test]
fn av1_uses_precise_software_decoder() {
    let backend = MemoryBackend::new()
        .with_hardware()
        .with_asset(SOURCE, clip(CodecId::Av1));
    let (name, capability) = chosen(backend);
    assert_eq!(name, "libdav1d");
    assert_eq!(capability, Capability::SoftwarePrecise(CodecId::Av1));
}

#[test]
fn av1_falls_back_to_generic_software() {
    let backend = MemoryBackend::new()
        .with_hardware()
        .without_decoder("libdav1d")
        .with_asset(SOURCE, clip(CodecId::Av1));
    let (name, capability) = chosen(backend);
    assert_eq!(name, "av1");
    assert!(!capability.is_hardware());
}

#[test]
fn vp9_prefers_hardware() {
    let backend = MemoryBackend::new()
        .with_hardware()
        .with_asset(SOURCE, clip(CodecId::Vp9));
    let (_, capability) = chosen(backend);
    assert_eq!(capability, Capability::Hardware(CodecId::Vp9));

    let software = MemoryBackend::new().with_asset(SOURCE, clip(CodecId::Vp9));
    let (name, capability) = chosen(software);
    assert_eq!(name, "vp9");
    assert!(!capability.is_hardware());
}

#[test]
fn other_codecs_take_the_platform_default() {
    let backend = MemoryBackend::new()
        .with_hardware()
        .with_asset(SOURCE, clip(CodecId::Hevc));
    let (name, capability) = chosen(backend);
    assert_eq!(name, "hevc");
    assert_eq!(capability, Capability::SoftwareGeneric(CodecId::Hevc));
}

#[test]
fn missing_decoder_fails_runs_and_pulls() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new()
        .without_decoder("prores")
        .with_asset(SOURCE, clip(CodecId::ProRes));
    let mut handle = open(&backend);

    assert!(handle.decode_next().is_none());
    assert!(matches!(
        handle.export(scratch.path("prores.mov"), 0.0, 0.0, None),
        Err(TranscodeError::DecoderInit(_))
    ));
    assert!(handle.is_open());
}
