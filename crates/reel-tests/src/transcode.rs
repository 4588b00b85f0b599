//! Whole-run behaviour of the renditions over the in-memory backend.

use crate::support::{hdr_clip, open, sdr_clip, Scratch, SOURCE};
use proptest::prelude::*;
use reel_color::PipelinePlan;
use reel_core::{ColorTags, FrameLayout, FrameRate, PictureType, PixelFormat, Timebase};
use reel_media::backend::memory::SyntheticAsset;
use reel_media::request::EXPORT_TIMESCALE;
use reel_media::{CodecId, MemoryBackend, RenditionProfile, RunState, TranscodeError};

// ── Renditions ─────────────────────────────────────────────────

#[test]
fn export_window_keeps_three_seconds() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 10.0));
    let mut handle = open(&backend);
    let out = scratch.path("window.mov");

    let summary = handle.export(&out, 2.0, 5.0, None).unwrap();
    // frames 60..=150 at 30 fps
    assert_eq!(summary.frames_encoded, 91);
    assert_eq!(summary.units_written, 91);
    assert_eq!(summary.state, RunState::Closed);
    // 8-bit source into the 10-bit export needs a format conversion
    assert!(matches!(summary.plan, Some(PipelinePlan::ScaleAndConvert(_))));

    let output = backend.output(&out).unwrap();
    assert!(output.trailer_written);
    assert_eq!(output.units.len(), 91);
    assert!(out.exists());
}

#[test]
fn matching_format_passes_through() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 1.0));
    let mut handle = open(&backend);

    let summary = handle
        .export_ext(scratch.path("pass.mov"), 0.0, 0.0, false, false, None)
        .unwrap();
    assert!(matches!(summary.plan, Some(PipelinePlan::Passthrough { .. })));
    assert_eq!(summary.frames_encoded, 30);
}

#[test]
fn hdr_export_tone_maps_to_bt709() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, hdr_clip(1.0));
    let mut handle = open(&backend);
    let out = scratch.path("hdr.mov");

    let summary = handle.export(&out, 0.0, 0.0, None).unwrap();
    assert!(matches!(summary.plan, Some(PipelinePlan::ToneMap(_))));

    let stream = backend.output(&out).unwrap().stream.unwrap();
    assert_eq!(stream.color, ColorTags::SDR_BT709);
    assert_eq!(stream.codec, CodecId::Hevc);
    let frames = backend.encoded_frames();
    assert_eq!(frames.len(), 30);
    assert!(frames.iter().all(|f| f.color == ColorTags::SDR_BT709));
}

#[test]
fn hdr_source_stays_ten_bit_without_request() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, hdr_clip(0.5));
    let mut handle = open(&backend);
    let out = scratch.path("hdr8.mov");

    handle
        .export_ext(&out, 0.0, 0.0, false, false, None)
        .unwrap();
    let stream = backend.output(&out).unwrap().stream.unwrap();
    assert_eq!(stream.layout.format, PixelFormat::Yuv420P10);
}

#[test]
fn forced_tonemap_on_sdr_source() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 0.5));
    let mut handle = open(&backend);
    let out = scratch.path("forced.mov");

    let summary = handle
        .export_ext(&out, 0.0, 0.0, true, false, None)
        .unwrap();
    assert!(matches!(summary.plan, Some(PipelinePlan::ToneMap(_))));
    let stream = backend.output(&out).unwrap().stream.unwrap();
    assert_eq!(stream.layout.format, PixelFormat::Yuv420P);
}

#[test]
fn prepare_without_hardware_encoder_fails() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 1.0));
    let mut handle = open(&backend);

    let result = handle.prepare(scratch.path("prep.mov"), 0.0, 0.0, None);
    assert!(matches!(result, Err(TranscodeError::EncoderInit(_))));
    // The handle survives a failed run.
    assert!(handle.is_open());
    assert!(handle.decode_next().is_some());
}

#[test]
fn prepare_on_hardware_encodes_nv12() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new()
        .with_hardware()
        .with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 1.0));
    let mut handle = open(&backend);
    let out = scratch.path("prep.mov");

    let summary = handle.prepare(&out, 0.0, 0.0, None).unwrap();
    assert!(matches!(summary.plan, Some(PipelinePlan::Passthrough { .. })));
    assert_eq!(summary.frames_encoded, 30);
    let output = backend.output(&out).unwrap();
    let stream = output.stream.unwrap();
    assert_eq!(stream.layout, FrameLayout::new(PixelFormat::Nv12, 32, 18));
    // No track timescale: units stay in the encoder timebase.
    assert_eq!(output.stream_time_base, Some(FrameRate::FPS_30.frame_timebase()));
}

#[test]
fn decimation_keeps_every_fourth_frame() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_60, 2.0));
    let mut handle = open(&backend);
    let out = scratch.path("decimated.mov");
    let profile = RenditionProfile {
        target_fps: 15.0,
        ..RenditionProfile::export()
    };

    let summary = handle
        .transcode(&profile.request(&out, 0.0, 0.0), None)
        .unwrap();
    assert_eq!(summary.frames_decoded, 120);
    assert_eq!(summary.frames_encoded, 30);
    assert_eq!(summary.frames_skipped, 90);

    let output = backend.output(&out).unwrap();
    assert_eq!(output.stream.unwrap().frame_rate.to_fps_f64(), 15.0);
    let step = EXPORT_TIMESCALE as i64 / 15;
    for (i, unit) in output.units.iter().enumerate() {
        assert_eq!(unit.pts, i as i64 * step);
    }
}

#[test]
fn requested_height_scales_width_to_even() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 0.5));
    let mut handle = open(&backend);
    let out = scratch.path("small.mov");
    let profile = RenditionProfile {
        target_height: 10,
        ..RenditionProfile::export()
    };

    handle
        .transcode(&profile.request(&out, 0.0, 0.0), None)
        .unwrap();
    let stream = backend.output(&out).unwrap().stream.unwrap();
    assert_eq!((stream.layout.width, stream.layout.height), (16, 10));
    assert!(backend
        .encoded_frames()
        .iter()
        .all(|f| f.layout == stream.layout));
}

// ── Timestamps and frame hygiene ───────────────────────────────

#[test]
fn output_timestamps_strictly_increase_through_delays() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new()
        .with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 2.0))
        .with_decoder_delay(2)
        .with_chain_latency(2)
        .with_encoder_delay(3);
    let mut handle = open(&backend);
    let out = scratch.path("delays.mov");

    let summary = handle.export(&out, 0.5, 1.5, None).unwrap();
    assert_eq!(summary.frames_encoded, summary.units_written);
    // frames 15..=45
    assert_eq!(summary.frames_encoded, 31);

    let output = backend.output(&out).unwrap();
    assert_eq!(
        output.stream_time_base,
        Some(Timebase::new(1, EXPORT_TIMESCALE as i64))
    );
    assert!(output.units.windows(2).all(|w| w[1].pts > w[0].pts));
    assert!(output.units.windows(2).all(|w| w[1].dts > w[0].dts));
    assert!(output.units.iter().all(|u| u.stream_index == 0));
}

#[test]
fn encoder_sees_cleared_picture_types() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 1.0));
    let mut handle = open(&backend);

    handle
        .export(scratch.path("types.mov"), 0.0, 0.0, None)
        .unwrap();
    let frames = backend.encoded_frames();
    assert_eq!(frames.len(), 30);
    assert!(frames.iter().all(|f| f.picture_type == PictureType::None));
    let pts: Vec<_> = frames.iter().map(|f| f.pts).collect();
    assert_eq!(pts, (0..30).map(Some).collect::<Vec<_>>());
}

#[test]
fn plan_is_fixed_for_the_run() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, hdr_clip(1.0));
    let mut handle = open(&backend);
    let out = scratch.path("stable.mov");

    handle.export(&out, 0.0, 0.0, None).unwrap();
    let stream = backend.output(&out).unwrap().stream.unwrap();
    let frames = backend.encoded_frames();
    assert!(frames
        .iter()
        .all(|f| f.layout == stream.layout && f.color == ColorTags::SDR_BT709));
}

#[test]
fn progress_is_monotonic_and_completes() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 10.0));
    let mut handle = open(&backend);

    let mut values = Vec::new();
    let mut sink = |p: f64| values.push(p);
    handle
        .export(scratch.path("progress.mov"), 2.0, 5.0, Some(&mut sink))
        .unwrap();

    assert_eq!(values.len(), 91);
    assert_eq!(values.first().copied(), Some(0.0));
    assert_eq!(values.last().copied(), Some(1.0));
    assert!(values.windows(2).all(|w| w[1] >= w[0]));
    assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn empty_window_reports_nothing() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 1.0));
    let mut handle = open(&backend);

    let mut calls = 0;
    let mut sink = |_: f64| calls += 1;
    let summary = handle
        .export(scratch.path("late.mov"), 20.0, 0.0, Some(&mut sink))
        .unwrap();
    assert_eq!(calls, 0);
    assert_eq!(summary.frames_encoded, 0);
    assert!(summary.plan.is_none());
    assert_eq!(summary.state, RunState::Closed);
}

#[test]
fn end_past_duration_is_clamped() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 1.0));
    let mut handle = open(&backend);

    let summary = handle
        .export(scratch.path("long.mov"), 0.0, 100.0, None)
        .unwrap();
    assert_eq!(summary.frames_encoded, 30);
}

// ── Damaged sources and failing stages ─────────────────────────

#[test]
fn corrupt_units_are_skipped() {
    let scratch = Scratch::new();
    let clip = sdr_clip(FrameRate::FPS_30, 1.0).with_corrupt_frames([3, 4]);
    let backend = MemoryBackend::new().with_asset(SOURCE, clip);
    let mut handle = open(&backend);

    let summary = handle
        .export(scratch.path("corrupt.mov"), 0.0, 0.0, None)
        .unwrap();
    assert_eq!(summary.frames_decoded, 28);
    assert_eq!(summary.frames_encoded, 28);
}

#[test]
fn missing_timestamps_are_synthesized() {
    let scratch = Scratch::new();
    let clip = sdr_clip(FrameRate::FPS_30, 1.0).with_missing_pts([0, 5, 6]);
    let backend = MemoryBackend::new().with_asset(SOURCE, clip);
    let mut handle = open(&backend);

    let summary = handle
        .export(scratch.path("nopts.mov"), 0.0, 0.0, None)
        .unwrap();
    assert_eq!(summary.frames_encoded, 30);
}

#[test]
fn other_streams_are_ignored() {
    let scratch = Scratch::new();
    let clip = sdr_clip(FrameRate::FPS_30, 1.0).with_audio_every(4);
    let backend = MemoryBackend::new().with_asset(SOURCE, clip);
    let mut handle = open(&backend);

    let summary = handle
        .export(scratch.path("av.mov"), 0.0, 0.0, None)
        .unwrap();
    assert_eq!(summary.frames_encoded, 30);
}

#[test]
fn rejected_filter_graph_falls_back_to_scaling() {
    use reel_media::backend::memory::FailurePoints;

    let scratch = Scratch::new();
    let backend = MemoryBackend::new()
        .with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 1.0))
        .with_failures(FailurePoints {
            chain_build: true,
            ..Default::default()
        });
    let mut handle = open(&backend);
    let out = scratch.path("fallback.mov");

    let summary = handle.export(&out, 0.0, 0.0, None).unwrap();
    assert!(matches!(summary.plan, Some(PipelinePlan::Passthrough { .. })));
    assert_eq!(summary.frames_encoded, 30);
    let target = backend.output(&out).unwrap().stream.unwrap().layout;
    assert_eq!(target.format, PixelFormat::Yuv420P10);
    assert!(backend.encoded_frames().iter().all(|f| f.layout == target));
}

#[test]
fn unwritable_output_is_reported() {
    let scratch = Scratch::new();
    let backend = MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 1.0));
    let mut handle = open(&backend);

    let result = handle.export(scratch.path("missing/dir/out.mov"), 0.0, 0.0, None);
    assert!(matches!(result, Err(TranscodeError::OutputOpen { .. })));
}

// ── Trim window property ───────────────────────────────────────

fn frames_in_window(clip: &SyntheticAsset, start: f64, end: f64) -> u64 {
    let step = clip.frame_rate.frame_duration_in(clip.time_base);
    (0..clip.frame_count as i64)
        .map(|i| clip.time_base.seconds(i * step))
        .filter(|&t| t >= start && (end <= 0.0 || t <= end))
        .count() as u64
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn trim_window_selects_exact_frames(start in 0.0f64..2.5, len in 0.0f64..2.0, open_end in any::<bool>()) {
        let scratch = Scratch::new();
        let clip = sdr_clip(FrameRate::FPS_30, 3.0).with_gop(12);
        let backend = MemoryBackend::new().with_asset(SOURCE, clip.clone());
        let mut handle = open(&backend);
        let end = if open_end { 0.0 } else { start + len };

        let summary = handle
            .export_ext(scratch.path("prop.mov"), start, end, false, false, None)
            .unwrap();
        prop_assert_eq!(summary.frames_encoded, frames_in_window(&clip, start, end));
    }
}
