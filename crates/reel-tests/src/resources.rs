//! Resource lifetimes: every acquisition is released exactly once, newest
//! first, on success and on every failure path.

use crate::support::{open, sdr_clip, Scratch, SOURCE};
use reel_core::FrameRate;
use reel_media::backend::memory::FailurePoints;
use reel_media::{MediaHandle, MemoryBackend, OpenError, TranscodeError};

fn backend() -> MemoryBackend {
    MemoryBackend::new().with_asset(SOURCE, sdr_clip(FrameRate::FPS_30, 1.0))
}

fn failing(failures: FailurePoints) -> MemoryBackend {
    backend().with_failures(failures)
}

#[test]
fn open_holds_only_the_source() {
    let backend = backend();
    let handle = open(&backend);
    let ledger = backend.ledger();
    assert_eq!(ledger.acquired_kinds(), vec!["source"]);
    assert_eq!(ledger.outstanding(), 1);
    drop(handle);
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
fn successful_run_releases_in_reverse_order() {
    let scratch = Scratch::new();
    let backend = backend();
    let ledger = backend.ledger();
    let mut handle = open(&backend);

    handle
        .export(scratch.path("ok.mov"), 0.0, 0.0, None)
        .unwrap();
    assert_eq!(
        ledger.acquired_kinds(),
        vec!["source", "decoder", "muxer", "encoder", "chain"]
    );
    assert_eq!(ledger.released_kinds(), vec!["chain", "encoder", "muxer"]);
    // The handle keeps its source and decoder between runs.
    assert_eq!(ledger.outstanding(), 2);

    handle.close();
    assert_eq!(
        ledger.released_kinds(),
        vec!["chain", "encoder", "muxer", "decoder", "source"]
    );
    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(ledger.double_releases(), 0);
}

#[test]
fn header_failure_releases_encoder_then_muxer() {
    let scratch = Scratch::new();
    let backend = failing(FailurePoints {
        header: true,
        ..Default::default()
    });
    let ledger = backend.ledger();
    let mut handle = open(&backend);

    let result = handle.export(scratch.path("header.mov"), 0.0, 0.0, None);
    assert!(matches!(result, Err(TranscodeError::HeaderWrite(_))));
    assert_eq!(ledger.released_kinds(), vec!["encoder", "muxer"]);
    assert_eq!(ledger.outstanding(), 2);
    assert!(handle.is_open());
}

#[test]
fn trailer_failure_releases_every_stage() {
    let scratch = Scratch::new();
    let backend = failing(FailurePoints {
        trailer: true,
        ..Default::default()
    });
    let ledger = backend.ledger();
    let mut handle = open(&backend);

    let result = handle.export(scratch.path("trailer.mov"), 0.0, 0.0, None);
    assert!(matches!(result, Err(TranscodeError::TrailerWrite(_))));
    assert_eq!(ledger.released_kinds(), vec!["chain", "encoder", "muxer"]);
    assert_eq!(ledger.outstanding(), 2);
    assert_eq!(ledger.double_releases(), 0);
}

#[test]
fn encoder_init_failure_releases_the_muxer() {
    let scratch = Scratch::new();
    let backend = backend();
    let ledger = backend.ledger();
    let mut handle = open(&backend);

    let result = handle.prepare(scratch.path("prep.mov"), 0.0, 0.0, None);
    assert!(matches!(result, Err(TranscodeError::EncoderInit(_))));
    assert_eq!(ledger.acquired_kinds(), vec!["source", "decoder", "muxer"]);
    assert_eq!(ledger.released_kinds(), vec!["muxer"]);
}

#[test]
fn decoder_open_failure_acquires_nothing_else() {
    let scratch = Scratch::new();
    let backend = failing(FailurePoints {
        decoder_open: true,
        ..Default::default()
    });
    let ledger = backend.ledger();
    let mut handle = open(&backend);

    let result = handle.export(scratch.path("dec.mov"), 0.0, 0.0, None);
    assert!(matches!(result, Err(TranscodeError::DecoderInit(_))));
    assert_eq!(ledger.acquired_kinds(), vec!["source"]);
    assert!(handle.decode_next().is_none());
    assert_eq!(ledger.outstanding(), 1);
}

#[test]
fn decoder_is_negotiated_once_across_runs() {
    let scratch = Scratch::new();
    let backend = backend();
    let ledger = backend.ledger();
    let mut handle = open(&backend);

    for i in 0..4 {
        handle
            .export(scratch.path(&format!("run{}.mov", i)), 0.0, 0.5, None)
            .unwrap();
        assert_eq!(ledger.outstanding(), 2);
    }
    let decoders = ledger
        .acquired_kinds()
        .into_iter()
        .filter(|k| *k == "decoder")
        .count();
    assert_eq!(decoders, 1);
    assert_eq!(handle.decoder_choice().map(|c| c.candidate.name.as_str()), Some("h264"));
}

#[test]
fn closed_handle_rejects_work() {
    let scratch = Scratch::new();
    let backend = backend();
    let ledger = backend.ledger();
    let mut handle = open(&backend);
    handle.close();
    handle.close();

    assert!(!handle.is_open());
    assert!(matches!(
        handle.export(scratch.path("closed.mov"), 0.0, 0.0, None),
        Err(TranscodeError::Closed)
    ));
    assert!(handle.decode_next().is_none());
    assert_eq!(handle.duration(), 0.0);
    assert_eq!(handle.codec_name(), "unknown");
    assert_eq!(ledger.double_releases(), 0);
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
fn open_errors_leave_nothing_behind() {
    let backend = backend().with_asset(
        "silent.m4a",
        sdr_clip(FrameRate::FPS_30, 1.0).without_video(),
    );
    assert!(matches!(
        MediaHandle::open_with(backend.clone(), "nope.mov"),
        Err(OpenError::OpenFailed { .. })
    ));
    assert!(matches!(
        MediaHandle::open_with(backend.clone(), "silent.m4a"),
        Err(OpenError::NoVideoStream(_))
    ));
    assert_eq!(backend.ledger().outstanding(), 0);
}

#[test]
fn write_failure_mid_run_releases_every_stage() {
    let scratch = Scratch::new();
    let backend = failing(FailurePoints {
        write_unit_at: Some(5),
        ..Default::default()
    });
    let ledger = backend.ledger();
    let mut handle = open(&backend);
    let out = scratch.path("full-disk.mov");

    let result = handle.export(&out, 0.0, 0.0, None);
    assert!(matches!(result, Err(TranscodeError::Stream(_))));
    assert_eq!(ledger.released_kinds(), vec!["chain", "encoder", "muxer"]);
    assert_eq!(ledger.double_releases(), 0);
    assert_eq!(ledger.outstanding(), 2);
    assert_eq!(ledger.suspensions(), 1);
    assert!(!backend.output(&out).unwrap().trailer_written);
}

#[test]
fn read_failure_mid_run_ends_the_run() {
    let scratch = Scratch::new();
    let backend = failing(FailurePoints {
        read_at: Some(10),
        ..Default::default()
    });
    let ledger = backend.ledger();
    let mut handle = open(&backend);
    let out = scratch.path("read.mov");

    let result = handle.export(&out, 0.0, 0.0, None);
    assert!(matches!(result, Err(TranscodeError::Stream(_))));
    assert_eq!(ledger.released_kinds(), vec!["chain", "encoder", "muxer"]);
    assert_eq!(ledger.outstanding(), 2);
    assert!(!backend.output(&out).unwrap().trailer_written);
    assert!(handle.is_open());
}

#[test]
fn dead_filter_chain_is_not_skipped() {
    let scratch = Scratch::new();
    let backend = failing(FailurePoints {
        chain_send_at: Some(3),
        ..Default::default()
    });
    let ledger = backend.ledger();
    let mut handle = open(&backend);
    let out = scratch.path("filter.mov");

    let result = handle.export(&out, 0.0, 0.0, None);
    assert!(matches!(result, Err(TranscodeError::Stream(_))));
    assert_eq!(ledger.released_kinds(), vec!["chain", "encoder", "muxer"]);
    assert_eq!(ledger.double_releases(), 0);
    assert!(!backend.output(&out).unwrap().trailer_written);
}

#[test]
fn source_stops_reading_after_each_run() {
    let scratch = Scratch::new();
    let backend = backend();
    let ledger = backend.ledger();
    let mut handle = open(&backend);

    // The trim stops the run with most of the clip unread.
    handle
        .export(scratch.path("head.mov"), 0.0, 0.2, None)
        .unwrap();
    assert_eq!(ledger.suspensions(), 1);

    let failed = failing(FailurePoints {
        header: true,
        ..Default::default()
    });
    let mut other = open(&failed);
    assert!(other.export(scratch.path("h.mov"), 0.0, 0.0, None).is_err());
    assert_eq!(failed.ledger().suspensions(), 1);
}

#[test]
fn scale_context_never_reaches_the_ledger() {
    let scratch = Scratch::new();
    let backend = failing(FailurePoints {
        chain_build: true,
        ..Default::default()
    });
    let ledger = backend.ledger();
    let mut handle = open(&backend);

    let summary = handle
        .export(scratch.path("scaled.mov"), 0.0, 0.0, None)
        .unwrap();
    assert_eq!(summary.frames_encoded, 30);
    assert_eq!(
        ledger.acquired_kinds(),
        vec!["source", "decoder", "muxer", "encoder"]
    );
    assert_eq!(ledger.released_kinds(), vec!["encoder", "muxer"]);
    assert_eq!(ledger.outstanding(), 2);
}
