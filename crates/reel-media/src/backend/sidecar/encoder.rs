//! Encoder process: raw pictures in, NUT-wrapped bitstream out.
//!
//! The process's stdout is not split into packets. Each unit handed back is
//! one read of the NUT stream: `pts` and `dts` are its sequence number and
//! only the first chunk is flagged as a key. The muxer copies the chunks in
//! order and lets the container carry the real timestamps.

use super::pipe::{Chunking, Sidecar};
use crate::backend::{EncodedUnit, EncoderConfig, FrameEncoder, HevcProfile};
use crate::capability::EncoderCandidate;
use crate::error::StageError;
use crate::scope::Release;
use reel_core::{DecodedFrame, FrameLayout, Timebase};

pub struct SidecarEncoder {
    process: Sidecar,
    layout: FrameLayout,
    time_base: Timebase,
    sequence: i64,
    eof: bool,
}

impl SidecarEncoder {
    pub(crate) fn spawn(
        candidate: &EncoderCandidate,
        config: &EncoderConfig,
    ) -> Result<Self, StageError> {
        let args = encoder_args(candidate, config);
        let process = Sidecar::spawn("encoder", &args, Some(Chunking::Stream), None)?;
        Ok(Self {
            process,
            layout: config.layout,
            time_base: config.time_base,
            sequence: 0,
            eof: false,
        })
    }

    fn unit(&mut self, data: Vec<u8>) -> EncodedUnit {
        let unit = stream_chunk(self.sequence, data);
        self.sequence += 1;
        unit
    }
}

fn stream_chunk(sequence: i64, data: Vec<u8>) -> EncodedUnit {
    EncodedUnit {
        data,
        pts: sequence,
        dts: sequence,
        key: sequence == 0,
        stream_index: 0,
    }
}

pub(crate) fn encoder_args(candidate: &EncoderCandidate, config: &EncoderConfig) -> Vec<String> {
    let layout = config.layout;
    let pix_fmt = layout.format.ffmpeg_name().to_string();
    let mut args: Vec<String> = vec![
        "-nostats".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        pix_fmt.clone(),
        "-s".into(),
        format!("{}x{}", layout.width, layout.height),
        "-r".into(),
        format!("{}/{}", config.frame_rate.numerator, config.frame_rate.denominator),
        "-i".into(),
        "pipe:0".into(),
        "-c:v".into(),
        candidate.name.clone(),
    ];

    let knobs = &config.knobs;
    if candidate.capability.is_hardware() {
        if let Some(bitrate) = knobs.bitrate {
            args.extend(["-b:v".into(), bitrate.to_string()]);
        }
        if let Some(profile) = &knobs.profile {
            args.extend(["-profile:v".into(), profile.clone()]);
        }
        if knobs.realtime {
            args.extend(["-realtime".into(), "1".into()]);
        }
    } else {
        if let Some(params) = &knobs.codec_params {
            let family = candidate
                .name
                .strip_prefix("lib")
                .unwrap_or(&candidate.name);
            args.extend([format!("-{}-params", family), params.clone()]);
        }
        if let Some(preset) = &knobs.preset {
            args.extend(["-preset".into(), preset.clone()]);
        }
        if let Some(crf) = &knobs.crf {
            args.extend(["-crf".into(), crf.clone()]);
        }
        if config.profile == HevcProfile::Main10 {
            args.extend(["-profile:v".into(), HevcProfile::Main10.ffmpeg_name().into()]);
        }
    }

    let color = config.color;
    args.extend([
        "-pix_fmt".into(),
        pix_fmt,
        "-color_primaries".into(),
        color.primaries.ffmpeg_name().into(),
        "-color_trc".into(),
        color.transfer.ffmpeg_name().into(),
        "-colorspace".into(),
        color.matrix.ffmpeg_name().into(),
        "-color_range".into(),
        color.range.ffmpeg_name().into(),
        "-f".into(),
        "nut".into(),
        "pipe:1".into(),
    ]);
    args
}

impl FrameEncoder for SidecarEncoder {
    fn time_base(&self) -> Timebase {
        self.time_base
    }

    fn send(&mut self, frame: Option<DecodedFrame>) -> Result<(), StageError> {
        let Some(frame) = frame else {
            self.eof = true;
            self.process.close_input();
            return Ok(());
        };
        if frame.layout() != self.layout {
            return Err(StageError::MidStreamEncode(format!(
                "encoder opened for {:?}, got {:?}",
                self.layout,
                frame.layout()
            )));
        }
        let mut bytes = Vec::new();
        frame.buffer.write_packed(&mut bytes);
        self.process.write(&bytes)
    }

    fn receive(&mut self) -> Result<Option<EncodedUnit>, StageError> {
        let chunk = if self.eof {
            self.process.recv()
        } else {
            self.process.try_recv()
        };
        match chunk {
            Some(data) => Ok(Some(self.unit(data))),
            None if self.eof => {
                self.process.finish()?;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

impl Release for SidecarEncoder {
    fn kind(&self) -> &'static str {
        "encoder"
    }

    fn release(&mut self) {
        self.process.kill();
    }
}
